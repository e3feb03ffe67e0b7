//! Kernel-neutral value types and the [`Kernel`] trait.
//!
//! Edges, wires and faces are plain values. Solids are opaque handles; the
//! geometry behind a [`Solid`] lives inside the kernel that produced it.

use nalgebra::Point3;
use pcbsolid_core::geom::{BBox2, Vec2};
use std::f64::consts::{PI, TAU};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    #[error("kernel not available: {0}")]
    NotAvailable(String),

    #[error("invalid wire: {0}")]
    InvalidWire(String),

    #[error("non-planar profile: {0}")]
    NonPlanar(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("self-intersecting profile: {0}")]
    SelfIntersecting(String),

    #[error("boolean operation failed: {0}")]
    BooleanFailed(String),

    #[error("unknown solid {0}")]
    UnknownSolid(Uuid),
}

pub type KernelResult<T> = Result<T, KernelError>;

/// One bounded curve in model space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Edge {
    Line {
        start: Point3<f64>,
        end: Point3<f64>,
    },
    /// Travels from `start` to `end` around `center`, counter-clockwise seen
    /// from +Z when `ccw` is set.
    Arc {
        center: Point3<f64>,
        radius: f64,
        start: Point3<f64>,
        end: Point3<f64>,
        ccw: bool,
    },
    Circle {
        center: Point3<f64>,
        radius: f64,
        ccw: bool,
    },
    Bezier {
        points: [Point3<f64>; 4],
    },
}

impl Edge {
    pub fn start(&self) -> Point3<f64> {
        match self {
            Edge::Line { start, .. } | Edge::Arc { start, .. } => *start,
            Edge::Circle { center, radius, .. } => {
                Point3::new(center.x + radius, center.y, center.z)
            }
            Edge::Bezier { points } => points[0],
        }
    }

    pub fn end(&self) -> Point3<f64> {
        match self {
            Edge::Line { end, .. } | Edge::Arc { end, .. } => *end,
            Edge::Circle { .. } => self.start(),
            Edge::Bezier { points } => points[3],
        }
    }

    /// Every defining point, control points included.
    pub fn points(&self) -> Vec<Point3<f64>> {
        match self {
            Edge::Line { start, end } => vec![*start, *end],
            Edge::Arc {
                center, start, end, ..
            } => vec![*center, *start, *end],
            Edge::Circle { center, .. } => vec![*center, self.start()],
            Edge::Bezier { points } => points.to_vec(),
        }
    }

    pub fn is_closed_curve(&self) -> bool {
        matches!(self, Edge::Circle { .. })
    }
}

/// A connected chain of edges, end of each edge on the start of the next.
#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    edges: Vec<Edge>,
    closed: bool,
}

impl Wire {
    pub(crate) fn new(edges: Vec<Edge>, closed: bool) -> Self {
        Self { edges, closed }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// A planar region bounded by one closed wire, lying in the plane `z = elevation`.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    profile: ProfileLoop,
    elevation: f64,
}

impl Face {
    pub(crate) fn new(profile: ProfileLoop, elevation: f64) -> Self {
        Self { profile, elevation }
    }

    pub fn profile(&self) -> &ProfileLoop {
        &self.profile
    }

    pub fn elevation(&self) -> f64 {
        self.elevation
    }
}

/// Opaque handle to a solid owned by a kernel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Solid {
    id: Uuid,
}

impl Solid {
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
}

/// Summary measurements of a solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolidInfo {
    pub volume: f64,
    pub extents: BBox2,
    pub z_min: f64,
    pub z_max: f64,
    /// Through-voids (holes) in the body.
    pub voids: usize,
}

/// One piece of a planar profile boundary in the XY plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProfileSegment {
    Line {
        start: Vec2,
        end: Vec2,
    },
    Arc {
        center: Vec2,
        radius: f64,
        start: Vec2,
        end: Vec2,
        ccw: bool,
    },
    Circle {
        center: Vec2,
        radius: f64,
        ccw: bool,
    },
    Bezier {
        points: [Vec2; 4],
    },
}

impl ProfileSegment {
    pub fn start(&self) -> Vec2 {
        match self {
            ProfileSegment::Line { start, .. } | ProfileSegment::Arc { start, .. } => *start,
            ProfileSegment::Circle { center, radius, .. } => *center + Vec2::new(*radius, 0.0),
            ProfileSegment::Bezier { points } => points[0],
        }
    }

    pub fn end(&self) -> Vec2 {
        match self {
            ProfileSegment::Line { end, .. } | ProfileSegment::Arc { end, .. } => *end,
            ProfileSegment::Circle { .. } => self.start(),
            ProfileSegment::Bezier { points } => points[3],
        }
    }

    pub fn reversed(&self) -> Self {
        match *self {
            ProfileSegment::Line { start, end } => ProfileSegment::Line {
                start: end,
                end: start,
            },
            ProfileSegment::Arc {
                center,
                radius,
                start,
                end,
                ccw,
            } => ProfileSegment::Arc {
                center,
                radius,
                start: end,
                end: start,
                ccw: !ccw,
            },
            ProfileSegment::Circle {
                center,
                radius,
                ccw,
            } => ProfileSegment::Circle {
                center,
                radius,
                ccw: !ccw,
            },
            ProfileSegment::Bezier { points } => ProfileSegment::Bezier {
                points: [points[3], points[2], points[1], points[0]],
            },
        }
    }

    /// Start angle and signed sweep of an arc or circle.
    pub fn angles(&self) -> Option<(f64, f64)> {
        match *self {
            ProfileSegment::Arc {
                center,
                start,
                end,
                ccw,
                ..
            } => {
                let a0 = (start.y - center.y).atan2(start.x - center.x);
                let a1 = (end.y - center.y).atan2(end.x - center.x);
                let mut sweep = a1 - a0;
                if ccw {
                    while sweep <= 0.0 {
                        sweep += TAU;
                    }
                } else {
                    while sweep >= 0.0 {
                        sweep -= TAU;
                    }
                }
                Some((a0, sweep))
            }
            ProfileSegment::Circle { ccw, .. } => Some((0.0, if ccw { TAU } else { -TAU })),
            _ => None,
        }
    }

    /// Contribution to the loop's signed area, `1/2 * ∮ (x dy - y dx)`.
    pub fn area_term(&self) -> f64 {
        match *self {
            ProfileSegment::Line { start, end } => 0.5 * start.perp_dot(end),
            ProfileSegment::Arc { center, radius, .. } => {
                let Some((a0, sweep)) = self.angles() else {
                    return 0.0;
                };
                let a1 = a0 + sweep;
                0.5 * (radius * center.x * (a1.sin() - a0.sin())
                    - radius * center.y * (a1.cos() - a0.cos())
                    + radius * radius * sweep)
            }
            ProfileSegment::Circle { radius, ccw, .. } => {
                let area = PI * radius * radius;
                if ccw {
                    area
                } else {
                    -area
                }
            }
            ProfileSegment::Bezier { points } => {
                // x*y' - y*x' is a quintic in t, so three Gauss-Legendre nodes are exact.
                const NODES: [(f64, f64); 3] = [
                    (0.112_701_665_379_258_3, 5.0 / 18.0),
                    (0.5, 8.0 / 18.0),
                    (0.887_298_334_620_741_7, 5.0 / 18.0),
                ];
                let integrand: f64 = NODES
                    .iter()
                    .map(|&(t, w)| {
                        let p = pcbsolid_core::curve::bezier_eval(points, t);
                        let d = bezier_derivative(points, t);
                        w * p.perp_dot(d)
                    })
                    .sum();
                0.5 * integrand
            }
        }
    }

    /// Polyline from `start()` to `end()`, both included.
    pub fn sample(&self) -> Vec<Vec2> {
        match *self {
            ProfileSegment::Line { start, end } => vec![start, end],
            ProfileSegment::Arc { center, radius, .. } | ProfileSegment::Circle { center, radius, .. } => {
                let Some((a0, sweep)) = self.angles() else {
                    return Vec::new();
                };
                let n = ((sweep.abs() / (PI / 32.0)).ceil() as usize).clamp(2, 256);
                let mut pts: Vec<Vec2> = (0..=n)
                    .map(|i| center + Vec2::from_angle(a0 + sweep * i as f64 / n as f64) * radius)
                    .collect();
                // Pin the ends to the exact stored points.
                if let Some(first) = pts.first_mut() {
                    *first = self.start();
                }
                if let Some(last) = pts.last_mut() {
                    *last = self.end();
                }
                pts
            }
            ProfileSegment::Bezier { points } => (0..=32)
                .map(|i| pcbsolid_core::curve::bezier_eval(points, i as f64 / 32.0))
                .collect(),
        }
    }
}

fn bezier_derivative(p: [Vec2; 4], t: f64) -> Vec2 {
    let u = 1.0 - t;
    (p[1] - p[0]) * (3.0 * u * u) + (p[2] - p[1]) * (6.0 * u * t) + (p[3] - p[2]) * (3.0 * t * t)
}

/// Closed chain of profile segments.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProfileLoop {
    pub segments: Vec<ProfileSegment>,
}

impl ProfileLoop {
    pub fn new(segments: Vec<ProfileSegment>) -> Self {
        Self { segments }
    }

    /// Positive for counter-clockwise loops.
    pub fn signed_area(&self) -> f64 {
        self.segments.iter().map(ProfileSegment::area_term).sum()
    }

    pub fn is_ccw(&self) -> bool {
        self.signed_area() > 0.0
    }

    pub fn reversed(&self) -> Self {
        Self {
            segments: self.segments.iter().rev().map(ProfileSegment::reversed).collect(),
        }
    }

    /// Same loop traversed counter-clockwise (`ccw == true`) or clockwise.
    pub fn oriented(self, ccw: bool) -> Self {
        if self.is_ccw() == ccw {
            self
        } else {
            self.reversed()
        }
    }

    /// Polyline ring without the repeated closing point.
    pub fn ring(&self) -> Vec<Vec2> {
        let mut ring: Vec<Vec2> = Vec::new();
        for segment in &self.segments {
            for p in segment.sample() {
                if ring.last().map_or(true, |last| last.distance_sq(p) > 1e-18) {
                    ring.push(p);
                }
            }
        }
        if ring.len() > 1 && ring[0].distance_sq(ring[ring.len() - 1]) <= 1e-18 {
            ring.pop();
        }
        ring
    }

    pub fn bbox(&self) -> BBox2 {
        let mut bbox = BBox2::empty();
        for p in self.ring() {
            bbox.include_point(p);
        }
        bbox
    }
}

/// Boundary description of a prismatic solid: an outer loop (CCW), void
/// loops (CW) and the Z range the profile is extruded over.
#[derive(Debug, Clone, PartialEq)]
pub struct PrismBody {
    pub outer: ProfileLoop,
    pub holes: Vec<ProfileLoop>,
    pub z_min: f64,
    pub z_max: f64,
}

impl PrismBody {
    pub fn height(&self) -> f64 {
        self.z_max - self.z_min
    }

    pub fn area(&self) -> f64 {
        self.outer.signed_area().abs()
            - self
                .holes
                .iter()
                .map(|h| h.signed_area().abs())
                .sum::<f64>()
    }

    pub fn volume(&self) -> f64 {
        self.area() * self.height()
    }
}

/// Geometry operations the exporter needs from a solid-modeling backend.
pub trait Kernel {
    fn name(&self) -> &str;

    /// Chain edges into a wire. Fails when consecutive edges do not meet.
    fn make_wire(&mut self, edges: Vec<Edge>) -> KernelResult<Wire>;

    /// Planar face bounded by a closed wire.
    fn make_face(&mut self, wire: &Wire) -> KernelResult<Face>;

    /// Sweep a face along +Z by `height`.
    fn extrude(&mut self, face: &Face, height: f64) -> KernelResult<Solid>;

    /// Upright cylinder whose bottom cap is centred on `base`.
    fn make_cylinder(&mut self, base: Point3<f64>, radius: f64, height: f64)
        -> KernelResult<Solid>;

    /// Remove every tool from `base` in one operation.
    fn subtract(&mut self, base: &Solid, tools: &[Solid]) -> KernelResult<Solid>;

    fn solid_info(&self, solid: &Solid) -> KernelResult<SolidInfo>;

    /// Boundary description used by writers.
    fn prism_body(&self, solid: &Solid) -> KernelResult<PrismBody>;

    /// Forget a solid that is no longer needed.
    fn release(&mut self, solid: &Solid);
}

/// A kernel that fails every construction.
#[derive(Debug, Default)]
pub struct NullKernel;

impl Kernel for NullKernel {
    fn name(&self) -> &str {
        "null"
    }

    fn make_wire(&mut self, _edges: Vec<Edge>) -> KernelResult<Wire> {
        Err(KernelError::NotAvailable("no geometry kernel".into()))
    }

    fn make_face(&mut self, _wire: &Wire) -> KernelResult<Face> {
        Err(KernelError::NotAvailable("no geometry kernel".into()))
    }

    fn extrude(&mut self, _face: &Face, _height: f64) -> KernelResult<Solid> {
        Err(KernelError::NotAvailable("no geometry kernel".into()))
    }

    fn make_cylinder(
        &mut self,
        _base: Point3<f64>,
        _radius: f64,
        _height: f64,
    ) -> KernelResult<Solid> {
        Err(KernelError::NotAvailable("no geometry kernel".into()))
    }

    fn subtract(&mut self, _base: &Solid, _tools: &[Solid]) -> KernelResult<Solid> {
        Err(KernelError::NotAvailable("no geometry kernel".into()))
    }

    fn solid_info(&self, solid: &Solid) -> KernelResult<SolidInfo> {
        Err(KernelError::UnknownSolid(solid.id()))
    }

    fn prism_body(&self, solid: &Solid) -> KernelResult<PrismBody> {
        Err(KernelError::UnknownSolid(solid.id()))
    }

    fn release(&mut self, _solid: &Solid) {}
}
