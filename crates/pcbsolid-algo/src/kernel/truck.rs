//! Truck backend.
//!
//! Wires, faces and sweeps are built as truck B-reps, which validates that
//! every profile attaches to a plane. Booleans are not available in truck, so
//! subtraction and the boundary description handed to writers come from the
//! prism kernel running alongside.

use super::prism::{PrismKernel, LINEAR_TOLERANCE};
use super::traits::{
    Edge, Face, Kernel, KernelError, KernelResult, PrismBody, ProfileLoop, ProfileSegment, Solid,
    SolidInfo, Wire,
};
use nalgebra::Point3;
use pcbsolid_core::geom::Vec2;
use std::collections::HashMap;
use truck_modeling::{
    builder, Edge as TruckEdge, Face as TruckFace, Point3 as TruckPoint, Solid as TruckSolid,
    Vector3, Vertex, Wire as TruckWire,
};
use uuid::Uuid;

#[derive(Default)]
pub struct TruckKernel {
    prisms: PrismKernel,
    breps: HashMap<Uuid, TruckSolid>,
}

impl TruckKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The swept B-rep behind a solid. Solids produced by subtraction have none.
    pub fn brep(&self, solid: &Solid) -> Option<&TruckSolid> {
        self.breps.get(&solid.id())
    }
}

impl Kernel for TruckKernel {
    fn name(&self) -> &str {
        "truck"
    }

    fn make_wire(&mut self, edges: Vec<Edge>) -> KernelResult<Wire> {
        self.prisms.make_wire(edges)
    }

    fn make_face(&mut self, wire: &Wire) -> KernelResult<Face> {
        let face = self.prisms.make_face(wire)?;
        truck_face(&face)?;
        Ok(face)
    }

    fn extrude(&mut self, face: &Face, height: f64) -> KernelResult<Solid> {
        let planar = truck_face(face)?;
        let solid = self.prisms.extrude(face, height)?;
        let brep = builder::tsweep(&planar, Vector3::new(0.0, 0.0, height));
        self.breps.insert(solid.id(), brep);
        Ok(solid)
    }

    fn make_cylinder(
        &mut self,
        base: Point3<f64>,
        radius: f64,
        height: f64,
    ) -> KernelResult<Solid> {
        if !radius.is_finite() || radius < LINEAR_TOLERANCE {
            return Err(KernelError::InvalidProfile(format!(
                "cylinder radius {radius} is degenerate"
            )));
        }
        let wire = self.make_wire(vec![Edge::Circle {
            center: base,
            radius,
            ccw: true,
        }])?;
        let face = self.make_face(&wire)?;
        self.extrude(&face, height)
    }

    fn subtract(&mut self, base: &Solid, tools: &[Solid]) -> KernelResult<Solid> {
        let result = self.prisms.subtract(base, tools)?;
        tracing::debug!(solid = %result.id(), "subtraction result carries no truck B-rep");
        Ok(result)
    }

    fn solid_info(&self, solid: &Solid) -> KernelResult<SolidInfo> {
        self.prisms.solid_info(solid)
    }

    fn prism_body(&self, solid: &Solid) -> KernelResult<PrismBody> {
        self.prisms.prism_body(solid)
    }

    fn release(&mut self, solid: &Solid) {
        self.breps.remove(&solid.id());
        self.prisms.release(solid);
    }
}

fn truck_face(face: &Face) -> KernelResult<TruckFace> {
    let profile = face.profile().clone().oriented(true);
    let wire = truck_wire(&profile, face.elevation())?;
    builder::try_attach_plane(&[wire])
        .map_err(|e| KernelError::NonPlanar(format!("truck could not attach a plane: {e:?}")))
}

/// Closed truck wire through the profile, neighbouring edges sharing vertices.
fn truck_wire(profile: &ProfileLoop, z: f64) -> KernelResult<TruckWire> {
    let segments: Vec<ProfileSegment> = profile.segments.iter().flat_map(split_circle).collect();
    let n = segments.len();
    if n == 0 {
        return Err(KernelError::InvalidWire("no edges".into()));
    }
    let vertices: Vec<Vertex> = segments
        .iter()
        .map(|s| builder::vertex(lift(s.start(), z)))
        .collect();

    let edges = segments
        .iter()
        .enumerate()
        .map(|(i, segment)| {
            let (v0, v1) = (&vertices[i], &vertices[(i + 1) % n]);
            match *segment {
                ProfileSegment::Line { .. } => Ok(builder::line(v0, v1)),
                ProfileSegment::Arc { .. } => {
                    let transit = arc_midpoint(segment).ok_or_else(|| {
                        KernelError::InvalidProfile("arc without a sweep".into())
                    })?;
                    Ok(builder::circle_arc(v0, v1, lift(transit, z)))
                }
                ProfileSegment::Bezier { points } => Ok(builder::bezier(
                    v0,
                    v1,
                    vec![lift(points[1], z), lift(points[2], z)],
                )),
                ProfileSegment::Circle { .. } => Err(KernelError::InvalidProfile(
                    "full circle left in a split profile".into(),
                )),
            }
        })
        .collect::<KernelResult<Vec<TruckEdge>>>()?;
    Ok(edges.into())
}

/// Truck arcs need distinct end vertices, so a full circle becomes two halves.
fn split_circle(segment: &ProfileSegment) -> Vec<ProfileSegment> {
    match *segment {
        ProfileSegment::Circle {
            center,
            radius,
            ccw,
        } => {
            let a = center + Vec2::new(radius, 0.0);
            let b = center - Vec2::new(radius, 0.0);
            vec![
                ProfileSegment::Arc {
                    center,
                    radius,
                    start: a,
                    end: b,
                    ccw,
                },
                ProfileSegment::Arc {
                    center,
                    radius,
                    start: b,
                    end: a,
                    ccw,
                },
            ]
        }
        other => vec![other],
    }
}

fn arc_midpoint(segment: &ProfileSegment) -> Option<Vec2> {
    let ProfileSegment::Arc { center, radius, .. } = *segment else {
        return None;
    };
    let (a0, sweep) = segment.angles()?;
    Some(center + Vec2::from_angle(a0 + 0.5 * sweep) * radius)
}

fn lift(p: Vec2, z: f64) -> TruckPoint {
    TruckPoint::new(p.x, p.y, z)
}
