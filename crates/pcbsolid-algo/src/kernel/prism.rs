//! Built-in kernel for prismatic bodies.
//!
//! Every solid is a profile (one outer loop plus void loops) swept along +Z
//! between two elevations. Subtraction takes tools that pass through the
//! whole base. A tool inside the outline becomes a void, overlapping voids
//! are merged, and a tool crossing the outline is cut into it as a notch.
//! Merged and notched loops are straight-segment approximations. A cut that
//! would split the base or remove it fails with [`KernelError::BooleanFailed`].

use super::traits::{
    Edge, Face, Kernel, KernelError, KernelResult, PrismBody, ProfileLoop, ProfileSegment, Solid,
    SolidInfo, Wire,
};
use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use nalgebra::Point3;
use pcbsolid_core::geom::{point_in_ring, segments_intersect, BBox2, Vec2};
use std::collections::HashMap;
use uuid::Uuid;

/// Distance under which two kernel points are the same point.
pub const LINEAR_TOLERANCE: f64 = 1e-6;
const INTERSECT_EPS: f64 = 1e-9;
/// Allowed distance between an arc end point and the arc's circle.
const ARC_TOLERANCE: f64 = 0.01;

#[derive(Debug, Default)]
pub struct PrismKernel {
    solids: HashMap<Uuid, PrismBody>,
}

impl PrismKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of solids currently held.
    pub fn solid_count(&self) -> usize {
        self.solids.len()
    }

    fn store(&mut self, body: PrismBody) -> Solid {
        let id = Uuid::new_v4();
        self.solids.insert(id, body);
        Solid::new(id)
    }

    fn body(&self, solid: &Solid) -> KernelResult<&PrismBody> {
        self.solids
            .get(&solid.id())
            .ok_or(KernelError::UnknownSolid(solid.id()))
    }
}

impl Kernel for PrismKernel {
    fn name(&self) -> &str {
        "prism"
    }

    fn make_wire(&mut self, edges: Vec<Edge>) -> KernelResult<Wire> {
        let (Some(first), Some(last)) = (edges.first(), edges.last()) else {
            return Err(KernelError::InvalidWire("no edges".into()));
        };
        if edges.len() > 1 && edges.iter().any(Edge::is_closed_curve) {
            return Err(KernelError::InvalidWire(
                "a full circle cannot share a wire with other edges".into(),
            ));
        }
        for (i, pair) in edges.windows(2).enumerate() {
            let gap = (pair[0].end() - pair[1].start()).norm();
            if gap > LINEAR_TOLERANCE {
                return Err(KernelError::InvalidWire(format!(
                    "edge {} ends {gap:.6} away from the start of edge {}",
                    i,
                    i + 1
                )));
            }
        }
        let closed = (last.end() - first.start()).norm() <= LINEAR_TOLERANCE;
        Ok(Wire::new(edges, closed))
    }

    fn make_face(&mut self, wire: &Wire) -> KernelResult<Face> {
        if !wire.is_closed() {
            return Err(KernelError::InvalidWire("wire is open".into()));
        }
        let edges = wire.edges();
        let Some(first) = edges.first() else {
            return Err(KernelError::InvalidWire("no edges".into()));
        };
        let z = first.start().z;
        if edges
            .iter()
            .flat_map(Edge::points)
            .any(|p| (p.z - z).abs() > LINEAR_TOLERANCE)
        {
            return Err(KernelError::NonPlanar(format!(
                "edges leave the plane z = {z:.6}"
            )));
        }

        let segments = edges
            .iter()
            .map(profile_segment)
            .collect::<KernelResult<Vec<_>>>()?;
        let profile = ProfileLoop::new(segments);

        let area = profile.signed_area();
        if area.abs() < LINEAR_TOLERANCE * LINEAR_TOLERANCE {
            return Err(KernelError::InvalidProfile(format!(
                "enclosed area {area:.3e} is zero"
            )));
        }
        check_simple(&profile)?;
        Ok(Face::new(profile, z))
    }

    fn extrude(&mut self, face: &Face, height: f64) -> KernelResult<Solid> {
        if !height.is_finite() || height.abs() < LINEAR_TOLERANCE {
            return Err(KernelError::InvalidProfile(format!(
                "extrusion height {height} is degenerate"
            )));
        }
        let z0 = face.elevation();
        let z1 = z0 + height;
        Ok(self.store(PrismBody {
            outer: face.profile().clone().oriented(true),
            holes: Vec::new(),
            z_min: z0.min(z1),
            z_max: z0.max(z1),
        }))
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
        let edge = Edge::Circle {
            center: base,
            radius,
            ccw: true,
        };
        let wire = self.make_wire(vec![edge])?;
        let face = self.make_face(&wire)?;
        self.extrude(&face, height)
    }

    fn subtract(&mut self, base: &Solid, tools: &[Solid]) -> KernelResult<Solid> {
        let mut body = self.body(base)?.clone();
        let mut outer = RingedLoop::new(body.outer.clone());
        let mut voids: Vec<RingedLoop> = body.holes.drain(..).map(RingedLoop::new).collect();

        for tool in tools {
            let tool_body = self.body(tool)?;
            if !tool_body.holes.is_empty() {
                return Err(KernelError::BooleanFailed(format!(
                    "tool {} has voids of its own",
                    tool.id()
                )));
            }
            if tool_body.z_min > body.z_min + LINEAR_TOLERANCE
                || tool_body.z_max < body.z_max - LINEAR_TOLERANCE
            {
                return Err(KernelError::BooleanFailed(format!(
                    "tool {} does not pass through the base (z {:.4}..{:.4} vs {:.4}..{:.4})",
                    tool.id(),
                    tool_body.z_min,
                    tool_body.z_max,
                    body.z_min,
                    body.z_max
                )));
            }

            let candidate = RingedLoop::new(tool_body.outer.clone().oriented(false));
            if !candidate.bbox.overlaps(&outer.bbox) {
                tracing::debug!(tool = %tool.id(), "tool lies outside the base");
                continue;
            }
            if rings_cross(&candidate.ring, &outer.ring) {
                let (notched, islands) = notch(&outer, candidate, &mut voids, tool)?;
                outer = notched;
                voids.extend(islands);
                continue;
            }
            if !point_in_ring(candidate.anchor, &outer.ring) {
                if point_in_ring(outer.anchor, &candidate.ring) {
                    return Err(KernelError::BooleanFailed(format!(
                        "tool {} removes the whole base",
                        tool.id()
                    )));
                }
                tracing::debug!(tool = %tool.id(), "tool lies outside the base");
                continue;
            }

            let (overlapping, rest): (Vec<_>, Vec<_>) = voids.into_iter().partition(|v| {
                v.bbox.overlaps(&candidate.bbox) && rings_cross(&candidate.ring, &v.ring)
            });
            voids = rest;
            if overlapping.is_empty() {
                insert_void(&mut voids, candidate);
            } else {
                tracing::debug!(
                    tool = %tool.id(),
                    merged = overlapping.len(),
                    "tool overlaps existing voids"
                );
                for merged in merge_voids(candidate, overlapping) {
                    insert_void(&mut voids, merged);
                }
            }
        }

        body.outer = outer.profile;
        body.holes = voids.into_iter().map(|v| v.profile).collect();
        Ok(self.store(body))
    }

    fn solid_info(&self, solid: &Solid) -> KernelResult<SolidInfo> {
        let body = self.body(solid)?;
        Ok(SolidInfo {
            volume: body.volume(),
            extents: body.outer.bbox(),
            z_min: body.z_min,
            z_max: body.z_max,
            voids: body.holes.len(),
        })
    }

    fn prism_body(&self, solid: &Solid) -> KernelResult<PrismBody> {
        self.body(solid).cloned()
    }

    fn release(&mut self, solid: &Solid) {
        self.solids.remove(&solid.id());
    }
}

/// Add a void that crosses no existing void. Voids it encloses are
/// dropped; a void that encloses it absorbs it.
fn insert_void(voids: &mut Vec<RingedLoop>, candidate: RingedLoop) {
    let mut swallowed = false;
    voids.retain(|existing| {
        if !existing.bbox.overlaps(&candidate.bbox) {
            return true;
        }
        if point_in_ring(candidate.anchor, &existing.ring) {
            swallowed = true;
            return true;
        }
        !point_in_ring(existing.anchor, &candidate.ring)
    });
    if !swallowed {
        voids.push(candidate);
    }
}

/// Union of a tool with the voids it partially overlaps.
fn merge_voids(candidate: RingedLoop, overlapping: Vec<RingedLoop>) -> Vec<RingedLoop> {
    let merged = overlapping
        .iter()
        .fold(to_region(&candidate.ring), |acc, v| acc.union(&to_region(&v.ring)));
    merged
        .into_iter()
        .filter_map(|polygon| {
            if !polygon.interiors().is_empty() {
                // Material ringed by cutters is not connected to the board.
                tracing::debug!(islands = polygon.interiors().len(), "dropping enclosed islands");
            }
            loop_from_line_string(polygon.exterior()).map(|l| RingedLoop::new(l.oriented(false)))
        })
        .collect()
}

/// Cut a tool that crosses the outer boundary into the outline itself.
///
/// Voids touched by the tool are removed along with it. Returns the new
/// outer loop and any voids the cut leaves behind.
fn notch(
    outer: &RingedLoop,
    candidate: RingedLoop,
    voids: &mut Vec<RingedLoop>,
    tool: &Solid,
) -> KernelResult<(RingedLoop, Vec<RingedLoop>)> {
    let mut cutter = to_region(&candidate.ring);
    voids.retain(|v| {
        let touched = v.bbox.overlaps(&candidate.bbox)
            && (rings_cross(&candidate.ring, &v.ring) || point_in_ring(v.anchor, &candidate.ring));
        if touched {
            cutter = cutter.union(&to_region(&v.ring));
        }
        !touched
    });

    let pieces: Vec<Polygon<f64>> = to_region(&outer.ring)
        .difference(&cutter)
        .into_iter()
        .filter(|p| p.unsigned_area() > LINEAR_TOLERANCE * LINEAR_TOLERANCE)
        .collect();
    let [piece] = pieces.as_slice() else {
        return Err(KernelError::BooleanFailed(if pieces.is_empty() {
            format!("tool {} removes the whole base", tool.id())
        } else {
            format!("tool {} splits the base into {} pieces", tool.id(), pieces.len())
        }));
    };

    let Some(exterior) = loop_from_line_string(piece.exterior()) else {
        return Err(KernelError::BooleanFailed(format!(
            "notch for tool {} collapsed the outline",
            tool.id()
        )));
    };
    tracing::debug!(tool = %tool.id(), "tool notches the outer boundary");
    let islands = piece
        .interiors()
        .iter()
        .filter_map(loop_from_line_string)
        .map(|l| RingedLoop::new(l.oriented(false)))
        .collect();
    Ok((RingedLoop::new(exterior.oriented(true)), islands))
}

fn to_region(ring: &[Vec2]) -> MultiPolygon<f64> {
    let mut coords: Vec<Coord<f64>> = ring.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    if let Some(first) = coords.first().copied() {
        coords.push(first);
    }
    MultiPolygon::new(vec![Polygon::new(LineString::new(coords), Vec::new())])
}

/// Straight-segment loop through the points of a closed ring, with
/// near-duplicate points merged.
fn loop_from_line_string(ring: &LineString<f64>) -> Option<ProfileLoop> {
    let mut points: Vec<Vec2> = Vec::new();
    for c in ring.coords() {
        let p = Vec2::new(c.x, c.y);
        if points.last().map_or(true, |last| last.distance(p) > LINEAR_TOLERANCE) {
            points.push(p);
        }
    }
    while points.len() > 1
        && points[0].distance(points[points.len() - 1]) <= LINEAR_TOLERANCE
    {
        points.pop();
    }
    if points.len() < 3 {
        return None;
    }
    let n = points.len();
    let segments = (0..n)
        .map(|i| ProfileSegment::Line {
            start: points[i],
            end: points[(i + 1) % n],
        })
        .collect();
    Some(ProfileLoop::new(segments))
}

struct RingedLoop {
    profile: ProfileLoop,
    ring: Vec<Vec2>,
    anchor: Vec2,
    bbox: BBox2,
}

impl RingedLoop {
    fn new(profile: ProfileLoop) -> Self {
        let ring = profile.ring();
        let bbox = ring_bbox(&ring);
        let anchor = ring.first().copied().unwrap_or_default();
        Self {
            profile,
            ring,
            anchor,
            bbox,
        }
    }
}

fn flat(p: Point3<f64>) -> Vec2 {
    Vec2::new(p.x, p.y)
}

fn profile_segment(edge: &Edge) -> KernelResult<ProfileSegment> {
    Ok(match *edge {
        Edge::Line { start, end } => ProfileSegment::Line {
            start: flat(start),
            end: flat(end),
        },
        Edge::Arc {
            center,
            radius,
            start,
            end,
            ccw,
        } => {
            let (c, s, e) = (flat(center), flat(start), flat(end));
            let tol = ARC_TOLERANCE.max(LINEAR_TOLERANCE * radius);
            if (c.distance(s) - radius).abs() > tol || (c.distance(e) - radius).abs() > tol {
                return Err(KernelError::InvalidProfile(format!(
                    "arc end points are not on radius {radius:.6} around ({:.4}, {:.4})",
                    c.x, c.y
                )));
            }
            ProfileSegment::Arc {
                center: c,
                radius,
                start: s,
                end: e,
                ccw,
            }
        }
        Edge::Circle {
            center,
            radius,
            ccw,
        } => ProfileSegment::Circle {
            center: flat(center),
            radius,
            ccw,
        },
        Edge::Bezier { points } => ProfileSegment::Bezier {
            points: points.map(flat),
        },
    })
}

fn ring_bbox(ring: &[Vec2]) -> BBox2 {
    let mut bbox = BBox2::empty();
    for p in ring {
        bbox.include_point(*p);
    }
    bbox
}

fn segment_bbox(a: Vec2, b: Vec2) -> BBox2 {
    BBox2::new(
        Vec2::new(a.x.min(b.x), a.y.min(b.y)),
        Vec2::new(a.x.max(b.x), a.y.max(b.y)),
    )
}

/// Reject profiles whose sampled boundary touches itself anywhere other than
/// between neighbouring segments.
fn check_simple(profile: &ProfileLoop) -> KernelResult<()> {
    let ring = profile.ring();
    let n = ring.len();
    if n < 3 {
        return Err(KernelError::InvalidProfile(format!(
            "boundary collapses to {n} points"
        )));
    }

    // Sweep over segments sorted by min x; only x-overlapping pairs are tested.
    let mut order: Vec<(usize, BBox2)> = (0..n)
        .map(|i| (i, segment_bbox(ring[i], ring[(i + 1) % n])))
        .collect();
    order.sort_by(|a, b| a.1.min.x.total_cmp(&b.1.min.x));

    for (k, &(i, bi)) in order.iter().enumerate() {
        for &(j, bj) in &order[k + 1..] {
            if bj.min.x > bi.max.x {
                break;
            }
            let gap = i.abs_diff(j);
            if gap <= 1 || gap == n - 1 || !bi.overlaps(&bj) {
                continue;
            }
            let (a0, a1) = (ring[i], ring[(i + 1) % n]);
            let (b0, b1) = (ring[j], ring[(j + 1) % n]);
            if segments_intersect(a0, a1, b0, b1, INTERSECT_EPS) {
                return Err(KernelError::SelfIntersecting(format!(
                    "boundary crosses itself near ({:.4}, {:.4})",
                    a0.x, a0.y
                )));
            }
        }
    }
    Ok(())
}

/// Whether any edge of ring `a` meets any edge of ring `b`.
fn rings_cross(a: &[Vec2], b: &[Vec2]) -> bool {
    let a_box = ring_bbox(a);
    let b_box = ring_bbox(b);
    let edges = |ring: &[Vec2], other: BBox2| -> Vec<(Vec2, Vec2, BBox2)> {
        let n = ring.len();
        (0..n)
            .map(|i| (ring[i], ring[(i + 1) % n]))
            .map(|(p, q)| (p, q, segment_bbox(p, q)))
            .filter(|(_, _, bb)| bb.overlaps(&other))
            .collect()
    };
    let a_edges = edges(a, b_box);
    let b_edges = edges(b, a_box);
    a_edges.iter().any(|(p0, p1, pb)| {
        b_edges
            .iter()
            .any(|(q0, q1, qb)| pb.overlaps(qb) && segments_intersect(*p0, *p1, *q0, *q1, INTERSECT_EPS))
    })
}
