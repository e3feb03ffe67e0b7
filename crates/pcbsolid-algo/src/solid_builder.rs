//! Closed outline to extruded solid.

use crate::kernel::{Edge, Kernel, KernelError, Solid};
use nalgebra::Point3;
use pcbsolid_core::curve::{Curve, CurveForm};
use pcbsolid_core::geom::Vec2;
use pcbsolid_core::outline::Outline;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("outline is not closed")]
    NotClosed,
    #[error(transparent)]
    Kernel(#[from] KernelError),
}

/// Extrude a closed outline from `base_z` by `height`.
///
/// An empty outline yields `Ok(None)`.
pub fn build_solid(
    kernel: &mut dyn Kernel,
    outline: &Outline,
    base_z: f64,
    height: f64,
) -> Result<Option<Solid>, BuildError> {
    if outline.is_empty() {
        return Ok(None);
    }
    if !outline.is_closed() {
        return Err(BuildError::NotClosed);
    }

    let edges = outline_edges(outline, base_z);
    let wire = kernel.make_wire(edges)?;
    let face = kernel.make_face(&wire)?;
    let solid = kernel.extrude(&face, height)?;
    Ok(Some(solid))
}

/// One kernel edge per outline member at elevation `z`.
///
/// Neighbouring members only meet within the matching tolerance, so every
/// joint is moved onto a single shared point. Points that lie on an arc win,
/// which keeps arc end points on their circles.
pub fn outline_edges(outline: &Outline, z: f64) -> Vec<Edge> {
    let members: Vec<&Curve> = outline.iter().collect();
    let n = members.len();
    if n == 1 {
        if let CurveForm::Circle { center, radius } = members[0].form() {
            return vec![Edge::Circle {
                center: lift(*center, z),
                radius: *radius,
                ccw: true,
            }];
        }
    }

    // joints[i] is where member i starts and member i-1 ends.
    let joints: Vec<Vec2> = (0..n)
        .map(|i| joint(members[(i + n - 1) % n], members[i]))
        .collect();

    members
        .iter()
        .enumerate()
        .map(|(i, curve)| {
            let start = joints[i];
            let end = joints[(i + 1) % n];
            edge_for(curve, start, end, z)
        })
        .collect()
}

fn joint(prev: &Curve, next: &Curve) -> Vec2 {
    match (prev.form(), next.form()) {
        (_, CurveForm::Arc(_)) => next.start(),
        _ => prev.end(),
    }
}

fn edge_for(curve: &Curve, start: Vec2, end: Vec2, z: f64) -> Edge {
    match curve.form() {
        CurveForm::Line { .. } => Edge::Line {
            start: lift(start, z),
            end: lift(end, z),
        },
        CurveForm::Arc(arc) => Edge::Arc {
            center: lift(arc.center(), z),
            radius: arc.radius(),
            start: lift(start, z),
            end: lift(end, z),
            ccw: arc.is_ccw(),
        },
        CurveForm::Circle { center, radius } => Edge::Circle {
            center: lift(*center, z),
            radius: *radius,
            ccw: true,
        },
        CurveForm::Bezier { ctrl1, ctrl2, .. } => Edge::Bezier {
            points: [lift(start, z), lift(*ctrl1, z), lift(*ctrl2, z), lift(end, z)],
        },
    }
}

fn lift(p: Vec2, z: f64) -> Point3<f64> {
    Point3::new(p.x, p.y, z)
}
