//! Validated curve primitives on the board's edge layer.
//!
//! A [`Curve`] is built once from board geometry and only ever changes through
//! [`Curve::reverse`]. Arc angles, radius and end point are derived in the
//! constructor and cannot be set independently.

use crate::geom::{BBox2, Vec2};
use crate::model::Layer;
use std::f64::consts::{PI, TAU};
use std::fmt;
use thiserror::Error;

const ARC_STEP: f64 = PI / 32.0;
const CIRCLE_SEGMENTS: usize = 64;
const BEZIER_SEGMENTS: usize = 32;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CurveError {
    #[error("non-finite coordinate")]
    NonFinite,
    #[error("zero-length line (length {length:.6})")]
    ZeroLengthLine { length: f64 },
    #[error("degenerate arc radius ({radius:.6})")]
    DegenerateArcRadius { radius: f64 },
    #[error("degenerate arc sweep (end point coincides with start)")]
    ZeroSweepArc,
    #[error("degenerate circle radius ({radius:.6})")]
    DegenerateCircle { radius: f64 },
    #[error("degenerate bezier (all control points coincide)")]
    DegenerateBezier,
}

/// Arc geometry with its derived fields.
///
/// `start` is the radius reference point on the circle, `ep` the computed end.
/// `end_angle - start_angle == angle` always holds and the smaller of the two
/// angles lies in `[0, 2π)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcCurve {
    center: Vec2,
    start: Vec2,
    ep: Vec2,
    radius: f64,
    start_angle: f64,
    end_angle: f64,
    angle: f64,
}

impl ArcCurve {
    fn new(center: Vec2, start: Vec2, angle: f64) -> Self {
        let radius = center.distance(start);
        let mut start_angle = (start.y - center.y).atan2(start.x - center.x);
        if start_angle < 0.0 {
            start_angle += TAU;
        }
        let mut end_angle = start_angle + angle;
        if angle < 0.0 && end_angle < 0.0 {
            start_angle += TAU;
            end_angle += TAU;
        }
        let ep = center + Vec2::from_angle(end_angle) * radius;
        Self {
            center,
            start,
            ep,
            radius,
            start_angle,
            end_angle,
            angle,
        }
    }

    pub fn center(&self) -> Vec2 {
        self.center
    }

    pub fn start(&self) -> Vec2 {
        self.start
    }

    pub fn end(&self) -> Vec2 {
        self.ep
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn start_angle(&self) -> f64 {
        self.start_angle
    }

    pub fn end_angle(&self) -> f64 {
        self.end_angle
    }

    /// Signed sweep in radians, positive = counter-clockwise.
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn is_ccw(&self) -> bool {
        self.angle > 0.0
    }

    fn reverse(&mut self) {
        std::mem::swap(&mut self.start, &mut self.ep);
        std::mem::swap(&mut self.start_angle, &mut self.end_angle);
        self.angle = -self.angle;
    }

    /// Whether the sweep passes through the circle's left-most point (angle π).
    fn passes_leftmost(&self) -> bool {
        let lo = self.start_angle.min(self.end_angle);
        let hi = self.start_angle.max(self.end_angle);
        (lo <= PI && PI <= hi) || (lo <= 3.0 * PI && 3.0 * PI <= hi)
    }

    fn point_at(&self, t: f64) -> Vec2 {
        let a = self.start_angle + self.angle * t;
        self.center + Vec2::from_angle(a) * self.radius
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CurveForm {
    Line {
        start: Vec2,
        end: Vec2,
    },
    Arc(ArcCurve),
    Circle {
        center: Vec2,
        radius: f64,
    },
    Bezier {
        start: Vec2,
        ctrl1: Vec2,
        ctrl2: Vec2,
        end: Vec2,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    pub id: u64,
    pub layer: Layer,
    form: CurveForm,
}

impl Curve {
    pub fn line(id: u64, start: Vec2, end: Vec2, min_distance: f64) -> Result<Self, CurveError> {
        if !start.is_finite() || !end.is_finite() {
            return Err(CurveError::NonFinite);
        }
        let len_sq = start.distance_sq(end);
        if len_sq < min_distance * min_distance {
            return Err(CurveError::ZeroLengthLine {
                length: len_sq.sqrt(),
            });
        }
        Ok(Self::from_form(id, CurveForm::Line { start, end }))
    }

    /// `angle` is the signed sweep in radians (positive = counter-clockwise).
    pub fn arc(
        id: u64,
        center: Vec2,
        start: Vec2,
        angle: f64,
        min_distance: f64,
    ) -> Result<Self, CurveError> {
        if !center.is_finite() || !start.is_finite() || !angle.is_finite() {
            return Err(CurveError::NonFinite);
        }
        let min_sq = min_distance * min_distance;
        let radius_sq = center.distance_sq(start);
        if radius_sq < min_sq {
            return Err(CurveError::DegenerateArcRadius {
                radius: radius_sq.sqrt(),
            });
        }
        let arc = ArcCurve::new(center, start, angle);
        if arc.ep.distance_sq(arc.start) < min_sq {
            return Err(CurveError::ZeroSweepArc);
        }
        Ok(Self::from_form(id, CurveForm::Arc(arc)))
    }

    pub fn circle(id: u64, center: Vec2, radius: f64, min_distance: f64) -> Result<Self, CurveError> {
        if !center.is_finite() || !radius.is_finite() {
            return Err(CurveError::NonFinite);
        }
        if radius < min_distance || radius <= 0.0 {
            return Err(CurveError::DegenerateCircle { radius });
        }
        Ok(Self::from_form(id, CurveForm::Circle { center, radius }))
    }

    pub fn bezier(
        id: u64,
        start: Vec2,
        ctrl1: Vec2,
        ctrl2: Vec2,
        end: Vec2,
        min_distance: f64,
    ) -> Result<Self, CurveError> {
        let pts = [start, ctrl1, ctrl2, end];
        if pts.iter().any(|p| !p.is_finite()) {
            return Err(CurveError::NonFinite);
        }
        let min_sq = min_distance * min_distance;
        if pts.iter().all(|p| p.distance_sq(start) < min_sq) {
            return Err(CurveError::DegenerateBezier);
        }
        Ok(Self::from_form(
            id,
            CurveForm::Bezier {
                start,
                ctrl1,
                ctrl2,
                end,
            },
        ))
    }

    fn from_form(id: u64, form: CurveForm) -> Self {
        Self {
            id,
            layer: Layer::EdgeCuts,
            form,
        }
    }

    pub fn form(&self) -> &CurveForm {
        &self.form
    }

    pub fn is_circle(&self) -> bool {
        matches!(self.form, CurveForm::Circle { .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.form {
            CurveForm::Line { .. } => "line",
            CurveForm::Arc(_) => "arc",
            CurveForm::Circle { .. } => "circle",
            CurveForm::Bezier { .. } => "bezier",
        }
    }

    /// First point of the curve in its current direction.
    pub fn start(&self) -> Vec2 {
        match &self.form {
            CurveForm::Line { start, .. } => *start,
            CurveForm::Arc(arc) => arc.start,
            CurveForm::Circle { center, radius } => *center + Vec2::new(*radius, 0.0),
            CurveForm::Bezier { start, .. } => *start,
        }
    }

    /// Logical end point (computed end point for arcs).
    pub fn end(&self) -> Vec2 {
        match &self.form {
            CurveForm::Line { end, .. } => *end,
            CurveForm::Arc(arc) => arc.ep,
            CurveForm::Circle { center, radius } => *center + Vec2::new(*radius, 0.0),
            CurveForm::Bezier { end, .. } => *end,
        }
    }

    /// Traverse the curve backward.
    pub fn reverse(&mut self) {
        match &mut self.form {
            CurveForm::Line { start, end } => std::mem::swap(start, end),
            CurveForm::Arc(arc) => arc.reverse(),
            CurveForm::Circle { .. } => {}
            CurveForm::Bezier {
                start,
                ctrl1,
                ctrl2,
                end,
            } => {
                std::mem::swap(start, end);
                std::mem::swap(ctrl1, ctrl2);
            }
        }
    }

    /// Minimum X over the curve's feature points.
    pub fn leftmost_x(&self) -> f64 {
        match &self.form {
            CurveForm::Line { start, end } => start.x.min(end.x),
            CurveForm::Arc(arc) => {
                if arc.passes_leftmost() {
                    arc.center.x - arc.radius
                } else {
                    arc.start.x.min(arc.ep.x)
                }
            }
            CurveForm::Circle { center, radius } => center.x - radius,
            // Control points are ignored; only the end points count.
            CurveForm::Bezier { start, end, .. } => start.x.min(end.x),
        }
    }

    /// Polyline approximation from `start()` to `end()`, both included.
    pub fn sample(&self) -> Vec<Vec2> {
        match &self.form {
            CurveForm::Line { start, end } => vec![*start, *end],
            CurveForm::Arc(arc) => {
                let segments = ((arc.angle.abs() / ARC_STEP).ceil() as usize).clamp(2, 256);
                (0..=segments)
                    .map(|i| arc.point_at(i as f64 / segments as f64))
                    .collect()
            }
            CurveForm::Circle { center, radius } => (0..=CIRCLE_SEGMENTS)
                .map(|i| {
                    let a = i as f64 / CIRCLE_SEGMENTS as f64 * TAU;
                    *center + Vec2::from_angle(a) * *radius
                })
                .collect(),
            CurveForm::Bezier {
                start,
                ctrl1,
                ctrl2,
                end,
            } => (0..=BEZIER_SEGMENTS)
                .map(|i| bezier_eval([*start, *ctrl1, *ctrl2, *end], i as f64 / BEZIER_SEGMENTS as f64))
                .collect(),
        }
    }

    pub fn bbox(&self) -> BBox2 {
        let mut bbox = BBox2::empty();
        match &self.form {
            CurveForm::Circle { center, radius } => {
                bbox.include_point(*center - Vec2::new(*radius, *radius));
                bbox.include_point(*center + Vec2::new(*radius, *radius));
            }
            _ => {
                for p in self.sample() {
                    bbox.include_point(p);
                }
            }
        }
        bbox
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.form {
            CurveForm::Line { start, end } => write!(
                f,
                "line #{} ({:.4}, {:.4}) -> ({:.4}, {:.4})",
                self.id, start.x, start.y, end.x, end.y
            ),
            CurveForm::Arc(arc) => write!(
                f,
                "arc #{} center ({:.4}, {:.4}) radius {:.4} ({:.4}, {:.4}) -> ({:.4}, {:.4}) sweep {:.3} deg",
                self.id,
                arc.center.x,
                arc.center.y,
                arc.radius,
                arc.start.x,
                arc.start.y,
                arc.ep.x,
                arc.ep.y,
                arc.angle.to_degrees()
            ),
            CurveForm::Circle { center, radius } => write!(
                f,
                "circle #{} center ({:.4}, {:.4}) radius {:.4}",
                self.id, center.x, center.y, radius
            ),
            CurveForm::Bezier { start, end, .. } => write!(
                f,
                "bezier #{} ({:.4}, {:.4}) -> ({:.4}, {:.4})",
                self.id, start.x, start.y, end.x, end.y
            ),
        }
    }
}

pub fn bezier_eval(p: [Vec2; 4], t: f64) -> Vec2 {
    let u = 1.0 - t;
    let tt = t * t;
    let uu = u * u;
    let uuu = uu * u;
    let ttt = tt * t;

    let x = uuu * p[0].x + 3.0 * uu * t * p[1].x + 3.0 * u * tt * p[2].x + ttt * p[3].x;
    let y = uuu * p[0].y + 3.0 * uu * t * p[1].y + 3.0 * u * tt * p[2].y + ttt * p[3].y;
    Vec2::new(x, y)
}
