use crate::curve::{Curve, CurveError};
use crate::model::{to_model, BoardGraphic, GraphicShape};
use crate::report::{Diagnostic, DiagnosticCode, DiagnosticSink};
use std::f64::consts::TAU;

/// Default endpoint matching tolerance in millimetres.
pub const DEFAULT_MIN_DISTANCE: f64 = 0.01;
/// Floor applied to user supplied tolerances.
pub const MIN_ACCEPTABLE_DISTANCE: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeConfig {
    min_distance: f64,
}

impl NormalizeConfig {
    /// Tolerance is clamped to [`MIN_ACCEPTABLE_DISTANCE`].
    pub fn new(min_distance: f64) -> Self {
        let min_distance = if min_distance.is_finite() {
            min_distance.max(MIN_ACCEPTABLE_DISTANCE)
        } else {
            DEFAULT_MIN_DISTANCE
        };
        Self { min_distance }
    }

    pub fn min_distance(&self) -> f64 {
        self.min_distance
    }

    pub fn min_distance_sq(&self) -> f64 {
        self.min_distance * self.min_distance
    }
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeStats {
    pub graphics_total: usize,
    pub edge_curves: usize,
    pub rejected_curves: usize,
    pub skipped_other_layers: usize,
}

/// Index-addressable pool of curves. Taking a curve leaves a tombstone so
/// indices of the remaining curves never shift.
#[derive(Debug, Clone, Default)]
pub struct CurvePool {
    slots: Vec<Option<Curve>>,
    live: usize,
    leftmost: Option<usize>,
    leftmost_x: f64,
}

impl CurvePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a curve, tracking the owner of the minimum-X feature point.
    pub fn push(&mut self, curve: Curve) -> usize {
        let idx = self.slots.len();
        let x = curve.leftmost_x();
        if self.leftmost.is_none() || x < self.leftmost_x {
            self.leftmost = Some(idx);
            self.leftmost_x = x;
        }
        self.slots.push(Some(curve));
        self.live += 1;
        idx
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Index of the curve owning the left-most feature point, if still pooled.
    pub fn leftmost(&self) -> Option<usize> {
        self.leftmost.filter(|&i| self.slots[i].is_some())
    }

    pub fn get(&self, idx: usize) -> Option<&Curve> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    pub fn take(&mut self, idx: usize) -> Option<Curve> {
        let curve = self.slots.get_mut(idx)?.take()?;
        self.live -= 1;
        Some(curve)
    }

    pub fn take_leftmost(&mut self) -> Option<Curve> {
        let idx = self.leftmost()?;
        self.take(idx)
    }

    /// Remove the first remaining curve in insertion order.
    pub fn take_first(&mut self) -> Option<Curve> {
        let idx = self.slots.iter().position(Option::is_some)?;
        self.take(idx)
    }

    /// First remaining curve (in insertion order) accepted by `pred`.
    pub fn position(&self, mut pred: impl FnMut(&Curve) -> bool) -> Option<usize> {
        self.iter().find(|(_, c)| pred(c)).map(|(i, _)| i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Curve)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (i, c)))
    }
}

/// Validate edge-layer graphics into a [`CurvePool`].
///
/// Each rejected graphic produces one `degenerate_primitive` diagnostic and is
/// dropped; graphics on other layers are skipped silently.
pub fn ingest(
    graphics: &[BoardGraphic],
    cfg: &NormalizeConfig,
    sink: &mut dyn DiagnosticSink,
) -> (CurvePool, NormalizeStats) {
    let mut stats = NormalizeStats {
        graphics_total: graphics.len(),
        ..NormalizeStats::default()
    };
    let mut pool = CurvePool::new();

    for graphic in graphics {
        if !graphic.layer.is_edge_cuts() {
            stats.skipped_other_layers += 1;
            continue;
        }
        match curve_from_graphic(graphic, cfg.min_distance()) {
            Ok(curve) => {
                pool.push(curve);
                stats.edge_curves += 1;
            }
            Err(err) => {
                stats.rejected_curves += 1;
                sink.report(Diagnostic::new(
                    DiagnosticCode::DegeneratePrimitive,
                    format!(
                        "rejected {} #{}: {err}",
                        shape_name(&graphic.shape),
                        graphic.id
                    ),
                ));
            }
        }
    }

    tracing::debug!(
        curves = stats.edge_curves,
        rejected = stats.rejected_curves,
        leftmost = ?pool.leftmost(),
        "ingested edge graphics"
    );
    (pool, stats)
}

/// Convert one board graphic into a model-frame curve.
pub fn curve_from_graphic(graphic: &BoardGraphic, min_distance: f64) -> Result<Curve, CurveError> {
    let id = graphic.id;
    match &graphic.shape {
        GraphicShape::Line { start, end } => {
            Curve::line(id, to_model(*start), to_model(*end), min_distance)
        }
        GraphicShape::Arc {
            center,
            start,
            angle_deg,
        } => {
            let center = to_model(*center);
            let start = to_model(*start);
            let angle = angle_deg.to_radians();
            if angle.abs() >= TAU - 1e-9 {
                Curve::circle(id, center, center.distance(start), min_distance)
            } else {
                Curve::arc(id, center, start, angle, min_distance)
            }
        }
        GraphicShape::Circle { center, radius } => {
            Curve::circle(id, to_model(*center), *radius, min_distance)
        }
        GraphicShape::Bezier {
            start,
            ctrl1,
            ctrl2,
            end,
        } => Curve::bezier(
            id,
            to_model(*start),
            to_model(*ctrl1),
            to_model(*ctrl2),
            to_model(*end),
            min_distance,
        ),
    }
}

fn shape_name(shape: &GraphicShape) -> &'static str {
    match shape {
        GraphicShape::Line { .. } => "line",
        GraphicShape::Arc { .. } => "arc",
        GraphicShape::Circle { .. } => "circle",
        GraphicShape::Bezier { .. } => "bezier",
    }
}
