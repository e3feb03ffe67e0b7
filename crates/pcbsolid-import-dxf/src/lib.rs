//! Board outline import from DXF drawings.
//!
//! DXF is Y-up; board graphics are Y-down, so every point is mirrored on
//! the way out. Sweep signs survive the mirror because board angles are
//! measured as seen on screen.

use anyhow::{Context, Result};
use dxf::entities::EntityType;
use pcbsolid_core::geom::Vec2;
use pcbsolid_core::model::{BoardGraphic, GraphicShape, Layer};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::path::Path;

pub const DEFAULT_LAYER: &str = "Edge.Cuts";

const MAX_INSERT_DEPTH: usize = 8;
const SAMPLES_PER_SPAN: usize = 8;

/// Which DXF layers become edge-cuts graphics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerFilter {
    Any,
    /// Case-insensitive layer name.
    Named(String),
}

impl LayerFilter {
    /// `*` selects every layer.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s == "*" {
            LayerFilter::Any
        } else {
            LayerFilter::Named(s.to_string())
        }
    }

    pub fn matches(&self, layer: &str) -> bool {
        match self {
            LayerFilter::Any => true,
            LayerFilter::Named(name) => name.eq_ignore_ascii_case(layer),
        }
    }
}

impl Default for LayerFilter {
    fn default() -> Self {
        LayerFilter::Named(DEFAULT_LAYER.to_string())
    }
}

pub fn import_dxf_outline(path: &Path, filter: &LayerFilter) -> Result<Vec<BoardGraphic>> {
    let drawing = dxf::Drawing::load_file(path).with_context(|| format!("load DXF: {path:?}"))?;
    let graphics = graphics_from_drawing(&drawing, filter);
    tracing::info!(
        path = %path.display(),
        graphics = graphics.len(),
        edge = graphics.iter().filter(|g| g.layer.is_edge_cuts()).count(),
        "imported DXF outline"
    );
    Ok(graphics)
}

/// Convert every supported entity, expanding block inserts.
pub fn graphics_from_drawing(drawing: &dxf::Drawing, filter: &LayerFilter) -> Vec<BoardGraphic> {
    let mut importer = DxfImporter::new(drawing, filter);
    importer.import_all();
    importer.graphics
}

struct DxfImporter<'a> {
    drawing: &'a dxf::Drawing,
    filter: &'a LayerFilter,
    blocks: HashMap<String, &'a dxf::Block>,
    next_id: u64,
    graphics: Vec<BoardGraphic>,
}

impl<'a> DxfImporter<'a> {
    fn new(drawing: &'a dxf::Drawing, filter: &'a LayerFilter) -> Self {
        let mut blocks = HashMap::new();
        for block in drawing.blocks() {
            blocks.insert(block.name.to_ascii_lowercase(), block);
        }
        Self {
            drawing,
            filter,
            blocks,
            next_id: 1,
            graphics: Vec::new(),
        }
    }

    fn import_all(&mut self) {
        let tx = Transform2D::identity();
        let mut stack = Vec::new();
        for ent in self.drawing.entities() {
            self.import_entity(ent, &tx, None, &mut stack, 0);
        }
    }

    fn import_entity(
        &mut self,
        ent: &dxf::entities::Entity,
        tx: &Transform2D,
        parent_layer: Option<&str>,
        stack: &mut Vec<String>,
        depth: usize,
    ) {
        let layer = resolve_layer(&ent.common.layer, parent_layer);
        match &ent.specific {
            EntityType::Insert(insert) => {
                self.import_insert(insert, &layer, tx, stack, depth + 1);
            }
            EntityType::Line(line) => {
                let a = tx.apply_point(Vec2::new(line.p1.x, line.p1.y));
                let b = tx.apply_point(Vec2::new(line.p2.x, line.p2.y));
                self.push_line(&layer, a, b);
            }
            EntityType::Circle(circle) => {
                let center = Vec2::new(circle.center.x, circle.center.y);
                if let Some((scale, _)) = tx.uniform_scale_rotation() {
                    let center = tx.apply_point(center);
                    self.push(
                        &layer,
                        GraphicShape::Circle {
                            center: to_board(center),
                            radius: circle.radius * scale,
                        },
                    );
                } else {
                    let points = arc_points(center, circle.radius, 0.0, TAU, 64);
                    self.push_chain(&layer, points.into_iter().map(|p| tx.apply_point(p)));
                }
            }
            EntityType::Arc(arc) => {
                let center = Vec2::new(arc.center.x, arc.center.y);
                let a0 = arc.start_angle.to_radians();
                let sweep = ccw_sweep(a0, arc.end_angle.to_radians());
                self.push_arc(&layer, tx, center, arc.radius, a0, sweep);
            }
            EntityType::LwPolyline(poly) => {
                let vertices: Vec<(Vec2, f64)> = poly
                    .vertices
                    .iter()
                    .map(|v| (Vec2::new(v.x, v.y), v.bulge))
                    .collect();
                self.push_polyline(&layer, tx, &vertices, poly.is_closed());
            }
            EntityType::Polyline(poly) => {
                let vertices: Vec<(Vec2, f64)> = poly
                    .vertices()
                    .map(|v| (Vec2::new(v.location.x, v.location.y), v.bulge))
                    .collect();
                self.push_polyline(&layer, tx, &vertices, poly.is_closed());
            }
            EntityType::Spline(spline) => {
                self.import_spline(spline, &layer, tx);
            }
            EntityType::Ellipse(ellipse) => {
                self.import_ellipse(ellipse, &layer, tx);
            }
            _ => {
                tracing::trace!(layer = %layer, "ignoring unsupported DXF entity");
            }
        }
    }

    fn import_insert(
        &mut self,
        insert: &dxf::entities::Insert,
        insert_layer: &str,
        parent_tx: &Transform2D,
        stack: &mut Vec<String>,
        depth: usize,
    ) {
        if depth > MAX_INSERT_DEPTH {
            tracing::warn!(block = %insert.name, "block nesting too deep; insert skipped");
            return;
        }
        let name = insert.name.to_ascii_lowercase();
        if stack.iter().any(|n| n == &name) {
            tracing::warn!(block = %insert.name, "recursive block insert skipped");
            return;
        }
        let Some(block) = self.blocks.get(&name).copied() else {
            tracing::warn!(block = %insert.name, "insert references an unknown block");
            return;
        };
        let base = Vec2::new(block.base_point.x, block.base_point.y);
        stack.push(name);
        let loc = Vec2::new(insert.location.x, insert.location.y);
        let scale = Vec2::new(insert.x_scale_factor, insert.y_scale_factor);
        let col_count = insert.column_count.max(1) as i32;
        let row_count = insert.row_count.max(1) as i32;

        for row in 0..row_count {
            for col in 0..col_count {
                let offset = Vec2::new(
                    col as f64 * insert.column_spacing,
                    row as f64 * insert.row_spacing,
                );
                let local_tx = Transform2D::from_insert(base, loc, scale, insert.rotation, offset);
                let combined = parent_tx.compose(&local_tx);
                for ent in &block.entities {
                    self.import_entity(ent, &combined, Some(insert_layer), stack, depth);
                }
            }
        }

        stack.pop();
    }

    fn import_spline(&mut self, spline: &dxf::entities::Spline, layer: &str, tx: &Transform2D) {
        let control: Vec<Vec2> = spline
            .control_points
            .iter()
            .map(|p| Vec2::new(p.x, p.y))
            .collect();
        let degree = usize::try_from(spline.degree_of_curve).unwrap_or(0);
        let rational = spline.weight_values.iter().any(|w| (w - 1.0).abs() > 1e-12);

        if degree == 3 && control.len() == 4 && !rational {
            let p: Vec<Vec2> = control.iter().map(|p| tx.apply_point(*p)).collect();
            self.push(
                layer,
                GraphicShape::Bezier {
                    start: to_board(p[0]),
                    ctrl1: to_board(p[1]),
                    ctrl2: to_board(p[2]),
                    end: to_board(p[3]),
                },
            );
            return;
        }

        let points = if !rational {
            bspline_points(degree, &spline.knot_values, &control)
        } else {
            None
        };
        let points = points.unwrap_or_else(|| {
            // Fall back to the fit points, then the control polygon.
            if spline.fit_points.len() >= 2 {
                spline.fit_points.iter().map(|p| Vec2::new(p.x, p.y)).collect()
            } else {
                control
            }
        });
        self.push_chain(layer, points.into_iter().map(|p| tx.apply_point(p)));
    }

    fn import_ellipse(&mut self, ellipse: &dxf::entities::Ellipse, layer: &str, tx: &Transform2D) {
        let center = Vec2::new(ellipse.center.x, ellipse.center.y);
        let major = Vec2::new(ellipse.major_axis.x, ellipse.major_axis.y);
        let major_len = major.length();
        if !major_len.is_finite() || major_len <= 0.0 {
            return;
        }
        let minor = major.rot90() * ellipse.minor_axis_ratio;
        let points = ellipse_points(
            center,
            major,
            minor,
            ellipse.start_parameter,
            ellipse.end_parameter,
            64,
        );
        self.push_chain(layer, points.into_iter().map(|p| tx.apply_point(p)));
    }

    fn push_polyline(&mut self, layer: &str, tx: &Transform2D, vertices: &[(Vec2, f64)], closed: bool) {
        let n = vertices.len();
        if n < 2 {
            return;
        }
        let spans = if closed { n } else { n - 1 };
        for i in 0..spans {
            let (a, bulge) = vertices[i];
            let (b, _) = vertices[(i + 1) % n];
            if bulge.abs() < 1e-12 {
                self.push_line(layer, tx.apply_point(a), tx.apply_point(b));
                continue;
            }
            let sweep = 4.0 * bulge.atan();
            let chord = b - a;
            let f = (1.0 - bulge * bulge) / (4.0 * bulge);
            let center = a.lerp(b, 0.5) + chord.rot90() * f;
            let radius = center.distance(a);
            let a0 = (a.y - center.y).atan2(a.x - center.x);
            self.push_arc(layer, tx, center, radius, a0, sweep);
        }
    }

    /// Arc in drawing space starting at angle `a0` (radians) with signed `sweep`.
    fn push_arc(&mut self, layer: &str, tx: &Transform2D, center: Vec2, radius: f64, a0: f64, sweep: f64) {
        if let Some((scale, rot)) = tx.uniform_scale_rotation() {
            let c = tx.apply_point(center);
            let start = c + Vec2::from_angle(a0 + rot) * (radius * scale);
            self.push(
                layer,
                GraphicShape::Arc {
                    center: to_board(c),
                    start: to_board(start),
                    angle_deg: sweep.to_degrees(),
                },
            );
        } else {
            let points = arc_points(center, radius, a0, sweep, 48);
            self.push_chain(layer, points.into_iter().map(|p| tx.apply_point(p)));
        }
    }

    fn push_chain(&mut self, layer: &str, points: impl Iterator<Item = Vec2>) {
        let points: Vec<Vec2> = points.collect();
        for pair in points.windows(2) {
            self.push_line(layer, pair[0], pair[1]);
        }
    }

    fn push_line(&mut self, layer: &str, a: Vec2, b: Vec2) {
        self.push(
            layer,
            GraphicShape::Line {
                start: to_board(a),
                end: to_board(b),
            },
        );
    }

    fn push(&mut self, layer: &str, shape: GraphicShape) {
        let layer = if self.filter.matches(layer) {
            Layer::EdgeCuts
        } else {
            Layer::Other(layer.to_string())
        };
        let id = self.next_id;
        self.next_id += 1;
        self.graphics.push(BoardGraphic { id, layer, shape });
    }
}

/// Entities on layer `0` inside a block take the insert's layer.
fn resolve_layer(layer: &str, parent: Option<&str>) -> String {
    match parent {
        Some(parent) if layer.eq_ignore_ascii_case("0") => parent.to_string(),
        _ => layer.to_string(),
    }
}

fn to_board(p: Vec2) -> Vec2 {
    Vec2::new(p.x, -p.y)
}

/// Counter-clockwise sweep from `a0` to `a1`, in `(0, 2π]`.
fn ccw_sweep(a0: f64, a1: f64) -> f64 {
    let sweep = (a1 - a0).rem_euclid(TAU);
    if sweep < 1e-12 {
        TAU
    } else {
        sweep
    }
}

#[derive(Debug, Clone, Copy)]
struct Transform2D {
    m11: f64,
    m12: f64,
    m21: f64,
    m22: f64,
    tx: f64,
    ty: f64,
}

impl Transform2D {
    fn identity() -> Self {
        Self {
            m11: 1.0,
            m12: 0.0,
            m21: 0.0,
            m22: 1.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    fn from_insert(base: Vec2, location: Vec2, scale: Vec2, rotation_deg: f64, offset: Vec2) -> Self {
        let r = rotation_deg.to_radians();
        let (sin, cos) = r.sin_cos();
        let m11 = cos * scale.x;
        let m12 = -sin * scale.y;
        let m21 = sin * scale.x;
        let m22 = cos * scale.y;

        let off_x = m11 * offset.x + m12 * offset.y;
        let off_y = m21 * offset.x + m22 * offset.y;
        let tx = location.x + off_x - (m11 * base.x + m12 * base.y);
        let ty = location.y + off_y - (m21 * base.x + m22 * base.y);

        Self {
            m11,
            m12,
            m21,
            m22,
            tx,
            ty,
        }
    }

    fn compose(&self, other: &Transform2D) -> Self {
        Self {
            m11: self.m11 * other.m11 + self.m12 * other.m21,
            m12: self.m11 * other.m12 + self.m12 * other.m22,
            m21: self.m21 * other.m11 + self.m22 * other.m21,
            m22: self.m21 * other.m12 + self.m22 * other.m22,
            tx: self.m11 * other.tx + self.m12 * other.ty + self.tx,
            ty: self.m21 * other.tx + self.m22 * other.ty + self.ty,
        }
    }

    fn apply_point(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            self.m11 * p.x + self.m12 * p.y + self.tx,
            self.m21 * p.x + self.m22 * p.y + self.ty,
        )
    }

    /// `(scale, rotation)` when the transform is a similarity without mirroring.
    fn uniform_scale_rotation(&self) -> Option<(f64, f64)> {
        const EPS: f64 = 1e-6;
        let sx = (self.m11 * self.m11 + self.m21 * self.m21).sqrt();
        let sy = (self.m12 * self.m12 + self.m22 * self.m22).sqrt();
        if !sx.is_finite() || !sy.is_finite() {
            return None;
        }
        if (sx - sy).abs() > EPS {
            return None;
        }
        let dot = self.m11 * self.m12 + self.m21 * self.m22;
        if dot.abs() > EPS {
            return None;
        }
        let det = self.m11 * self.m22 - self.m12 * self.m21;
        if det < 0.0 {
            return None;
        }
        let rot = self.m21.atan2(self.m11);
        Some((sx, rot))
    }
}

fn arc_points(center: Vec2, radius: f64, a0: f64, sweep: f64, segments: usize) -> Vec<Vec2> {
    if !radius.is_finite() || radius <= 0.0 || segments < 2 {
        return Vec::new();
    }
    (0..=segments)
        .map(|i| {
            let a = a0 + sweep * (i as f64 / segments as f64);
            center + Vec2::from_angle(a) * radius
        })
        .collect()
}

fn ellipse_points(center: Vec2, major: Vec2, minor: Vec2, start: f64, end: f64, segments: usize) -> Vec<Vec2> {
    if segments < 2 || !start.is_finite() || !end.is_finite() {
        return Vec::new();
    }
    let sweep = ccw_sweep(start, end);
    (0..=segments)
        .map(|i| {
            let a = start + sweep * (i as f64 / segments as f64);
            center + major * a.cos() + minor * a.sin()
        })
        .collect()
}

/// Sample a clamped, non-rational B-spline with de Boor's algorithm.
///
/// `None` when the knot vector does not fit the control points.
fn bspline_points(degree: usize, knots: &[f64], control: &[Vec2]) -> Option<Vec<Vec2>> {
    let n = control.len();
    if degree == 0 || n <= degree || knots.len() != n + degree + 1 {
        return None;
    }
    if knots.windows(2).any(|w| w[1] < w[0]) {
        return None;
    }
    let t0 = knots[degree];
    let t1 = knots[n];
    if t1 <= t0 {
        return None;
    }

    let spans = n - degree;
    let samples = spans * SAMPLES_PER_SPAN;
    let points = (0..=samples)
        .map(|i| {
            let t = t0 + (t1 - t0) * (i as f64 / samples as f64);
            de_boor(degree, knots, control, t)
        })
        .collect();
    Some(points)
}

fn de_boor(p: usize, knots: &[f64], control: &[Vec2], t: f64) -> Vec2 {
    let n = control.len();
    // Knot span k with knots[k] <= t < knots[k + 1], clamped to the last span.
    let mut k = p;
    while k + 1 < n && knots[k + 1] <= t {
        k += 1;
    }
    let mut d: Vec<Vec2> = (0..=p).map(|j| control[j + k - p]).collect();
    for r in 1..=p {
        for j in (r..=p).rev() {
            let i = j + k - p;
            let denom = knots[i + p + 1 - r] - knots[i];
            let alpha = if denom.abs() < 1e-15 {
                0.0
            } else {
                (t - knots[i]) / denom
            };
            d[j] = d[j - 1].lerp(d[j], alpha);
        }
    }
    d[p]
}
