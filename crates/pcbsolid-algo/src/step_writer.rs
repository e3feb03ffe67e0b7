//! ISO 10303-21 (AP214) output for a board assembly.
//!
//! Board bodies become `MANIFOLD_SOLID_BREP`s built straight from the kernel's
//! prism description; component meshes become `FACETED_BREP`s. Every part is
//! its own product, placed under one root product.

use crate::assembly::{Assembly, ComponentModel};
use crate::kernel::{Kernel, PrismBody, ProfileLoop, ProfileSegment};
use anyhow::{Context, Result};
use itertools::Itertools;
use nalgebra::{Isometry3, Point3, Vector3};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

/// Metadata stamped into the file header.
#[derive(Debug, Clone, PartialEq)]
pub struct StepHeader {
    pub author: String,
    pub organization: String,
    /// ISO 8601 timestamp; the current local time when unset.
    pub timestamp: Option<String>,
}

impl Default for StepHeader {
    fn default() -> Self {
        Self {
            author: "pcbsolid".to_string(),
            organization: String::new(),
            timestamp: None,
        }
    }
}

pub fn save_step(
    path: &Path,
    assembly: &Assembly,
    kernel: &dyn Kernel,
    header: &StepHeader,
) -> Result<()> {
    let content = write_step(assembly, kernel, header)?;
    std::fs::write(path, content).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

pub fn write_step(assembly: &Assembly, kernel: &dyn Kernel, header: &StepHeader) -> Result<String> {
    let name = if assembly.name.trim().is_empty() {
        "board"
    } else {
        assembly.name.trim()
    };

    let mut b = StepBuilder::new();
    let ctx = b.contexts();
    let root = b.product(name, &ctx);
    let root_rep = b.writer.reserve();
    let mut root_items = vec![b.axis(Point3::origin(), Vector3::z(), Vector3::x())];
    let mut instance = 0usize;

    for board in &assembly.boards {
        let body = kernel
            .prism_body(&board.solid)
            .with_context(|| format!("board body '{}' is not available", board.name))?;
        let part = b.product(&board.name, &ctx);
        let brep = b.board_brep(&board.name, &body);
        b.colour(brep, board.color, ctx.rep);
        let part_axis = b.axis(Point3::origin(), Vector3::z(), Vector3::x());
        let rep = b.writer.push(format!(
            "ADVANCED_BREP_SHAPE_REPRESENTATION('{}',(#{brep},#{part_axis}),#{})",
            escape_step_string(&board.name),
            ctx.rep
        ));
        b.writer.push(format!(
            "SHAPE_DEFINITION_REPRESENTATION(#{},#{rep})",
            part.pds
        ));
        instance += 1;
        let placed = b.link(
            &root,
            root_rep,
            &part,
            Linked {
                rep,
                axis: part_axis,
            },
            &Isometry3::identity(),
            &board.name,
            instance,
        );
        root_items.push(placed);
    }

    let mut parts: HashMap<*const ComponentModel, (Part, Linked)> = HashMap::new();
    for component in &assembly.components {
        let key = std::rc::Rc::as_ptr(&component.model);
        if !parts.contains_key(&key) {
            let model = &component.model;
            let part = b.product(&model.name, &ctx);
            let brep = b.faceted_brep(model);
            let part_axis = b.axis(Point3::origin(), Vector3::z(), Vector3::x());
            let rep = b.writer.push(format!(
                "FACETED_BREP_SHAPE_REPRESENTATION('{}',(#{brep},#{part_axis}),#{})",
                escape_step_string(&model.name),
                ctx.rep
            ));
            b.writer.push(format!(
                "SHAPE_DEFINITION_REPRESENTATION(#{},#{rep})",
                part.pds
            ));
            parts.insert(
                key,
                (
                    part,
                    Linked {
                        rep,
                        axis: part_axis,
                    },
                ),
            );
        }
        let Some((part, linked)) = parts.get(&key).cloned() else {
            continue;
        };
        instance += 1;
        let placed = b.link(
            &root,
            root_rep,
            &part,
            linked,
            &component.location,
            &component.reference,
            instance,
        );
        root_items.push(placed);
    }

    b.writer.fill(
        root_rep,
        format!(
            "SHAPE_REPRESENTATION('{}',({}),#{})",
            escape_step_string(name),
            id_list(&root_items),
            ctx.rep
        ),
    );
    b.writer.push(format!(
        "SHAPE_DEFINITION_REPRESENTATION(#{},#{root_rep})",
        root.pds
    ));

    let timestamp = header
        .timestamp
        .clone()
        .unwrap_or_else(|| chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string());

    let mut out = String::new();
    writeln!(out, "ISO-10303-21;")?;
    writeln!(out, "HEADER;")?;
    writeln!(out, "FILE_DESCRIPTION(('pcbsolid board assembly'),'2;1');")?;
    writeln!(
        out,
        "FILE_NAME('{}.step','{}',('{}'),('{}'),'pcbsolid','pcbsolid','');",
        escape_step_string(name),
        escape_step_string(&timestamp),
        escape_step_string(&header.author),
        escape_step_string(&header.organization)
    )?;
    writeln!(out, "FILE_SCHEMA(('AUTOMOTIVE_DESIGN {{ 1 0 10303 214 1 1 1 1 }}'));")?;
    writeln!(out, "ENDSEC;")?;
    writeln!(out, "DATA;")?;
    for line in &b.writer.lines {
        writeln!(out, "{line}")?;
    }
    writeln!(out, "ENDSEC;")?;
    writeln!(out, "END-ISO-10303-21;")?;
    Ok(out)
}

struct StepWriter {
    next_id: u32,
    lines: Vec<String>,
}

impl StepWriter {
    fn new() -> Self {
        Self {
            next_id: 1,
            lines: Vec::new(),
        }
    }

    fn push(&mut self, entity: String) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.lines.push(format!("#{id}={entity};"));
        id
    }

    /// Claim an id whose entity is written later with [`StepWriter::fill`].
    fn reserve(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.lines.push(String::new());
        id
    }

    fn fill(&mut self, id: u32, entity: String) {
        if let Some(line) = self.lines.get_mut(id as usize - 1) {
            *line = format!("#{id}={entity};");
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Contexts {
    product: u32,
    definition: u32,
    rep: u32,
}

#[derive(Debug, Clone, Copy)]
struct Part {
    pd: u32,
    pds: u32,
}

#[derive(Debug, Clone, Copy)]
struct Linked {
    rep: u32,
    axis: u32,
}

/// Vertex of a wall loop: cartesian point and its vertex.
#[derive(Debug, Clone, Copy)]
struct Corner {
    point: u32,
    vertex: u32,
}

struct StepBuilder {
    writer: StepWriter,
    up: Option<u32>,
}

impl StepBuilder {
    fn new() -> Self {
        Self {
            writer: StepWriter::new(),
            up: None,
        }
    }

    fn contexts(&mut self) -> Contexts {
        let w = &mut self.writer;
        let app = w.push(
            "APPLICATION_CONTEXT('core data for automotive mechanical design processes')".into(),
        );
        w.push(format!(
            "APPLICATION_PROTOCOL_DEFINITION('international standard','automotive_design',2000,#{app})"
        ));
        let product = w.push(format!("PRODUCT_CONTEXT('',#{app},'mechanical')"));
        let definition = w.push(format!(
            "PRODUCT_DEFINITION_CONTEXT('part definition',#{app},'design')"
        ));
        let len = w.push("(LENGTH_UNIT()NAMED_UNIT(*)SI_UNIT(.MILLI.,.METRE.))".into());
        let angle = w.push("(NAMED_UNIT(*)PLANE_ANGLE_UNIT()SI_UNIT($,.RADIAN.))".into());
        let solid = w.push("(NAMED_UNIT(*)SOLID_ANGLE_UNIT()SI_UNIT($,.STERADIAN.))".into());
        let uncertainty = w.push(format!(
            "UNCERTAINTY_MEASURE_WITH_UNIT(LENGTH_MEASURE(1.E-6),#{len},'distance_accuracy_value','')"
        ));
        let rep = w.push(format!(
            "(GEOMETRIC_REPRESENTATION_CONTEXT(3)GLOBAL_UNCERTAINTY_ASSIGNED_CONTEXT((#{uncertainty}))GLOBAL_UNIT_ASSIGNED_CONTEXT((#{len},#{angle},#{solid}))REPRESENTATION_CONTEXT('',''))"
        ));
        Contexts {
            product,
            definition,
            rep,
        }
    }

    fn product(&mut self, name: &str, ctx: &Contexts) -> Part {
        let name = escape_step_string(name);
        let w = &mut self.writer;
        let product = w.push(format!(
            "PRODUCT('{name}','{name}','',(#{}))",
            ctx.product
        ));
        w.push(format!("PRODUCT_RELATED_PRODUCT_CATEGORY('part',$,(#{product}))"));
        let formation = w.push(format!(
            "PRODUCT_DEFINITION_FORMATION('','',#{product})"
        ));
        let pd = w.push(format!(
            "PRODUCT_DEFINITION('design','',#{formation},#{})",
            ctx.definition
        ));
        let pds = w.push(format!("PRODUCT_DEFINITION_SHAPE('','',#{pd})"));
        Part { pd, pds }
    }

    /// Place `child` under `parent`; returns the placement axis for the parent representation.
    #[allow(clippy::too_many_arguments)]
    fn link(
        &mut self,
        parent: &Part,
        parent_rep: u32,
        child: &Part,
        linked: Linked,
        location: &Isometry3<f64>,
        name: &str,
        index: usize,
    ) -> u32 {
        let origin = Point3::from(location.translation.vector);
        let z = location.rotation * Vector3::z();
        let x = location.rotation * Vector3::x();
        let placed = self.axis(origin, z, x);
        let name = escape_step_string(name);
        let w = &mut self.writer;
        let nauo = w.push(format!(
            "NEXT_ASSEMBLY_USAGE_OCCURRENCE('{index}','{name}','',#{},#{},$)",
            parent.pd, child.pd
        ));
        let pds = w.push(format!("PRODUCT_DEFINITION_SHAPE('{name}','',#{nauo})"));
        let transform = w.push(format!(
            "ITEM_DEFINED_TRANSFORMATION('','',#{},#{placed})",
            linked.axis
        ));
        let rel = w.push(format!(
            "(REPRESENTATION_RELATIONSHIP('','',#{},#{parent_rep})REPRESENTATION_RELATIONSHIP_WITH_TRANSFORMATION(#{transform})SHAPE_REPRESENTATION_RELATIONSHIP())",
            linked.rep
        ));
        w.push(format!("CONTEXT_DEPENDENT_SHAPE_REPRESENTATION(#{rel},#{pds})"));
        placed
    }

    fn point(&mut self, p: Point3<f64>) -> u32 {
        self.writer.push(format!(
            "CARTESIAN_POINT('',({},{},{}))",
            f64_step(p.x),
            f64_step(p.y),
            f64_step(p.z)
        ))
    }

    fn direction(&mut self, v: Vector3<f64>) -> u32 {
        let n = v.try_normalize(1e-12).unwrap_or_else(Vector3::x);
        self.writer.push(format!(
            "DIRECTION('',({},{},{}))",
            f64_step(n.x),
            f64_step(n.y),
            f64_step(n.z)
        ))
    }

    fn up(&mut self) -> u32 {
        if let Some(id) = self.up {
            return id;
        }
        let id = self.direction(Vector3::z());
        self.up = Some(id);
        id
    }

    fn axis(&mut self, origin: Point3<f64>, z: Vector3<f64>, x: Vector3<f64>) -> u32 {
        let p = self.point(origin);
        let dz = self.direction(z);
        let dx = self.direction(x);
        self.writer
            .push(format!("AXIS2_PLACEMENT_3D('',#{p},#{dz},#{dx})"))
    }

    fn corner(&mut self, p: Point3<f64>) -> Corner {
        let point = self.point(p);
        let vertex = self.writer.push(format!("VERTEX_POINT('',#{point})"));
        Corner { point, vertex }
    }

    fn line_edge(&mut self, from: Corner, to: Corner, a: Point3<f64>, b: Point3<f64>) -> u32 {
        let d = b - a;
        let dir = self.direction(d);
        let vector = self
            .writer
            .push(format!("VECTOR('',#{dir},{})", f64_step(d.norm())));
        let line = self
            .writer
            .push(format!("LINE('',#{},#{vector})", from.point));
        self.writer.push(format!(
            "EDGE_CURVE('',#{},#{},#{line},.T.)",
            from.vertex, to.vertex
        ))
    }

    /// Edge for one profile segment at elevation `z`; also returns its curve.
    fn segment_edge(&mut self, seg: &ProfileSegment, z: f64, from: Corner, to: Corner) -> (u32, u32) {
        match *seg {
            ProfileSegment::Line { start, end } => {
                let a = Point3::new(start.x, start.y, z);
                let b = Point3::new(end.x, end.y, z);
                let edge = self.line_edge(from, to, a, b);
                (edge, edge - 1)
            }
            ProfileSegment::Arc {
                center,
                radius,
                ccw,
                ..
            }
            | ProfileSegment::Circle {
                center,
                radius,
                ccw,
            } => {
                let axis = self.axis(Point3::new(center.x, center.y, z), Vector3::z(), Vector3::x());
                let circle = self
                    .writer
                    .push(format!("CIRCLE('',#{axis},{})", f64_step(radius)));
                let edge = self.writer.push(format!(
                    "EDGE_CURVE('',#{},#{},#{circle},{})",
                    from.vertex,
                    to.vertex,
                    step_bool(ccw)
                ));
                (edge, circle)
            }
            ProfileSegment::Bezier { points } => {
                let mut ids = Vec::with_capacity(4);
                for (i, p) in points.iter().enumerate() {
                    let id = match i {
                        0 => from.point,
                        3 => to.point,
                        _ => self.point(Point3::new(p.x, p.y, z)),
                    };
                    ids.push(id);
                }
                let curve = self.writer.push(format!(
                    "B_SPLINE_CURVE_WITH_KNOTS('',3,({}),.UNSPECIFIED.,.F.,.F.,(4,4),(0.,1.),.UNSPECIFIED.)",
                    id_list(&ids)
                ));
                let edge = self.writer.push(format!(
                    "EDGE_CURVE('',#{},#{},#{curve},.T.)",
                    from.vertex, to.vertex
                ));
                (edge, curve)
            }
        }
    }

    fn oriented(&mut self, edge: u32, forward: bool) -> u32 {
        self.writer
            .push(format!("ORIENTED_EDGE('',*,*,#{edge},{})", step_bool(forward)))
    }

    /// Side walls of one loop. Returns the bottom and top edge ids in loop order.
    fn walls(&mut self, lp: &ProfileLoop, z0: f64, z1: f64, faces: &mut Vec<u32>) -> (Vec<u32>, Vec<u32>) {
        let segs = &lp.segments;
        let m = segs.len();
        let height = z1 - z0;

        let bottom: Vec<Corner> = segs
            .iter()
            .map(|s| self.corner(Point3::new(s.start().x, s.start().y, z0)))
            .collect();
        let top: Vec<Corner> = segs
            .iter()
            .map(|s| self.corner(Point3::new(s.start().x, s.start().y, z1)))
            .collect();

        let mut bottom_edges = Vec::with_capacity(m);
        let mut bottom_curves = Vec::with_capacity(m);
        let mut top_edges = Vec::with_capacity(m);
        for (k, seg) in segs.iter().enumerate() {
            let next = (k + 1) % m;
            let (edge, curve) = self.segment_edge(seg, z0, bottom[k], bottom[next]);
            bottom_edges.push(edge);
            bottom_curves.push(curve);
            let (edge, _) = self.segment_edge(seg, z1, top[k], top[next]);
            top_edges.push(edge);
        }

        let vertical: Vec<u32> = (0..m)
            .map(|k| {
                let s = segs[k].start();
                self.line_edge(
                    bottom[k],
                    top[k],
                    Point3::new(s.x, s.y, z0),
                    Point3::new(s.x, s.y, z1),
                )
            })
            .collect();

        for (k, seg) in segs.iter().enumerate() {
            let next = (k + 1) % m;
            let (surface, same_sense) = match *seg {
                ProfileSegment::Line { start, end } => {
                    let d = Vector3::new(end.x - start.x, end.y - start.y, 0.0);
                    let outward = Vector3::new(d.y, -d.x, 0.0);
                    let axis = self.axis(Point3::new(start.x, start.y, z0), outward, d);
                    (self.writer.push(format!("PLANE('',#{axis})")), true)
                }
                ProfileSegment::Arc {
                    center,
                    radius,
                    ccw,
                    ..
                }
                | ProfileSegment::Circle {
                    center,
                    radius,
                    ccw,
                } => {
                    let axis =
                        self.axis(Point3::new(center.x, center.y, z0), Vector3::z(), Vector3::x());
                    let surface = self.writer.push(format!(
                        "CYLINDRICAL_SURFACE('',#{axis},{})",
                        f64_step(radius)
                    ));
                    (surface, ccw)
                }
                ProfileSegment::Bezier { .. } => {
                    let up = self.up();
                    let vector = self
                        .writer
                        .push(format!("VECTOR('',#{up},{})", f64_step(height)));
                    let surface = self.writer.push(format!(
                        "SURFACE_OF_LINEAR_EXTRUSION('',#{},#{vector})",
                        bottom_curves[k]
                    ));
                    (surface, true)
                }
            };

            let ring = [
                self.oriented(bottom_edges[k], true),
                self.oriented(vertical[next], true),
                self.oriented(top_edges[k], false),
                self.oriented(vertical[k], false),
            ];
            let edge_loop = self
                .writer
                .push(format!("EDGE_LOOP('',({}))", id_list(&ring)));
            let bound = self
                .writer
                .push(format!("FACE_OUTER_BOUND('',#{edge_loop},.T.)"));
            faces.push(self.writer.push(format!(
                "ADVANCED_FACE('',(#{bound}),#{surface},{})",
                step_bool(same_sense)
            )));
        }

        (bottom_edges, top_edges)
    }

    fn board_brep(&mut self, name: &str, body: &PrismBody) -> u32 {
        let (z0, z1) = (body.z_min, body.z_max);
        let mut faces = Vec::new();
        let mut top_bounds = Vec::new();
        let mut bottom_bounds = Vec::new();

        for (i, lp) in std::iter::once(&body.outer).chain(&body.holes).enumerate() {
            let (bottom_edges, top_edges) = self.walls(lp, z0, z1, &mut faces);
            let kind = if i == 0 {
                "FACE_OUTER_BOUND"
            } else {
                "FACE_BOUND"
            };

            let top: Vec<u32> = top_edges.iter().map(|&e| self.oriented(e, true)).collect();
            let top_loop = self.writer.push(format!("EDGE_LOOP('',({}))", id_list(&top)));
            top_bounds.push(self.writer.push(format!("{kind}('',#{top_loop},.T.)")));

            let bottom: Vec<u32> = bottom_edges
                .iter()
                .map(|&e| self.oriented(e, true))
                .collect();
            let bottom_loop = self
                .writer
                .push(format!("EDGE_LOOP('',({}))", id_list(&bottom)));
            bottom_bounds.push(self.writer.push(format!("{kind}('',#{bottom_loop},.F.)")));
        }

        let top_axis = self.axis(Point3::new(0.0, 0.0, z1), Vector3::z(), Vector3::x());
        let top_plane = self.writer.push(format!("PLANE('',#{top_axis})"));
        faces.push(self.writer.push(format!(
            "ADVANCED_FACE('',({}),#{top_plane},.T.)",
            id_list(&top_bounds)
        )));

        let bottom_axis = self.axis(Point3::new(0.0, 0.0, z0), Vector3::z(), Vector3::x());
        let bottom_plane = self.writer.push(format!("PLANE('',#{bottom_axis})"));
        faces.push(self.writer.push(format!(
            "ADVANCED_FACE('',({}),#{bottom_plane},.F.)",
            id_list(&bottom_bounds)
        )));

        let shell = self
            .writer
            .push(format!("CLOSED_SHELL('',({}))", id_list(&faces)));
        self.writer.push(format!(
            "MANIFOLD_SOLID_BREP('{}',#{shell})",
            escape_step_string(name)
        ))
    }

    fn faceted_brep(&mut self, model: &ComponentModel) -> u32 {
        let points: Vec<u32> = model.vertices.iter().map(|p| self.point(*p)).collect();
        let mut faces = Vec::with_capacity(model.triangles.len());
        for tri in &model.triangles {
            let [a, b, c] = *tri;
            let (Some(pa), Some(pb), Some(pc)) = (
                model.vertices.get(a),
                model.vertices.get(b),
                model.vertices.get(c),
            ) else {
                continue;
            };
            let normal = (pb - pa).cross(&(pc - pa));
            if normal.norm() < 1e-12 {
                continue;
            }
            let poly = self.writer.push(format!(
                "POLY_LOOP('',(#{},#{},#{}))",
                points[a], points[b], points[c]
            ));
            let bound = self
                .writer
                .push(format!("FACE_OUTER_BOUND('',#{poly},.T.)"));
            let axis = self.axis(*pa, normal, pb - pa);
            let plane = self.writer.push(format!("PLANE('',#{axis})"));
            faces.push(
                self.writer
                    .push(format!("FACE_SURFACE('',(#{bound}),#{plane},.T.)")),
            );
        }
        let shell = self
            .writer
            .push(format!("CLOSED_SHELL('',({}))", id_list(&faces)));
        self.writer.push(format!(
            "FACETED_BREP('{}',#{shell})",
            escape_step_string(&model.name)
        ))
    }

    fn colour(&mut self, item: u32, rgb: [f64; 3], rep_ctx: u32) {
        let [r, g, b] = rgb.map(|c| c.clamp(0.0, 1.0));
        let w = &mut self.writer;
        let colour = w.push(format!(
            "COLOUR_RGB('',{},{},{})",
            f64_step(r),
            f64_step(g),
            f64_step(b)
        ));
        let fill_colour = w.push(format!("FILL_AREA_STYLE_COLOUR('',#{colour})"));
        let fill = w.push(format!("FILL_AREA_STYLE('',(#{fill_colour}))"));
        let area = w.push(format!("SURFACE_STYLE_FILL_AREA(#{fill})"));
        let side = w.push(format!("SURFACE_SIDE_STYLE('',(#{area}))"));
        let usage = w.push(format!("SURFACE_STYLE_USAGE(.BOTH.,#{side})"));
        let assignment = w.push(format!("PRESENTATION_STYLE_ASSIGNMENT((#{usage}))"));
        let styled = w.push(format!("STYLED_ITEM('color',(#{assignment}),#{item})"));
        w.push(format!(
            "MECHANICAL_DESIGN_GEOMETRIC_PRESENTATION_REPRESENTATION('',(#{styled}),#{rep_ctx})"
        ));
    }
}

fn id_list(ids: &[u32]) -> String {
    ids.iter().map(|id| format!("#{id}")).join(",")
}

fn step_bool(v: bool) -> &'static str {
    if v {
        ".T."
    } else {
        ".F."
    }
}

fn escape_step_string(s: &str) -> String {
    s.replace('\'', "''")
}

fn f64_step(v: f64) -> String {
    if !v.is_finite() {
        return "0.".to_string();
    }
    let mut s = format!("{v:.6}");
    if s == "-0.000000" {
        s = "0.000000".to_string();
    }
    s
}
