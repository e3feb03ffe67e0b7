//! Board description consumed by the exporter.
//!
//! Coordinates follow board-editor convention: millimetres, Y grows downward,
//! angles in degrees measured counter-clockwise as seen on screen. Use
//! [`to_model`] to move a point into the Y-up model frame.

use crate::geom::Vec2;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THICKNESS: f64 = 1.6;

/// Map a board point into the model frame (Y up).
pub fn to_model(p: Vec2) -> Vec2 {
    Vec2::new(p.x, -p.y)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    #[default]
    EdgeCuts,
    Other(String),
}

impl Layer {
    pub fn is_edge_cuts(&self) -> bool {
        matches!(self, Layer::EdgeCuts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphicShape {
    Line {
        start: Vec2,
        end: Vec2,
    },
    /// `start` lies on the circle; `angle_deg` is the signed sweep.
    Arc {
        center: Vec2,
        start: Vec2,
        angle_deg: f64,
    },
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardGraphic {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub layer: Layer,
    pub shape: GraphicShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrillShape {
    #[default]
    Round,
    Oblong,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Drill {
    #[serde(default)]
    pub shape: DrillShape,
    /// Drill extents along the pad's local X and Y axes.
    pub size: Vec2,
}

/// A pad or via that may carry a drilled hole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoleSite {
    pub position: Vec2,
    #[serde(default)]
    pub rotation_deg: f64,
    pub drill: Drill,
    #[serde(default = "default_true")]
    pub through: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoardSide {
    #[default]
    Top,
    Bottom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    pub path: String,
    #[serde(default = "unit_scale")]
    pub scale: [f64; 3],
    /// Millimetres, applied in the footprint frame.
    #[serde(default)]
    pub offset: [f64; 3],
    #[serde(default)]
    pub rotation_deg: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Footprint {
    pub reference: String,
    pub position: Vec2,
    #[serde(default)]
    pub rotation_deg: f64,
    #[serde(default)]
    pub side: BoardSide,
    #[serde(default)]
    pub models: Vec<ModelRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDescription {
    pub name: String,
    #[serde(default = "default_thickness")]
    pub thickness: f64,
    /// Overrides the exporter's endpoint matching tolerance when set.
    #[serde(default)]
    pub min_distance: Option<f64>,
    #[serde(default)]
    pub graphics: Vec<BoardGraphic>,
    #[serde(default)]
    pub pads: Vec<HoleSite>,
    #[serde(default)]
    pub vias: Vec<HoleSite>,
    #[serde(default)]
    pub footprints: Vec<Footprint>,
    /// Board body colour, linear RGB in `0..=1`.
    #[serde(default)]
    pub color: Option<[f64; 3]>,
}

impl BoardDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            thickness: DEFAULT_THICKNESS,
            min_distance: None,
            graphics: Vec::new(),
            pads: Vec::new(),
            vias: Vec::new(),
            footprints: Vec::new(),
            color: None,
        }
    }

    /// Pads followed by vias, in input order.
    pub fn hole_sites(&self) -> impl Iterator<Item = &HoleSite> {
        self.pads.iter().chain(self.vias.iter())
    }
}

fn default_true() -> bool {
    true
}

fn default_thickness() -> f64 {
    DEFAULT_THICKNESS
}

fn unit_scale() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}
