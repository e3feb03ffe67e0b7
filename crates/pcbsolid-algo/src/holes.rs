//! Drill and slot cutters for pads and vias.

use crate::kernel::{Kernel, Solid};
use crate::solid_builder::{build_solid, BuildError};
use nalgebra::Point3;
use pcbsolid_core::curve::{Curve, CurveError};
use pcbsolid_core::geom::Vec2;
use pcbsolid_core::model::{to_model, DrillShape, HoleSite};
use pcbsolid_core::normalize::NormalizeConfig;
use pcbsolid_core::outline::Outline;
use pcbsolid_core::report::{Diagnostic, DiagnosticCode, DiagnosticSink};
use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HoleError {
    #[error("drill {x:.4} x {y:.4} is below the minimum distance")]
    TooSmall { x: f64, y: f64 },
    #[error("slot outline is invalid: {0}")]
    Curve(#[from] CurveError),
    #[error("slot outline does not close")]
    SlotOpen,
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// Capsule geometry of a slotted drill in the model frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub center: Vec2,
    /// Unit vector along the long axis.
    pub axis: Vec2,
    /// Radius of the rounded ends.
    pub radius: f64,
    /// Distance from the centre to each end-cap centre.
    pub half_length: f64,
}

impl Slot {
    /// Slot for an oblong drill, or `None` when both sizes agree within
    /// `min_distance` and the drill is really round.
    pub fn from_site(site: &HoleSite, min_distance: f64) -> Option<Self> {
        let size = site.drill.size;
        if (size.x - size.y).abs() < min_distance {
            return None;
        }
        let mut angle = site.rotation_deg;
        let (major, minor) = if size.y > size.x {
            angle += 90.0;
            (size.y, size.x)
        } else {
            (size.x, size.y)
        };
        Some(Self {
            center: to_model(site.position),
            axis: Vec2::from_angle(angle.to_radians()),
            radius: 0.5 * minor,
            half_length: 0.5 * (major - minor),
        })
    }

    /// Two half-circle arcs joined by two lines, counter-clockwise.
    pub fn curves(&self, min_distance: f64) -> Result<Vec<Curve>, CurveError> {
        let v = self.axis.rot90();
        let c1 = self.center + self.axis * self.half_length;
        let c2 = self.center - self.axis * self.half_length;
        let a = c1 - v * self.radius;
        let b = c1 + v * self.radius;
        let c = c2 + v * self.radius;
        let d = c2 - v * self.radius;
        Ok(vec![
            Curve::arc(0, c1, a, PI, min_distance)?,
            Curve::line(1, b, c, min_distance)?,
            Curve::arc(2, c2, c, PI, min_distance)?,
            Curve::line(3, d, a, min_distance)?,
        ])
    }
}

/// Cutter solid for one hole site, `Ok(None)` for sites without a through hole.
pub fn hole_solid(
    kernel: &mut dyn Kernel,
    site: &HoleSite,
    thickness: f64,
    cfg: &NormalizeConfig,
) -> Result<Option<Solid>, HoleError> {
    if !site.through {
        return Ok(None);
    }
    let min_distance = cfg.min_distance();
    let size = site.drill.size;
    let round_only = site.drill.shape == DrillShape::Round;
    if size.x < min_distance || (!round_only && size.y < min_distance) {
        return Err(HoleError::TooSmall {
            x: size.x,
            y: size.y,
        });
    }

    let slot = if round_only {
        None
    } else {
        Slot::from_site(site, min_distance)
    };

    let Some(slot) = slot else {
        let p = to_model(site.position);
        let base = Point3::new(p.x, p.y, -0.5 * thickness);
        let solid = kernel
            .make_cylinder(base, 0.5 * size.x, 2.0 * thickness)
            .map_err(BuildError::from)?;
        return Ok(Some(solid));
    };

    let mut outline = Outline::new(min_distance);
    for curve in slot.curves(min_distance)? {
        if outline.add_segment(curve).is_err() {
            return Err(HoleError::SlotOpen);
        }
    }
    if !outline.is_closed() {
        return Err(HoleError::SlotOpen);
    }
    Ok(build_solid(kernel, &outline, -0.5 * thickness, 2.0 * thickness)?)
}

/// Build cutters for every through-hole site.
///
/// A failing site is reported and skipped; the others are unaffected.
pub fn make_holes<'a>(
    kernel: &mut dyn Kernel,
    sites: impl IntoIterator<Item = &'a HoleSite>,
    thickness: f64,
    cfg: &NormalizeConfig,
    sink: &mut dyn DiagnosticSink,
) -> Vec<Solid> {
    let mut solids = Vec::new();
    let mut rejected = 0usize;
    for (i, site) in sites.into_iter().enumerate() {
        match hole_solid(kernel, site, thickness, cfg) {
            Ok(Some(solid)) => solids.push(solid),
            Ok(None) => {}
            Err(err) => {
                rejected += 1;
                sink.report(Diagnostic::new(
                    DiagnosticCode::HoleRejected,
                    format!(
                        "hole #{i} at ({:.4}, {:.4}) skipped: {err}",
                        site.position.x, site.position.y
                    ),
                ));
            }
        }
    }
    sink.report(Diagnostic::new(
        DiagnosticCode::HolesProcessed,
        format!("{} holes processed, {rejected} rejected", solids.len()),
    ));
    solids
}
