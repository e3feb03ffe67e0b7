//! Board body assembly from the edge-layer curve pool.
//!
//! The pool is consumed exactly once. The first outline is seeded with the
//! curve owning the left-most feature point, so it lies on the outer
//! boundary; later outlines are seeded with the first remaining curve. An
//! outline that stops growing before it closes is reported and dropped, and
//! assembly continues with the rest of the pool.

use crate::solid_builder::build_solid;
use crate::ExportError;
use crate::kernel::{Kernel, Solid};
use pcbsolid_core::curve::Curve;
use pcbsolid_core::geom::BBox2;
use pcbsolid_core::normalize::{CurvePool, NormalizeConfig};
use pcbsolid_core::outline::Outline;
use pcbsolid_core::report::{Diagnostic, DiagnosticCode, DiagnosticSink};

/// One board body before cutouts are removed.
#[derive(Debug, Clone)]
pub struct BoardOutline {
    pub solid: Solid,
    pub extents: BBox2,
}

#[derive(Debug, Clone, Default)]
pub struct OutlineSolids {
    /// Primary board first, then any disjoint extra boards.
    pub boards: Vec<BoardOutline>,
    pub cutouts: Vec<Solid>,
    pub closed_loops: usize,
    pub dropped_fragments: usize,
}

/// Closed loops in the order they closed, plus the stall count.
#[derive(Debug, Default)]
pub struct LoopSet {
    pub loops: Vec<Outline>,
    pub dropped_fragments: usize,
}

/// Walk the pool into closed loops.
///
/// Fails with [`ExportError::NoOutline`] when the pool is empty or the first
/// outline never closes.
pub fn collect_loops(
    mut pool: CurvePool,
    cfg: &NormalizeConfig,
    sink: &mut dyn DiagnosticSink,
) -> Result<LoopSet, ExportError> {
    let min_distance = cfg.min_distance();
    let Some(seed) = pool.take_leftmost() else {
        let reason = "no usable edge graphics".to_string();
        sink.report(Diagnostic::new(DiagnosticCode::NoOutline, reason.clone()));
        return Err(ExportError::NoOutline(reason));
    };

    let mut set = LoopSet::default();
    let mut outline = seeded(min_distance, seed);

    loop {
        if outline.is_closed() {
            tracing::debug!(members = outline.len(), "outline closed");
            let done = std::mem::replace(&mut outline, Outline::new(min_distance));
            set.loops.push(done);
            match pool.take_first() {
                Some(next) => outline = seeded(min_distance, next),
                None => break,
            }
            continue;
        }

        if let Some(curve) = pool
            .position(|c| outline.match_candidate(c).is_some())
            .and_then(|idx| pool.take(idx))
        {
            let attached = outline.add_segment(curve);
            debug_assert!(attached.is_ok(), "matched curve failed to attach");
            continue;
        }

        // Nothing attaches: the outline stalls.
        if set.loops.is_empty() {
            let reason = format!(
                "outer boundary does not close ({} segment(s)):\n{}",
                outline.len(),
                outline.describe()
            );
            sink.report(Diagnostic::new(DiagnosticCode::NoOutline, reason.clone()));
            return Err(ExportError::NoOutline(reason));
        }
        report_fragment(&outline, sink);
        set.dropped_fragments += 1;
        outline.clear();
        match pool.take_first() {
            Some(next) => outline = seeded(min_distance, next),
            None => break,
        }
    }

    if !outline.is_empty() && !outline.is_closed() {
        report_fragment(&outline, sink);
        set.dropped_fragments += 1;
    }
    Ok(set)
}

/// Assemble loops, classify them and build one solid per loop.
///
/// Loop 0 is the primary board boundary. Any other loop that no other loop
/// encloses is an extra board; enclosed loops are cutouts and are extruded
/// over `[-t/2, 3t/2]` so none of their faces lie on a board face.
pub fn assemble_board(
    kernel: &mut dyn Kernel,
    pool: CurvePool,
    cfg: &NormalizeConfig,
    thickness: f64,
    sink: &mut dyn DiagnosticSink,
) -> Result<OutlineSolids, ExportError> {
    let set = collect_loops(pool, cfg, sink)?;
    let mut out = OutlineSolids {
        closed_loops: set.loops.len(),
        dropped_fragments: set.dropped_fragments,
        ..OutlineSolids::default()
    };

    for (k, outline) in set.loops.iter().enumerate() {
        let enclosed = k > 0
            && set
                .loops
                .iter()
                .enumerate()
                .any(|(j, other)| j != k && other.encloses(outline));

        if enclosed {
            match build_solid(kernel, outline, -0.5 * thickness, 2.0 * thickness) {
                Ok(Some(solid)) => out.cutouts.push(solid),
                Ok(None) => {}
                Err(err) => sink.report(Diagnostic::new(
                    DiagnosticCode::KernelFailure,
                    format!("cutout dropped: {err}\n{}", outline.describe()),
                )),
            }
            continue;
        }

        match build_solid(kernel, outline, 0.0, thickness) {
            Ok(Some(solid)) => out.boards.push(BoardOutline {
                solid,
                extents: outline.bbox(),
            }),
            Ok(None) => {}
            Err(err) if k == 0 => {
                sink.report(Diagnostic::new(
                    DiagnosticCode::KernelFailure,
                    format!("board outline could not be built: {err}\n{}", outline.describe()),
                ));
                return Err(ExportError::BoundaryBuild(err));
            }
            Err(err) => sink.report(Diagnostic::new(
                DiagnosticCode::KernelFailure,
                format!("extra board outline dropped: {err}\n{}", outline.describe()),
            )),
        }
    }

    tracing::info!(
        boards = out.boards.len(),
        cutouts = out.cutouts.len(),
        dropped = out.dropped_fragments,
        "board outlines assembled"
    );
    Ok(out)
}

fn seeded(min_distance: f64, seed: Curve) -> Outline {
    let mut outline = Outline::new(min_distance);
    let seeded = outline.add_segment(seed);
    debug_assert!(seeded.is_ok(), "an empty outline accepts any curve");
    outline
}

fn report_fragment(outline: &Outline, sink: &mut dyn DiagnosticSink) {
    sink.report(Diagnostic::new(
        DiagnosticCode::UnclosedOutline,
        format!(
            "dropped unclosed outline with {} segment(s):\n{}",
            outline.len(),
            outline.describe()
        ),
    ));
}
