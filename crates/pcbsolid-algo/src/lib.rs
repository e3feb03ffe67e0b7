use crate::assembly::{attach_components, Assembly, BoardBody, ModelCache, ModelLoader};
use crate::board::assemble_board;
use crate::compositor::subtract_cutouts;
use crate::holes::make_holes;
use crate::kernel::Kernel;
use crate::solid_builder::BuildError;
use crate::step_writer::StepHeader;
use pcbsolid_core::model::BoardDescription;
use pcbsolid_core::normalize::{ingest, NormalizeConfig};
use pcbsolid_core::report::{
    BoardReport, Diagnostics, DiagnosticSink, ExportReport, StatsReport,
};
use thiserror::Error;

pub mod assembly;
pub mod board;
pub mod compositor;
pub mod holes;
pub mod kernel;
pub mod solid_builder;
pub mod step_writer;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    #[error("no board outline: {0}")]
    NoOutline(String),
    #[error("board outline could not be built")]
    BoundaryBuild(#[source] BuildError),
    #[error("no board body survived cutout subtraction")]
    Boolean,
    #[error("invalid board thickness {0}")]
    InvalidThickness(f64),
}

/// Solder-mask green.
pub const DEFAULT_BOARD_COLOR: [f64; 3] = [0.05, 0.35, 0.12];

#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Used when the board does not carry its own `min_distance`.
    pub normalize: NormalizeConfig,
    pub thickness_override: Option<f64>,
    pub board_color: [f64; 3],
    pub step: StepHeader,
    pub attach_components: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            normalize: NormalizeConfig::default(),
            thickness_override: None,
            board_color: DEFAULT_BOARD_COLOR,
            step: StepHeader::default(),
            attach_components: true,
        }
    }
}

impl ExportConfig {
    pub fn normalize_for(&self, board: &BoardDescription) -> NormalizeConfig {
        board
            .min_distance
            .map(NormalizeConfig::new)
            .unwrap_or(self.normalize)
    }

    pub fn thickness_for(&self, board: &BoardDescription) -> f64 {
        self.thickness_override.unwrap_or(board.thickness)
    }
}

pub fn export_board(
    board: &BoardDescription,
    cfg: &ExportConfig,
    kernel: &mut dyn Kernel,
    loader: &dyn ModelLoader,
    cache: &mut ModelCache,
    sink: &mut dyn DiagnosticSink,
) -> Result<Assembly, ExportError> {
    let mut stats = StatsReport::default();
    export_board_with_stats(board, cfg, kernel, loader, cache, sink, &mut stats)
}

/// [`export_board`], also filling `stats` as far as the run got.
pub fn export_board_with_stats(
    board: &BoardDescription,
    cfg: &ExportConfig,
    kernel: &mut dyn Kernel,
    loader: &dyn ModelLoader,
    cache: &mut ModelCache,
    sink: &mut dyn DiagnosticSink,
    stats: &mut StatsReport,
) -> Result<Assembly, ExportError> {
    let thickness = cfg.thickness_for(board);
    if !thickness.is_finite() || thickness <= 0.0 {
        return Err(ExportError::InvalidThickness(thickness));
    }
    let ncfg = cfg.normalize_for(board);
    tracing::info!(
        board = %board.name,
        thickness,
        min_distance = ncfg.min_distance(),
        kernel = kernel.name(),
        "exporting board"
    );

    let (pool, nstats) = ingest(&board.graphics, &ncfg, sink);
    stats.graphics_total = nstats.graphics_total;
    stats.edge_curves = nstats.edge_curves;
    stats.rejected_curves = nstats.rejected_curves;

    let outlines = assemble_board(kernel, pool, &ncfg, thickness, sink)?;
    stats.closed_loops = outlines.closed_loops;
    stats.dropped_fragments = outlines.dropped_fragments;
    stats.cutouts = outlines.cutouts.len();

    let holes = make_holes(kernel, board.hole_sites(), thickness, &ncfg, sink);
    stats.holes = holes.len();

    let mut cutouts = outlines.cutouts;
    cutouts.extend(holes);
    let board_solids: Vec<_> = outlines.boards.iter().map(|b| b.solid.clone()).collect();
    let finished = subtract_cutouts(kernel, &board_solids, &cutouts, sink);

    let color = board.color.unwrap_or(cfg.board_color);
    let mut assembly = Assembly::new(board.name.clone());
    for (k, solid) in finished.into_iter().enumerate() {
        let Some(solid) = solid else { continue };
        let name = if k == 0 {
            board.name.clone()
        } else {
            format!("{}-{k}", board.name)
        };
        assembly.boards.push(BoardBody { name, color, solid });
    }
    stats.boards = assembly.boards.len();
    if assembly.boards.is_empty() {
        return Err(ExportError::Boolean);
    }

    if cfg.attach_components {
        stats.components =
            attach_components(&mut assembly, &board.footprints, thickness, loader, cache, sink);
    }

    tracing::info!(
        boards = stats.boards,
        holes = stats.holes,
        components = stats.components,
        "board exported"
    );
    Ok(assembly)
}

/// Summarize one run for the JSON report.
pub fn build_report(
    board: &BoardDescription,
    result: &Result<Assembly, ExportError>,
    stats: &StatsReport,
    kernel: &dyn Kernel,
    diagnostics: &Diagnostics,
) -> ExportReport {
    let boards = match result {
        Ok(assembly) => assembly
            .boards
            .iter()
            .map(|body| match kernel.solid_info(&body.solid) {
                Ok(info) => BoardReport {
                    name: body.name.clone(),
                    extents: Some(info.extents),
                    volume: info.volume,
                    voids: info.voids,
                },
                Err(_) => BoardReport {
                    name: body.name.clone(),
                    extents: None,
                    volume: 0.0,
                    voids: 0,
                },
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    ExportReport {
        board: board.name.clone(),
        success: result.is_ok(),
        stats: stats.clone(),
        boards,
        diagnostics: diagnostics.entries.clone(),
    }
}
