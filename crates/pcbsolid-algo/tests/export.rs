use approx::assert_relative_eq;
use pcbsolid_algo::assembly::{ModelCache, StlModelLoader};
use pcbsolid_algo::kernel::{Kernel, NullKernel, PrismKernel};
use pcbsolid_algo::{build_report, export_board, export_board_with_stats, ExportConfig, ExportError};
use pcbsolid_core::geom::Vec2;
use pcbsolid_core::model::{
    BoardDescription, BoardGraphic, Drill, DrillShape, GraphicShape, HoleSite, Layer,
};
use pcbsolid_core::report::{DiagnosticCode, Diagnostics, StatsReport};
use std::f64::consts::PI;

fn line(id: u64, a: (f64, f64), b: (f64, f64)) -> BoardGraphic {
    BoardGraphic {
        id,
        layer: Layer::EdgeCuts,
        shape: GraphicShape::Line {
            start: Vec2::new(a.0, a.1),
            end: Vec2::new(b.0, b.1),
        },
    }
}

fn rect(first_id: u64, x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<BoardGraphic> {
    vec![
        line(first_id, (x0, y0), (x1, y0)),
        line(first_id + 1, (x1, y0), (x1, y1)),
        line(first_id + 2, (x1, y1), (x0, y1)),
        line(first_id + 3, (x0, y1), (x0, y0)),
    ]
}

fn board_100x50() -> BoardDescription {
    let mut board = BoardDescription::new("demo");
    // Shuffled and partly reversed on purpose.
    let mut edges = rect(1, 0.0, 0.0, 100.0, 50.0);
    edges.swap(0, 2);
    if let GraphicShape::Line { start, end } = &mut edges[1].shape {
        std::mem::swap(start, end);
    }
    board.graphics = edges;
    board
}

fn hole(x: f64, y: f64, rotation_deg: f64, shape: DrillShape, sx: f64, sy: f64) -> HoleSite {
    HoleSite {
        position: Vec2::new(x, y),
        rotation_deg,
        drill: Drill {
            shape,
            size: Vec2::new(sx, sy),
        },
        through: true,
    }
}

struct Run {
    kernel: PrismKernel,
    diagnostics: Diagnostics,
    stats: StatsReport,
    result: Result<pcbsolid_algo::assembly::Assembly, ExportError>,
}

fn run(board: &BoardDescription) -> Run {
    let mut kernel = PrismKernel::new();
    let mut diagnostics = Diagnostics::new();
    let mut stats = StatsReport::default();
    let loader = StlModelLoader::default();
    let mut cache = ModelCache::new();
    let result = export_board_with_stats(
        board,
        &ExportConfig::default(),
        &mut kernel,
        &loader,
        &mut cache,
        &mut diagnostics,
        &mut stats,
    );
    Run {
        kernel,
        diagnostics,
        stats,
        result,
    }
}

#[test]
fn plain_rectangle_becomes_a_box() {
    let run = run(&board_100x50());
    let assembly = run.result.as_ref().unwrap();
    assert_eq!(assembly.boards.len(), 1);
    assert_eq!(assembly.boards[0].name, "demo");

    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_relative_eq!(info.volume, 8000.0, epsilon = 1e-9);
    assert_relative_eq!(info.z_min, 0.0);
    assert_relative_eq!(info.z_max, 1.6);
    assert_eq!(info.voids, 0);
    // Y is flipped into the model frame.
    assert_relative_eq!(info.extents.min.y, -50.0);
    assert_relative_eq!(info.extents.max.y, 0.0);

    assert_eq!(run.stats.closed_loops, 1);
    assert_eq!(run.stats.dropped_fragments, 0);
    assert_eq!(run.diagnostics.count(DiagnosticCode::UnclosedOutline), 0);
}

#[test]
fn round_drill_leaves_one_void() {
    let mut board = board_100x50();
    board.pads.push(hole(50.0, 25.0, 0.0, DrillShape::Round, 3.0, 3.0));
    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();

    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_eq!(info.voids, 1);
    assert_relative_eq!(info.volume, (5000.0 - PI * 2.25) * 1.6, epsilon = 1e-6);
    assert_eq!(run.stats.holes, 1);
    assert_eq!(run.diagnostics.count(DiagnosticCode::HolesProcessed), 1);
}

fn slot_void_extents(rotation_deg: f64) -> (f64, f64, f64) {
    let mut board = board_100x50();
    board
        .pads
        .push(hole(50.0, 25.0, rotation_deg, DrillShape::Oblong, 2.0, 4.0));
    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    let body = run.kernel.prism_body(&assembly.boards[0].solid).unwrap();
    assert_eq!(body.holes.len(), 1);
    let bbox = body.holes[0].bbox();
    (bbox.width(), bbox.height(), body.volume())
}

#[test]
fn oblong_drill_is_a_capsule() {
    let expected_volume = (5000.0 - (PI + 4.0)) * 1.6;

    let (w, h, volume) = slot_void_extents(0.0);
    assert_relative_eq!(w, 2.0, epsilon = 1e-6);
    assert_relative_eq!(h, 4.0, epsilon = 1e-6);
    assert_relative_eq!(volume, expected_volume, epsilon = 1e-6);

    let (w, h, volume) = slot_void_extents(90.0);
    assert_relative_eq!(w, 4.0, epsilon = 1e-6);
    assert_relative_eq!(h, 2.0, epsilon = 1e-6);
    assert_relative_eq!(volume, expected_volume, epsilon = 1e-6);
}

#[test]
fn square_oblong_drill_is_round() {
    let mut board = board_100x50();
    board
        .pads
        .push(hole(50.0, 25.0, 30.0, DrillShape::Oblong, 3.0, 3.005));
    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    let body = run.kernel.prism_body(&assembly.boards[0].solid).unwrap();
    assert_eq!(body.holes.len(), 1);
    assert_eq!(body.holes[0].segments.len(), 1);
}

#[test]
fn interior_outline_is_a_cutout() {
    let mut board = board_100x50();
    board.graphics.extend(rect(10, 20.0, 20.0, 30.0, 30.0));
    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    assert_eq!(assembly.boards.len(), 1);
    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_eq!(info.voids, 1);
    assert_relative_eq!(info.volume, (5000.0 - 100.0) * 1.6, epsilon = 1e-6);
    assert_eq!(run.stats.cutouts, 1);
}

#[test]
fn disjoint_outline_is_an_extra_board() {
    let mut board = board_100x50();
    board.graphics.extend(rect(10, 120.0, 0.0, 140.0, 20.0));
    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    let names: Vec<_> = assembly.boards.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["demo", "demo-1"]);
    let extra = run.kernel.solid_info(&assembly.boards[1].solid).unwrap();
    assert_relative_eq!(extra.volume, 400.0 * 1.6, epsilon = 1e-9);
}

#[test]
fn local_failures_do_not_abort_the_board() {
    let mut board = board_100x50();
    // Degenerate line, stray open fragment and an undersized drill.
    board.graphics.push(line(20, (5.0, 5.0), (5.0, 5.0)));
    board.graphics.push(line(21, (60.0, 10.0), (70.0, 10.0)));
    board.pads.push(hole(20.0, 25.0, 0.0, DrillShape::Round, 0.0005, 0.0005));
    board.pads.push(hole(50.0, 25.0, 0.0, DrillShape::Round, 3.0, 3.0));
    // Surface-mount pads never drill.
    let mut smd = hole(70.0, 25.0, 0.0, DrillShape::Round, 1.0, 1.0);
    smd.through = false;
    board.pads.push(smd);

    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_eq!(info.voids, 1);

    assert_eq!(run.diagnostics.count(DiagnosticCode::DegeneratePrimitive), 1);
    assert_eq!(run.diagnostics.count(DiagnosticCode::UnclosedOutline), 1);
    assert_eq!(run.diagnostics.count(DiagnosticCode::HoleRejected), 1);
    assert_eq!(run.stats.rejected_curves, 1);
    assert_eq!(run.stats.dropped_fragments, 1);
    assert_eq!(run.stats.holes, 1);

    let fragment = run
        .diagnostics
        .with_code(DiagnosticCode::UnclosedOutline)
        .next()
        .unwrap();
    assert!(fragment.message.contains("#21"));
}

#[test]
fn malformed_interior_loop_spares_its_neighbours() {
    let mut board = board_100x50();
    // Square with its left side missing, next to a complete square.
    let mut open = rect(10, 10.0, 10.0, 20.0, 20.0);
    open.pop();
    board.graphics.extend(open);
    board.graphics.extend(rect(20, 40.0, 10.0, 50.0, 20.0));

    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    assert_eq!(assembly.boards.len(), 1);
    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_eq!(info.voids, 1);
    assert_relative_eq!(info.volume, (5000.0 - 100.0) * 1.6, epsilon = 1e-6);
    assert_eq!(run.diagnostics.count(DiagnosticCode::UnclosedOutline), 1);
    assert_eq!(run.stats.cutouts, 1);
}

#[test]
fn hole_on_the_edge_notches_the_board() {
    let mut board = board_100x50();
    board.pads.push(hole(100.0, 25.0, 0.0, DrillShape::Round, 1.0, 1.0));
    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_eq!(info.voids, 0);
    assert_relative_eq!(info.volume, (5000.0 - PI * 0.25 / 2.0) * 1.6, epsilon = 0.01);
    assert_relative_eq!(info.extents.max.x, 100.0, epsilon = 1e-9);
    assert_eq!(run.diagnostics.count(DiagnosticCode::KernelFailure), 0);
}

#[test]
fn overlapping_drills_merge_among_many_vias() {
    let mut board = board_100x50();
    board.pads.push(hole(50.0, 25.0, 0.0, DrillShape::Round, 3.0, 3.0));
    board.pads.push(hole(51.0, 25.0, 0.0, DrillShape::Round, 3.0, 3.0));
    for k in 0..20 {
        board
            .vias
            .push(hole(10.0 + 4.0 * k as f64, 10.0, 0.0, DrillShape::Round, 0.8, 0.8));
    }

    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_eq!(info.voids, 21);
    // Two r = 1.5 circles one unit apart cover 10.0121 mm².
    let removed = 10.012_064 + 20.0 * PI * 0.16;
    assert_relative_eq!(info.volume, (5000.0 - removed) * 1.6, epsilon = 0.1);
    assert_eq!(run.diagnostics.count(DiagnosticCode::KernelFailure), 0);
    assert_eq!(run.stats.holes, 22);
}

#[test]
fn slot_splitting_the_board_is_left_out() {
    let mut board = board_100x50();
    board.pads.push(hole(20.0, 25.0, 0.0, DrillShape::Round, 3.0, 3.0));
    board.pads.push(hole(50.0, 25.0, 0.0, DrillShape::Oblong, 2.0, 60.0));
    board.pads.push(hole(80.0, 25.0, 0.0, DrillShape::Round, 3.0, 3.0));

    let run = run(&board);
    let assembly = run.result.as_ref().unwrap();
    let info = run.kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_eq!(info.voids, 2);
    assert_relative_eq!(info.volume, (5000.0 - 2.0 * PI * 2.25) * 1.6, epsilon = 0.1);

    let failures: Vec<_> = run
        .diagnostics
        .with_code(DiagnosticCode::KernelFailure)
        .collect();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].message.contains("cutout 1"));
}

#[test]
fn empty_board_has_no_outline() {
    let board = BoardDescription::new("empty");
    let run = run(&board);
    assert!(matches!(run.result, Err(ExportError::NoOutline(_))));
    assert_eq!(run.diagnostics.count(DiagnosticCode::NoOutline), 1);
}

#[test]
fn open_outer_boundary_has_no_outline() {
    let mut board = board_100x50();
    board.graphics.pop();
    let run = run(&board);
    let Err(ExportError::NoOutline(reason)) = run.result else {
        panic!("expected NoOutline");
    };
    assert!(reason.contains("does not close"));
}

#[test]
fn kernel_without_geometry_fails_the_boundary() {
    let board = board_100x50();
    let mut kernel = NullKernel;
    let mut diagnostics = Diagnostics::new();
    let result = export_board(
        &board,
        &ExportConfig::default(),
        &mut kernel,
        &StlModelLoader::default(),
        &mut ModelCache::new(),
        &mut diagnostics,
    );
    assert!(matches!(result, Err(ExportError::BoundaryBuild(_))));
    assert_eq!(diagnostics.count(DiagnosticCode::KernelFailure), 1);
}

#[test]
fn thickness_override_and_validation() {
    let board = board_100x50();
    let mut kernel = PrismKernel::new();
    let loader = StlModelLoader::default();
    let mut cache = ModelCache::new();
    let mut diagnostics = Diagnostics::new();

    let cfg = ExportConfig {
        thickness_override: Some(0.8),
        ..ExportConfig::default()
    };
    let assembly = export_board(&board, &cfg, &mut kernel, &loader, &mut cache, &mut diagnostics)
        .unwrap();
    let info = kernel.solid_info(&assembly.boards[0].solid).unwrap();
    assert_relative_eq!(info.volume, 4000.0, epsilon = 1e-9);

    let cfg = ExportConfig {
        thickness_override: Some(0.0),
        ..ExportConfig::default()
    };
    let err = export_board(&board, &cfg, &mut kernel, &loader, &mut cache, &mut diagnostics)
        .unwrap_err();
    assert_eq!(err, ExportError::InvalidThickness(0.0));
}

#[test]
fn board_tolerance_overrides_config() {
    let mut board = board_100x50();
    // 0.05 mm gap at one corner.
    board.graphics[3] = line(4, (0.0, 50.0), (0.0, 0.05));
    assert!(matches!(run(&board).result, Err(ExportError::NoOutline(_))));

    board.min_distance = Some(0.1);
    assert!(run(&board).result.is_ok());
}

#[test]
fn report_summarizes_the_run() {
    let mut board = board_100x50();
    board.pads.push(hole(50.0, 25.0, 0.0, DrillShape::Round, 3.0, 3.0));
    let run = run(&board);
    let report = build_report(&board, &run.result, &run.stats, &run.kernel, &run.diagnostics);
    assert!(report.success);
    assert_eq!(report.board, "demo");
    assert_eq!(report.boards.len(), 1);
    assert_eq!(report.boards[0].voids, 1);
    assert_eq!(report.stats.edge_curves, 4);

    let failed = run_failure_report();
    assert!(!failed.success);
    assert!(failed.boards.is_empty());
}

fn run_failure_report() -> pcbsolid_core::report::ExportReport {
    let board = BoardDescription::new("empty");
    let run = run(&board);
    build_report(&board, &run.result, &run.stats, &run.kernel, &run.diagnostics)
}
