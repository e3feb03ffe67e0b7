use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pcbsolid_algo::assembly::{ModelCache, StlModelLoader};
use pcbsolid_algo::kernel::{Kernel, PrismKernel};
use pcbsolid_algo::step_writer::save_step;
use pcbsolid_algo::{build_report, export_board_with_stats, ExportConfig};
use pcbsolid_core::model::{BoardDescription, Layer};
use pcbsolid_core::normalize::NormalizeConfig;
use pcbsolid_core::report::{Diagnostics, StatsReport};
use pcbsolid_import_dxf::{import_dxf_outline, LayerFilter, DEFAULT_LAYER};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "pcbsolid")]
#[command(about = "Printed circuit board outlines to solid STEP models.")]
struct Cli {
    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build the board solid and write a STEP assembly.
    Export {
        input: PathBuf,
        /// Defaults to the input path with a `.step` extension.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Replace the board's edge graphics with a DXF outline.
        #[arg(long)]
        outline_dxf: Option<PathBuf>,
        #[arg(long, default_value = DEFAULT_LAYER)]
        dxf_layer: String,
        #[arg(long)]
        min_distance: Option<f64>,
        #[arg(long)]
        thickness: Option<f64>,
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long, default_value = "pcbsolid")]
        author: String,
        #[arg(long, default_value = "")]
        organization: String,
        #[arg(long)]
        no_components: bool,
        #[arg(long, value_enum, default_value_t = KernelChoice::Prism)]
        kernel: KernelChoice,
    },
    /// Convert a DXF outline into a board description.
    Dxf {
        input: PathBuf,
        #[arg(long, default_value = DEFAULT_LAYER)]
        layer: String,
        #[arg(long)]
        thickness: Option<f64>,
        /// Prints to stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KernelChoice {
    Prism,
    /// Truck B-reps for construction (build with `--features truck`).
    #[cfg(feature = "truck")]
    Truck,
}

impl KernelChoice {
    fn build(self) -> Box<dyn Kernel> {
        match self {
            KernelChoice::Prism => Box::new(PrismKernel::new()),
            #[cfg(feature = "truck")]
            KernelChoice::Truck => Box::new(pcbsolid_algo::kernel::TruckKernel::new()),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Export {
            input,
            output,
            outline_dxf,
            dxf_layer,
            min_distance,
            thickness,
            report,
            author,
            organization,
            no_components,
            kernel,
        } => {
            let mut cfg = ExportConfig {
                thickness_override: thickness,
                attach_components: !no_components,
                ..ExportConfig::default()
            };
            cfg.step.author = author;
            cfg.step.organization = organization;
            export(
                &input,
                output.as_deref(),
                outline_dxf.as_deref(),
                &dxf_layer,
                min_distance,
                report.as_deref(),
                kernel,
                cfg,
            )
        }
        Command::Dxf {
            input,
            layer,
            thickness,
            output,
        } => dxf_to_board(&input, &layer, thickness, output.as_deref()),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let default = if verbose {
        "pcbsolid=debug,pcbsolid_algo=debug,pcbsolid_core=debug,pcbsolid_import_dxf=debug"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn export(
    input: &Path,
    output: Option<&Path>,
    outline_dxf: Option<&Path>,
    dxf_layer: &str,
    min_distance: Option<f64>,
    report: Option<&Path>,
    kernel: KernelChoice,
    mut cfg: ExportConfig,
) -> Result<()> {
    ensure_input_file(input)?;
    let text = std::fs::read_to_string(input).with_context(|| format!("read board: {input:?}"))?;
    let mut board: BoardDescription =
        serde_json::from_str(&text).with_context(|| format!("parse board: {input:?}"))?;

    if let Some(dxf) = outline_dxf {
        ensure_input_file(dxf)?;
        let graphics = import_dxf_outline(dxf, &LayerFilter::parse(dxf_layer))?;
        board.graphics.retain(|g| !g.layer.is_edge_cuts());
        board.graphics.extend(graphics);
    }
    if let Some(min) = min_distance {
        board.min_distance = None;
        cfg.normalize = NormalizeConfig::new(min);
    }

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("step"));
    let loader = StlModelLoader::new(input.parent().map(Path::to_path_buf));
    let mut cache = ModelCache::new();
    let mut kernel = kernel.build();
    let mut diagnostics = Diagnostics::new();
    let mut stats = StatsReport::default();

    let result = export_board_with_stats(
        &board,
        &cfg,
        kernel.as_mut(),
        &loader,
        &mut cache,
        &mut diagnostics,
        &mut stats,
    );

    if let Ok(assembly) = &result {
        write_parent(&output)?;
        save_step(&output, assembly, kernel.as_ref(), &cfg.step)?;
        tracing::info!(path = %output.display(), "wrote STEP");
    }

    let report_data = build_report(&board, &result, &stats, kernel.as_ref(), &diagnostics);
    let json = serde_json::to_string_pretty(&report_data).context("serialize report")?;
    if let Some(path) = report {
        write_parent(path)?;
        std::fs::write(path, &json).with_context(|| format!("write report: {path:?}"))?;
    } else {
        println!("{json}");
    }

    if let Err(err) = result {
        bail!("export of '{}' failed: {err}", board.name);
    }
    Ok(())
}

fn dxf_to_board(
    input: &Path,
    layer: &str,
    thickness: Option<f64>,
    output: Option<&Path>,
) -> Result<()> {
    ensure_input_file(input)?;
    let name = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("board");
    let mut board = BoardDescription::new(name);
    if let Some(t) = thickness {
        board.thickness = t;
    }
    board.graphics = import_dxf_outline(input, &LayerFilter::parse(layer))?;
    let edge = board
        .graphics
        .iter()
        .filter(|g| g.layer == Layer::EdgeCuts)
        .count();
    if edge == 0 {
        tracing::warn!(layer, "no graphics on the outline layer");
    }

    let json = serde_json::to_string_pretty(&board).context("serialize board")?;
    if let Some(path) = output {
        write_parent(path)?;
        std::fs::write(path, &json).with_context(|| format!("write board: {path:?}"))?;
    } else {
        println!("{json}");
    }
    Ok(())
}

fn write_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
    }
    Ok(())
}

fn ensure_input_file(input: &Path) -> Result<()> {
    match std::fs::metadata(input) {
        Ok(meta) => {
            if meta.is_file() {
                Ok(())
            } else {
                bail!("input is not a file: {input:?}");
            }
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            bail!("input not found: {input:?} (cwd: {cwd:?}).");
        }
        Err(err) => Err(err).with_context(|| format!("stat input: {input:?}")),
    }
}
