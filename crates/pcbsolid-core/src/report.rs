use crate::geom::BBox2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    DegeneratePrimitive,
    UnclosedOutline,
    NoOutline,
    KernelFailure,
    HoleRejected,
    HolesProcessed,
    ComponentSkipped,
}

impl DiagnosticCode {
    /// Informational codes do not describe dropped geometry.
    pub fn is_informational(self) -> bool {
        matches!(self, DiagnosticCode::HolesProcessed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// One-way sink for advisory messages; it never influences control flow.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

/// Collects diagnostics and mirrors each one to `tracing`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    pub entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.entries.iter().filter(|d| d.code == code).count()
    }

    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(move |d| d.code == code)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DiagnosticSink for Diagnostics {
    fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.code.is_informational() {
            tracing::info!(code = ?diagnostic.code, "{}", diagnostic.message);
        } else {
            tracing::warn!(code = ?diagnostic.code, "{}", diagnostic.message);
        }
        self.entries.push(diagnostic);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsReport {
    pub graphics_total: usize,
    pub edge_curves: usize,
    pub rejected_curves: usize,
    pub closed_loops: usize,
    pub dropped_fragments: usize,
    pub boards: usize,
    pub cutouts: usize,
    pub holes: usize,
    pub components: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardReport {
    pub name: String,
    pub extents: Option<BBox2>,
    pub volume: f64,
    pub voids: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub board: String,
    pub success: bool,
    pub stats: StatsReport,
    pub boards: Vec<BoardReport>,
    pub diagnostics: Vec<Diagnostic>,
}
