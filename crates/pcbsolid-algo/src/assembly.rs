//! Assembly tree and component model placement.

use crate::kernel::Solid;
use nalgebra::{Isometry3, Point3, Vector3};
use pcbsolid_core::model::{BoardSide, Footprint, ModelRef};
use pcbsolid_core::report::{Diagnostic, DiagnosticCode, DiagnosticSink};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("unsupported model format: {0}")]
    Unsupported(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model {0} contains no triangles")]
    Empty(PathBuf),
}

/// Triangle mesh of an external component model, scale already applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentModel {
    pub name: String,
    pub source: PathBuf,
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

pub trait ModelLoader {
    /// Canonical identity of the model behind `path`.
    fn resolve(&self, path: &str) -> Result<PathBuf, ModelError>;

    fn load(&self, source: &Path, scale: [f64; 3]) -> Result<ComponentModel, ModelError>;
}

/// Loads binary or ASCII STL files. Relative paths resolve against `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct StlModelLoader {
    pub base_dir: Option<PathBuf>,
}

impl StlModelLoader {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }
}

impl ModelLoader for StlModelLoader {
    fn resolve(&self, path: &str) -> Result<PathBuf, ModelError> {
        let raw = Path::new(path);
        let full = match &self.base_dir {
            Some(dir) if raw.is_relative() => dir.join(raw),
            _ => raw.to_path_buf(),
        };
        if !full.exists() {
            return Err(ModelError::Missing(full));
        }
        let is_stl = full
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("stl"));
        if !is_stl {
            return Err(ModelError::Unsupported(full));
        }
        std::fs::canonicalize(&full).map_err(|source| ModelError::Io { path: full, source })
    }

    fn load(&self, source: &Path, scale: [f64; 3]) -> Result<ComponentModel, ModelError> {
        let io_err = |e: std::io::Error| ModelError::Io {
            path: source.to_path_buf(),
            source: e,
        };
        let file = File::open(source).map_err(io_err)?;
        let mut reader = BufReader::new(file);
        let mesh = stl_io::read_stl(&mut reader).map_err(io_err)?;
        if mesh.faces.is_empty() {
            return Err(ModelError::Empty(source.to_path_buf()));
        }

        let vertices = mesh
            .vertices
            .iter()
            .map(|v| {
                Point3::new(
                    f64::from(v[0]) * scale[0],
                    f64::from(v[1]) * scale[1],
                    f64::from(v[2]) * scale[2],
                )
            })
            .collect();
        let triangles = mesh.faces.iter().map(|f| f.vertices).collect();
        let name = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("model")
            .to_string();

        Ok(ComponentModel {
            name,
            source: source.to_path_buf(),
            vertices,
            triangles,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ModelKey {
    source: PathBuf,
    scale: [u64; 3],
}

/// Loaded models keyed by source identity and scale.
///
/// Owned by the caller; may be reused across runs.
#[derive(Debug, Default)]
pub struct ModelCache {
    entries: HashMap<ModelKey, Rc<ComponentModel>>,
    hits: usize,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn get_or_load(
        &mut self,
        loader: &dyn ModelLoader,
        path: &str,
        scale: [f64; 3],
    ) -> Result<Rc<ComponentModel>, ModelError> {
        let source = loader.resolve(path)?;
        let key = ModelKey {
            source,
            scale: scale.map(f64::to_bits),
        };
        if let Some(model) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(Rc::clone(model));
        }
        let model = Rc::new(loader.load(&key.source, scale)?);
        tracing::debug!(source = %key.source.display(), "loaded component model");
        self.entries.insert(key, Rc::clone(&model));
        Ok(model)
    }
}

#[derive(Debug, Clone)]
pub struct BoardBody {
    pub name: String,
    pub color: [f64; 3],
    pub solid: Solid,
}

#[derive(Debug, Clone)]
pub struct PlacedComponent {
    pub reference: String,
    pub model: Rc<ComponentModel>,
    pub location: Isometry3<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Assembly {
    pub name: String,
    pub boards: Vec<BoardBody>,
    pub components: Vec<PlacedComponent>,
}

impl Assembly {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Location of a component model relative to the assembly root.
///
/// `T(x, -y, 0) * Rz(rot) * [Rx(pi) on the bottom side] * T(offset [+ thickness on top]) * Rz(-oz) * Ry(-oy) * Rx(-ox)`
pub fn placement(footprint: &Footprint, model: &ModelRef, thickness: f64) -> Isometry3<f64> {
    let position = Isometry3::translation(footprint.position.x, -footprint.position.y, 0.0);
    let spin = Isometry3::rotation(Vector3::z() * footprint.rotation_deg.to_radians());

    let [ox, oy, oz] = model.offset;
    let (side, lift) = match footprint.side {
        BoardSide::Top => (Isometry3::identity(), thickness),
        BoardSide::Bottom => (
            Isometry3::rotation(Vector3::x() * std::f64::consts::PI),
            0.0,
        ),
    };
    let offset = Isometry3::translation(ox, oy, oz + lift);

    let [rx, ry, rz] = model.rotation_deg.map(f64::to_radians);
    let orientation = Isometry3::rotation(Vector3::z() * -rz)
        * Isometry3::rotation(Vector3::y() * -ry)
        * Isometry3::rotation(Vector3::x() * -rx);

    position * spin * side * offset * orientation
}

/// Place every footprint model that loads; the rest are reported and skipped.
pub fn attach_components(
    assembly: &mut Assembly,
    footprints: &[Footprint],
    thickness: f64,
    loader: &dyn ModelLoader,
    cache: &mut ModelCache,
    sink: &mut dyn DiagnosticSink,
) -> usize {
    let before = assembly.components.len();
    for footprint in footprints {
        for model_ref in &footprint.models {
            match cache.get_or_load(loader, &model_ref.path, model_ref.scale) {
                Ok(model) => assembly.components.push(PlacedComponent {
                    reference: footprint.reference.clone(),
                    model,
                    location: placement(footprint, model_ref, thickness),
                }),
                Err(err) => sink.report(Diagnostic::new(
                    DiagnosticCode::ComponentSkipped,
                    format!("{}: {err}", footprint.reference),
                )),
            }
        }
    }
    assembly.components.len() - before
}
