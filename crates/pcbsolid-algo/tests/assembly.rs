use approx::assert_relative_eq;
use nalgebra::{Point3, Vector3};
use pcbsolid_algo::assembly::{
    attach_components, placement, Assembly, ModelCache, ModelError, ModelLoader, StlModelLoader,
};
use pcbsolid_core::geom::Vec2;
use pcbsolid_core::model::{BoardSide, Footprint, ModelRef};
use pcbsolid_core::report::{DiagnosticCode, Diagnostics};
use std::fs::File;
use std::path::Path;
use std::rc::Rc;
use stl_io::{Normal, Triangle, Vertex};

fn write_tetrahedron(path: &Path) {
    let v = [
        [0.0f32, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
    ];
    let faces = [[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
    let mesh: Vec<Triangle> = faces
        .iter()
        .map(|f| Triangle {
            normal: Normal::new([0.0, 0.0, 0.0]),
            vertices: f.map(|i| Vertex::new(v[i])),
        })
        .collect();
    let mut file = File::create(path).unwrap();
    stl_io::write_stl(&mut file, mesh.iter()).unwrap();
}

fn model_ref(path: &str) -> ModelRef {
    ModelRef {
        path: path.to_string(),
        scale: [1.0, 1.0, 1.0],
        offset: [0.0, 0.0, 0.0],
        rotation_deg: [0.0, 0.0, 0.0],
    }
}

fn footprint(reference: &str, x: f64, y: f64, rotation_deg: f64, side: BoardSide) -> Footprint {
    Footprint {
        reference: reference.to_string(),
        position: Vec2::new(x, y),
        rotation_deg,
        side,
        models: Vec::new(),
    }
}

fn assert_point(actual: Point3<f64>, x: f64, y: f64, z: f64) {
    assert_relative_eq!(actual.x, x, epsilon = 1e-9);
    assert_relative_eq!(actual.y, y, epsilon = 1e-9);
    assert_relative_eq!(actual.z, z, epsilon = 1e-9);
}

#[test]
fn top_side_placement_rotates_then_lifts() {
    let fp = footprint("U1", 10.0, 5.0, 90.0, BoardSide::Top);
    let mut model = model_ref("u1.stl");
    model.offset = [1.0, 0.0, 0.0];
    let iso = placement(&fp, &model, 1.6);

    assert_point(iso * Point3::origin(), 10.0, -4.0, 1.6);
    let up = iso * Vector3::z();
    assert_relative_eq!(up.z, 1.0, epsilon = 1e-9);
}

#[test]
fn bottom_side_placement_flips() {
    let fp = footprint("C7", 20.0, 10.0, 0.0, BoardSide::Bottom);
    let mut model = model_ref("c7.stl");
    model.offset = [1.0, 0.0, 0.5];
    let iso = placement(&fp, &model, 1.6);

    // Offset Z points away from the board on both sides.
    assert_point(iso * Point3::origin(), 21.0, -10.0, -0.5);
    let up = iso * Vector3::z();
    assert_relative_eq!(up.z, -1.0, epsilon = 1e-9);
}

#[test]
fn model_rotation_is_applied_first() {
    let fp = footprint("J1", 0.0, 0.0, 0.0, BoardSide::Top);
    let mut model = model_ref("j1.stl");
    model.rotation_deg = [0.0, 0.0, 90.0];
    let iso = placement(&fp, &model, 0.0);

    // Rz(-90) takes +X to -Y.
    let x = iso * Vector3::x();
    assert_relative_eq!(x.x, 0.0, epsilon = 1e-9);
    assert_relative_eq!(x.y, -1.0, epsilon = 1e-9);
}

#[test]
fn loader_reads_stl_with_scale() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("part.stl");
    write_tetrahedron(&path);

    let loader = StlModelLoader::new(Some(dir.path().to_path_buf()));
    let source = loader.resolve("part.stl").unwrap();
    let model = loader.load(&source, [2.0, 2.0, 2.0]).unwrap();
    assert_eq!(model.name, "part");
    assert_eq!(model.vertices.len(), 4);
    assert_eq!(model.triangles.len(), 4);
    let max_x = model.vertices.iter().map(|p| p.x).fold(f64::MIN, f64::max);
    assert_relative_eq!(max_x, 2.0);
}

#[test]
fn loader_rejects_missing_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    let loader = StlModelLoader::new(Some(dir.path().to_path_buf()));
    assert!(matches!(
        loader.resolve("nope.stl"),
        Err(ModelError::Missing(_))
    ));

    std::fs::write(dir.path().join("part.wrl"), "#VRML V2.0 utf8\n").unwrap();
    assert!(matches!(
        loader.resolve("part.wrl"),
        Err(ModelError::Unsupported(_))
    ));
}

#[test]
fn cache_shares_models_per_source_and_scale() {
    let dir = tempfile::tempdir().unwrap();
    write_tetrahedron(&dir.path().join("part.stl"));
    let loader = StlModelLoader::new(Some(dir.path().to_path_buf()));
    let mut cache = ModelCache::new();

    let a = cache.get_or_load(&loader, "part.stl", [1.0; 3]).unwrap();
    let absolute = dir.path().join("part.stl");
    let b = cache
        .get_or_load(&loader, absolute.to_str().unwrap(), [1.0; 3])
        .unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.hits(), 1);

    let c = cache.get_or_load(&loader, "part.stl", [0.5; 3]).unwrap();
    assert!(!Rc::ptr_eq(&a, &c));
    assert_eq!(cache.len(), 2);
}

#[test]
fn unreadable_models_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_tetrahedron(&dir.path().join("part.stl"));
    let loader = StlModelLoader::new(Some(dir.path().to_path_buf()));
    let mut cache = ModelCache::new();
    let mut diagnostics = Diagnostics::new();

    let mut r1 = footprint("R1", 10.0, 10.0, 0.0, BoardSide::Top);
    r1.models.push(model_ref("part.stl"));
    let mut r2 = footprint("R2", 20.0, 10.0, 0.0, BoardSide::Top);
    r2.models.push(model_ref("part.stl"));
    let mut u1 = footprint("U1", 30.0, 10.0, 0.0, BoardSide::Top);
    u1.models.push(model_ref("missing.stl"));

    let mut assembly = Assembly::new("demo");
    let placed = attach_components(
        &mut assembly,
        &[r1, r2, u1],
        1.6,
        &loader,
        &mut cache,
        &mut diagnostics,
    );
    assert_eq!(placed, 2);
    assert_eq!(cache.len(), 1);
    assert!(Rc::ptr_eq(
        &assembly.components[0].model,
        &assembly.components[1].model
    ));

    let skipped: Vec<_> = diagnostics
        .with_code(DiagnosticCode::ComponentSkipped)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0].message.starts_with("U1"));
}
