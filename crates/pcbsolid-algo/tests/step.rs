use pcbsolid_algo::assembly::{Assembly, ModelCache, StlModelLoader};
use pcbsolid_algo::kernel::{Kernel, PrismKernel};
use pcbsolid_algo::step_writer::{save_step, write_step, StepHeader};
use pcbsolid_algo::{export_board, ExportConfig};
use pcbsolid_core::geom::Vec2;
use pcbsolid_core::model::{
    BoardDescription, BoardGraphic, BoardSide, Drill, DrillShape, Footprint, GraphicShape,
    HoleSite, Layer, ModelRef,
};
use pcbsolid_core::report::Diagnostics;
use std::collections::HashSet;
use std::fs::File;
use stl_io::{Normal, Triangle, Vertex};

fn header() -> StepHeader {
    StepHeader {
        author: "O'Brien".to_string(),
        organization: "Lab".to_string(),
        timestamp: Some("2024-01-01T00:00:00".to_string()),
    }
}

fn board() -> BoardDescription {
    let corners = [(0.0, 0.0), (100.0, 0.0), (100.0, 50.0), (0.0, 50.0)];
    let mut board = BoardDescription::new("demo");
    board.graphics = (0..4)
        .map(|i| {
            let (ax, ay) = corners[i];
            let (bx, by) = corners[(i + 1) % 4];
            BoardGraphic {
                id: i as u64,
                layer: Layer::EdgeCuts,
                shape: GraphicShape::Line {
                    start: Vec2::new(ax, ay),
                    end: Vec2::new(bx, by),
                },
            }
        })
        .collect();
    board.pads.push(HoleSite {
        position: Vec2::new(50.0, 25.0),
        rotation_deg: 0.0,
        drill: Drill {
            shape: DrillShape::Round,
            size: Vec2::new(3.0, 3.0),
        },
        through: true,
    });
    board.color = Some([0.1, 0.2, 0.3]);
    board
}

fn export(board: &BoardDescription, loader: &StlModelLoader) -> (PrismKernel, Assembly) {
    let mut kernel = PrismKernel::new();
    let mut diagnostics = Diagnostics::new();
    let assembly = export_board(
        board,
        &ExportConfig::default(),
        &mut kernel,
        loader,
        &mut ModelCache::new(),
        &mut diagnostics,
    )
    .unwrap();
    (kernel, assembly)
}

fn count(text: &str, needle: &str) -> usize {
    text.matches(needle).count()
}

/// Every `#n` on the right-hand side of an entity refers to a defined entity.
fn assert_references_resolve(text: &str) {
    let mut defined = HashSet::new();
    let mut bodies = Vec::new();
    for line in text.lines().filter(|l| l.starts_with('#')) {
        let (id, body) = line.split_once('=').unwrap();
        assert!(defined.insert(id.to_string()), "duplicate id {id}");
        bodies.push(body);
    }
    for body in bodies {
        let mut rest = body;
        while let Some(pos) = rest.find('#') {
            let digits: String = rest[pos + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            assert!(!digits.is_empty(), "dangling '#' in {body}");
            assert!(defined.contains(&format!("#{digits}")), "#{digits} is undefined");
            rest = &rest[pos + 1 + digits.len()..];
        }
    }
}

#[test]
fn board_with_hole_is_a_manifold_brep() {
    let (kernel, assembly) = export(&board(), &StlModelLoader::default());
    let text = write_step(&assembly, &kernel, &header()).unwrap();

    assert!(text.starts_with("ISO-10303-21;\nHEADER;"));
    assert!(text.trim_end().ends_with("END-ISO-10303-21;"));
    assert!(text.contains("FILE_SCHEMA(('AUTOMOTIVE_DESIGN { 1 0 10303 214 1 1 1 1 }'));"));
    assert!(text.contains("FILE_NAME('demo.step','2024-01-01T00:00:00',('O''Brien'),('Lab')"));

    assert_eq!(count(&text, "MANIFOLD_SOLID_BREP('demo'"), 1);
    // Four walls, one hole wall, top and bottom.
    assert_eq!(count(&text, "=ADVANCED_FACE("), 7);
    assert_eq!(count(&text, "=CYLINDRICAL_SURFACE("), 1);
    assert_eq!(count(&text, "=FACE_BOUND("), 2);
    assert_eq!(count(&text, "=FACE_OUTER_BOUND("), 7);
    assert!(text.contains("COLOUR_RGB('',0.100000,0.200000,0.300000)"));
    assert_eq!(count(&text, "NEXT_ASSEMBLY_USAGE_OCCURRENCE("), 1);
    assert!(!text.contains("-0.000000"));

    assert_references_resolve(&text);
}

fn write_cube(path: &std::path::Path) {
    let corners = [
        [0.0f32, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [1.0, 1.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0],
        [1.0, 0.0, 1.0],
        [1.0, 1.0, 1.0],
        [0.0, 1.0, 1.0],
    ];
    let faces = [
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [1, 2, 6],
        [1, 6, 5],
        [2, 3, 7],
        [2, 7, 6],
        [3, 0, 4],
        [3, 4, 7],
    ];
    let mesh: Vec<Triangle> = faces
        .iter()
        .map(|f| Triangle {
            normal: Normal::new([0.0, 0.0, 0.0]),
            vertices: f.map(|i| Vertex::new(corners[i])),
        })
        .collect();
    let mut file = File::create(path).unwrap();
    stl_io::write_stl(&mut file, mesh.iter()).unwrap();
}

#[test]
fn shared_component_model_is_written_once() {
    let dir = tempfile::tempdir().unwrap();
    write_cube(&dir.path().join("cube.stl"));
    let loader = StlModelLoader::new(Some(dir.path().to_path_buf()));

    let mut board = board();
    for (reference, x, side) in [("R1", 20.0, BoardSide::Top), ("R2", 80.0, BoardSide::Bottom)] {
        board.footprints.push(Footprint {
            reference: reference.to_string(),
            position: Vec2::new(x, 10.0),
            rotation_deg: 45.0,
            side,
            models: vec![ModelRef {
                path: "cube.stl".to_string(),
                scale: [1.0, 1.0, 1.0],
                offset: [0.0, 0.0, 0.0],
                rotation_deg: [0.0, 0.0, 0.0],
            }],
        });
    }

    let (kernel, assembly) = export(&board, &loader);
    assert_eq!(assembly.components.len(), 2);
    let text = write_step(&assembly, &kernel, &header()).unwrap();

    assert_eq!(count(&text, "FACETED_BREP('cube'"), 1);
    assert_eq!(count(&text, "=FACE_SURFACE("), 12);
    assert_eq!(count(&text, "NEXT_ASSEMBLY_USAGE_OCCURRENCE("), 3);
    assert_eq!(count(&text, "ITEM_DEFINED_TRANSFORMATION("), 3);
    assert!(text.contains("NEXT_ASSEMBLY_USAGE_OCCURRENCE('3','R2'"));
    assert_references_resolve(&text);

    let out = dir.path().join("demo.step");
    save_step(&out, &assembly, &kernel, &header()).unwrap();
    assert_eq!(std::fs::read_to_string(out).unwrap(), text);
}

#[test]
fn released_board_cannot_be_written() {
    let (mut kernel, assembly) = export(&board(), &StlModelLoader::default());
    kernel.release(&assembly.boards[0].solid);
    let err = write_step(&assembly, &kernel, &header()).unwrap_err();
    assert!(err.to_string().contains("demo"));
}
