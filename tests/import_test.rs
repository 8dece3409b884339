use futures::executor::block_on;
use model2glb::{
    ExportOptions, ImportError, ModelFormat, Node, Scene, config::LightingConfig, export_scene,
    import_bytes,
    data_structures::mesh::{Geometry, Material, Mesh},
    resources::import_path,
};

use crate::common::test_utils::cube_glb;

mod common;

const OBJ_TRIANGLE: &str = "o tri
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
";

const STL_TRIANGLE: &str = "solid tri
facet normal 0 0 1
  outer loop
    vertex 0 0 0
    vertex 1 0 0
    vertex 0 1 0
  endloop
endfacet
endsolid tri
";

fn startup_scene() -> Scene {
    Scene::with_default_lights(&LightingConfig::default())
}

#[test]
fn should_add_cube_glb_as_third_child() {
    let mut scene = startup_scene();
    assert_eq!(scene.child_count(), 2);

    let node = block_on(import_bytes("cube.glb", cube_glb(), &ModelFormat::ALL)).unwrap();
    scene.add(node);

    assert_eq!(scene.child_count(), 3);
    assert_eq!(scene.mesh_count(), 1);
}

#[test]
fn should_accumulate_repeated_imports_of_the_same_file() {
    let mut scene = startup_scene();
    for _ in 0..3 {
        let node = block_on(import_bytes("cube.glb", cube_glb(), &ModelFormat::ALL)).unwrap();
        scene.add(node);
    }
    assert_eq!(scene.child_count(), 5);
    assert_eq!(scene.mesh_count(), 3);
}

#[test]
fn should_reject_unknown_extension_without_touching_scene() {
    let scene = startup_scene();
    let revision = scene.revision();

    let error = block_on(import_bytes("notes.txt", b"hello".to_vec(), &ModelFormat::ALL))
        .unwrap_err();

    assert!(matches!(error, ImportError::UnsupportedFormat { ref file_name } if file_name == "notes.txt"));
    assert_eq!(scene.child_count(), 2);
    assert_eq!(scene.revision(), revision);
}

#[test]
fn should_reject_formats_the_page_does_not_accept() {
    let fbx_page = ModelFormat::parse_list("fbx");
    let error = block_on(import_bytes("tri.obj", OBJ_TRIANGLE.into(), &fbx_page)).unwrap_err();
    assert!(matches!(error, ImportError::UnsupportedFormat { .. }));
}

#[test]
fn should_match_extensions_case_insensitively() {
    let node = block_on(import_bytes("CUBE.GLB", cube_glb(), &ModelFormat::ALL)).unwrap();
    assert_eq!(node.mesh_count(), 1);
}

#[test]
fn should_import_obj_and_stl_as_single_root() {
    let obj = block_on(import_bytes("tri.obj", OBJ_TRIANGLE.into(), &ModelFormat::ALL)).unwrap();
    assert_eq!(obj.name.as_deref(), Some("tri"));
    assert_eq!(obj.mesh_count(), 1);

    let stl = block_on(import_bytes("tri.stl", STL_TRIANGLE.into(), &ModelFormat::ALL)).unwrap();
    assert_eq!(stl.mesh_count(), 1);
    let geometry = &stl.as_mesh().unwrap().primitives[0].geometry;
    assert_eq!(geometry.triangle_count(), 1);
}

#[test]
fn should_report_parse_failures_with_format() {
    let error = block_on(import_bytes(
        "broken.glb",
        b"glTF\x02\0\0\0garbage".to_vec(),
        &ModelFormat::ALL,
    ))
    .unwrap_err();

    match error {
        ImportError::Parse {
            file_name, format, ..
        } => {
            assert_eq!(file_name, "broken.glb");
            assert_eq!(format, ModelFormat::Gltf);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn should_add_fbx_model_with_its_transform_and_texture() {
    let mut scene = startup_scene();
    let bytes = include_bytes!("fixtures/quad.fbx").to_vec();

    let node = block_on(import_bytes("quad.fbx", bytes, &ModelFormat::ALL)).unwrap();
    scene.add(node);

    assert_eq!(scene.child_count(), 3);
    assert!(scene.mesh_count() >= 1);
    let quad = &scene.children()[2].children[0];
    assert_eq!(quad.transform.position, cgmath::Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(scene.textures().len(), 1);
}

#[test]
fn should_reject_glb_with_indices_past_vertex_count() {
    let mut scene = Scene::new();
    scene.add(Node::mesh(Mesh::new(
        Some("bad".to_string()),
        Geometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            indices: Some(vec![0, 1, 7]),
            ..Default::default()
        },
        Material::default(),
    )));
    let bytes = export_scene(&scene, &ExportOptions::default())
        .unwrap()
        .to_bytes()
        .unwrap();

    let error = block_on(import_bytes("bad.glb", bytes, &ModelFormat::ALL)).unwrap_err();
    assert!(matches!(error, ImportError::Parse { ref file_name, .. } if file_name == "bad.glb"));
}

#[test]
fn should_import_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cube.glb");
    std::fs::write(&path, cube_glb()).unwrap();

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let node = runtime
        .block_on(import_path(&path, &ModelFormat::ALL))
        .unwrap();
    assert_eq!(node.mesh_count(), 1);

    let missing = runtime.block_on(import_path(&dir.path().join("missing.glb"), &ModelFormat::ALL));
    assert!(matches!(missing, Err(ImportError::Read { .. })));
}
