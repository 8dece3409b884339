use futures::executor::block_on;
use model2glb::{
    ExportOptions, ExportResult, ModelFormat, Scene, config::LightingConfig,
    data_structures::texture::{StaticImage, Texture},
    export::{download::DirectorySink, export_scene, save_export},
    import_bytes,
};

use crate::common::test_utils::{MemorySink, checker, cube_glb, cube_node, textured_cube};

mod common;

fn reimport(file_name: &str, result: &ExportResult) -> model2glb::Node {
    let bytes = result.to_bytes().unwrap();
    block_on(import_bytes(file_name, bytes, &ModelFormat::ALL)).unwrap()
}

#[test]
fn should_export_light_only_scene_as_valid_glb() {
    let scene = Scene::with_default_lights(&LightingConfig::default());
    let result = export_scene(&scene, &ExportOptions::default()).unwrap();
    let bytes = result.to_bytes().unwrap();

    assert!(!bytes.is_empty());
    assert_eq!(&bytes[..4], b"glTF");
    let glb = gltf::binary::Glb::from_slice(&bytes).unwrap();
    assert_eq!(glb.header.length as usize, bytes.len());

    let document = gltf::Gltf::from_slice(&bytes).unwrap();
    assert_eq!(document.meshes().count(), 0);
    assert_eq!(document.nodes().count(), 2);
    assert!(document.extensions_used().any(|e| e == "KHR_lights_punctual"));

    let lights = document.lights().unwrap().collect::<Vec<_>>();
    assert_eq!(lights.len(), 1);
    assert!(matches!(lights[0].kind(), gltf::khr_lights_punctual::Kind::Directional));
    let directional = document
        .nodes()
        .find(|node| node.name() == Some("DirectionalLight"))
        .unwrap();
    assert_eq!(directional.light().unwrap().index(), lights[0].index());
    assert!(document.nodes().any(|node| node.name() == Some("AmbientLight")));
}

#[test]
fn should_export_empty_scene_as_readable_document() {
    let result = export_scene(&Scene::new(), &ExportOptions::default()).unwrap();
    let bytes = result.to_bytes().unwrap();

    let document = gltf::Gltf::from_slice(&bytes).unwrap();
    assert_eq!(document.scenes().count(), 0);
    assert_eq!(document.nodes().count(), 0);
}

#[test]
fn should_keep_meshes_through_glb_round_trip() {
    let mut scene = Scene::with_default_lights(&LightingConfig::default());
    scene.add(cube_node("a"));
    scene.add(cube_node("b"));

    let result = export_scene(&scene, &ExportOptions::default()).unwrap();
    let node = reimport("scene.glb", &result);

    assert_eq!(node.mesh_count(), 2);
    let mut triangles = 0;
    node.traverse(&Default::default(), &mut |node, _| {
        if let Some(mesh) = node.as_mesh() {
            triangles += mesh
                .primitives
                .iter()
                .map(|p| p.geometry.triangle_count())
                .sum::<usize>();
        }
    });
    assert_eq!(triangles, 24);
}

#[test]
fn should_write_standalone_gltf_json() {
    let mut scene = Scene::new();
    scene.add(cube_node("Cube"));

    let result = export_scene(&scene, &ExportOptions { binary: false }).unwrap();
    assert_eq!(result.file_name(), "scene.gltf");
    assert_eq!(result.mime_type(), "model/gltf+json");

    let ExportResult::Json(root) = &result else {
        panic!("expected glTF JSON");
    };
    assert_eq!(root.asset.version, "2.0");
    let uri = root.buffers[0].uri.as_deref().unwrap();
    assert!(uri.starts_with("data:application/octet-stream;base64,"));

    let node = reimport("scene.gltf", &result);
    assert_eq!(node.mesh_count(), 1);
}

#[test]
fn should_embed_static_texture_pixels() {
    let texture = Texture::from_image(
        Some("checker".to_string()),
        StaticImage::from_pixels(checker(4, 2)),
    );
    let mut scene = Scene::new();
    scene.add(textured_cube(texture));

    let result = export_scene(&scene, &ExportOptions::default()).unwrap();
    let node = reimport("scene.glb", &result);

    let mut images = Vec::new();
    node.traverse(&Default::default(), &mut |node, _| {
        if let Some(mesh) = node.as_mesh() {
            for primitive in &mesh.primitives {
                if let Some(map) = &primitive.material.map {
                    images.push(map.source.as_image().unwrap().clone());
                }
            }
        }
    });
    assert_eq!(images.len(), 1);
    assert_eq!(images[0].dimensions(), (4, 2));
    assert_eq!(images[0].pixels(), &checker(4, 2));
}

#[test]
fn should_save_imported_cube_as_scene_glb() {
    let mut scene = Scene::with_default_lights(&LightingConfig::default());
    let node = block_on(import_bytes("cube.glb", cube_glb(), &ModelFormat::ALL)).unwrap();
    scene.add(node);

    let result = export_scene(&scene, &ExportOptions::default()).unwrap();

    let sink = MemorySink::default();
    assert_eq!(save_export(&result, &sink).unwrap(), "scene.glb");
    let files = sink.files.lock().unwrap();
    assert_eq!(files.len(), 1);
    let (name, mime, bytes) = &files[0];
    assert_eq!(name, "scene.glb");
    assert_eq!(mime, "application/octet-stream");
    assert_eq!(&bytes[..4], b"glTF");

    let dir = tempfile::tempdir().unwrap();
    let out_dir = dir.path().join("out");
    save_export(&result, &DirectorySink::new(&out_dir)).unwrap();
    let written = std::fs::read(out_dir.join("scene.glb")).unwrap();
    assert_eq!(&written, bytes);
}
