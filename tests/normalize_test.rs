use std::sync::Arc;

use futures::executor::block_on;
use image::Rgba;
use model2glb::{
    ExportOptions, Scene, export_scene,
    data_structures::texture::{Canvas, StaticImage, Texture, TextureSource},
    normalize::{SnapshotKind, normalize_textures, snapshot_live_textures},
};

use crate::common::test_utils::{FakeVideo, checker, textured_cube};

mod common;

#[test]
fn should_replace_canvas_texture_with_current_pixels() {
    let canvas = Arc::new(Canvas::from_image(checker(4, 4)));
    let mut scene = Scene::new();
    scene.add(textured_cube(Texture::new(
        Some("canvas".to_string()),
        TextureSource::Canvas(canvas.clone()),
    )));

    // Drawn after the texture was created, must still end up in the snapshot.
    canvas
        .draw(|pixels| pixels.put_pixel(0, 0, Rgba([0, 255, 0, 255])))
        .unwrap();

    let report = block_on(normalize_textures(&mut scene));
    assert_eq!(report.replaced, 1);
    assert!(report.is_clean());

    let textures = scene.textures();
    let texture = textures[0];
    assert!(texture.needs_update);
    let image = texture.source.as_image().expect("static image after normalize");
    assert_eq!(image.dimensions(), (4, 4));
    assert_eq!(*image.pixels().get_pixel(0, 0), Rgba([0, 255, 0, 255]));
    assert_eq!(*image.pixels().get_pixel(1, 0), Rgba([0, 0, 255, 255]));
}

#[test]
fn should_draw_video_frame_onto_canvas_of_native_size() {
    let video = Arc::new(FakeVideo::new(16, 9, Rgba([10, 20, 30, 255])));
    let mut scene = Scene::new();
    scene.add(textured_cube(Texture::new(
        None,
        TextureSource::Video(video.clone()),
    )));

    let (snapshots, failed) = snapshot_live_textures(&scene);
    assert!(failed.is_empty());
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].kind, SnapshotKind::Video);
    assert_eq!(snapshots[0].size, (16, 9));
    assert_eq!(*video.drawn_onto.lock().unwrap(), vec![(16, 9)]);

    let report = block_on(normalize_textures(&mut scene));
    assert_eq!(report.replaced, 1);
    let textures = scene.textures();
    let image = textures[0].source.as_image().unwrap();
    assert_eq!(image.dimensions(), (16, 9));
    assert_eq!(*image.pixels().get_pixel(15, 8), Rgba([10, 20, 30, 255]));
}

#[test]
fn should_report_video_without_frame_and_keep_it_live() {
    let video = Arc::new(FakeVideo::new(0, 0, Rgba([0, 0, 0, 255])));
    let mut scene = Scene::new();
    scene.add(textured_cube(Texture::new(None, TextureSource::Video(video))));

    let report = block_on(normalize_textures(&mut scene));
    assert_eq!(report.replaced, 0);
    assert_eq!(report.failed.len(), 1);
    assert!(scene.textures()[0].source.is_live());
}

#[test]
fn should_leave_static_textures_alone() {
    let mut texture = Texture::from_image(None, StaticImage::from_pixels(checker(2, 2)));
    texture.needs_update = false;
    let id = texture.id();
    let mut scene = Scene::new();
    scene.add(textured_cube(texture));

    let report = block_on(normalize_textures(&mut scene));
    assert_eq!(report.replaced, 0);
    assert!(report.is_clean());

    let textures = scene.textures();
    assert_eq!(textures[0].id(), id);
    assert!(!textures[0].needs_update);
    assert_eq!(textures[0].source.as_image().unwrap().dimensions(), (2, 2));
}

#[test]
fn should_export_once_live_textures_are_normalized() {
    let canvas = Arc::new(Canvas::from_image(checker(8, 8)));
    let mut scene = Scene::new();
    scene.add(textured_cube(Texture::new(None, TextureSource::Canvas(canvas))));

    assert!(export_scene(&scene, &ExportOptions::default()).is_err());

    block_on(normalize_textures(&mut scene));
    let bytes = export_scene(&scene, &ExportOptions::default())
        .unwrap()
        .to_bytes()
        .unwrap();
    assert_eq!(&bytes[..4], b"glTF");
}
