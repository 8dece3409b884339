#![allow(dead_code)]

use std::sync::Mutex;

use image::{Rgba, RgbaImage};
use model2glb::{
    ExportOptions, ExportResult, Node, Scene,
    data_structures::{
        mesh::{Geometry, Material, Mesh},
        texture::{Texture, VideoSource},
    },
    export::{DownloadSink, export_scene},
};

/// Unit cube around the origin, 8 shared corners.
pub fn cube_geometry() -> Geometry {
    #[rustfmt::skip]
    let positions = vec![
        [-0.5, -0.5, -0.5], [0.5, -0.5, -0.5], [0.5, 0.5, -0.5], [-0.5, 0.5, -0.5],
        [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5], [0.5, 0.5, 0.5], [-0.5, 0.5, 0.5],
    ];
    #[rustfmt::skip]
    let indices = vec![
        4, 5, 6, 4, 6, 7, // front
        1, 0, 3, 1, 3, 2, // back
        0, 4, 7, 0, 7, 3, // left
        5, 1, 2, 5, 2, 6, // right
        7, 6, 2, 7, 2, 3, // top
        0, 1, 5, 0, 5, 4, // bottom
    ];
    let mut geometry = Geometry {
        positions,
        tex_coords: vec![[0.0, 0.0]; 8],
        indices: Some(indices),
        ..Default::default()
    };
    geometry.compute_normals();
    geometry
}

pub fn cube_node(name: &str) -> Node {
    Node::mesh(Mesh::new(
        Some(name.to_string()),
        cube_geometry(),
        Material::default(),
    ))
}

pub fn textured_cube(texture: Texture) -> Node {
    Node::mesh(Mesh::new(
        Some("textured".to_string()),
        cube_geometry(),
        Material {
            map: Some(texture),
            ..Default::default()
        },
    ))
}

/// What a `cube.glb` picked in the file dialog contains.
pub fn cube_glb() -> Vec<u8> {
    let mut scene = Scene::new();
    scene.add(cube_node("Cube"));
    match export_scene(&scene, &ExportOptions::default()).unwrap() {
        ExportResult::Binary(bytes) => bytes,
        ExportResult::Json(_) => panic!("expected binary output"),
    }
}

pub fn checker(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if (x + y) % 2 == 0 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 255, 255])
        }
    })
}

/// A video that paints a solid colour and remembers the canvas sizes it was drawn onto.
#[derive(Debug)]
pub struct FakeVideo {
    pub width: u32,
    pub height: u32,
    pub colour: Rgba<u8>,
    pub drawn_onto: Mutex<Vec<(u32, u32)>>,
}

impl FakeVideo {
    pub fn new(width: u32, height: u32, colour: Rgba<u8>) -> Self {
        Self {
            width,
            height,
            colour,
            drawn_onto: Mutex::new(Vec::new()),
        }
    }
}

impl VideoSource for FakeVideo {
    fn native_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn draw_frame(&self, canvas: &mut RgbaImage) -> anyhow::Result<()> {
        self.drawn_onto.lock().unwrap().push(canvas.dimensions());
        for pixel in canvas.pixels_mut() {
            *pixel = self.colour;
        }
        Ok(())
    }
}

/// Keeps saved downloads in memory.
#[derive(Default)]
pub struct MemorySink {
    pub files: Mutex<Vec<(String, String, Vec<u8>)>>,
}

impl DownloadSink for MemorySink {
    fn save(&self, file_name: &str, mime_type: &str, bytes: &[u8]) -> anyhow::Result<()> {
        self.files
            .lock()
            .unwrap()
            .push((file_name.to_string(), mime_type.to_string(), bytes.to_vec()));
        Ok(())
    }
}
