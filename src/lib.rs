//! model2glb
//!
//! Loads FBX, OBJ, STL and glTF/GLB models into a scene graph that is
//! rendered continuously with wgpu, and converts that scene to GLB or
//! glTF JSON. Runs natively (winit window, drag and drop, CLI) and in the
//! browser (wasm32, DOM file input and download).
//!
//! High-level modules
//! - `camera`: fixed perspective camera
//! - `config`: viewer and converter defaults
//! - `context`: GPU surface, device and queue of the viewer window
//! - `data_structures`: scene graph, meshes, transforms and textures
//! - `error`: import and export errors shown to the user
//! - `export`: glTF/GLB serialization and download sinks
//! - `flow`: the winit event loop driving import, render and convert
//! - `normalize`: turns live canvas/video textures into static images
//! - `pipelines`: the lambert render pipeline and its uniforms
//! - `render`: uploads the scene and records draw calls
//! - `resources`: format detection and the per-format loaders
//! - `status`: user visible status lines
//! - `web`: browser entry point (wasm32 only)
//!

pub mod camera;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod export;
pub mod flow;
pub mod normalize;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod status;
#[cfg(target_arch = "wasm32")]
pub mod web;

// Re-exports commonly used types for convenience in downstream code.
pub use config::ViewerConfig;
pub use data_structures::scene_graph::{Node, Scene};
pub use error::{ExportError, ImportError};
pub use export::{ExportOptions, ExportResult, export_scene};
pub use normalize::normalize_textures;
pub use resources::{ModelFormat, import_bytes};
