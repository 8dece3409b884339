//! Converter data structures: scene graph, meshes, textures, and transforms.
//!
//! - `scene_graph` holds the scene, its nodes and lights
//! - `mesh` contains geometry and material definitions
//! - `texture` contains pixel sources and the GPU texture wrapper
//! - `transform` holds per-node transformation data

pub mod mesh;
pub mod scene_graph;
pub mod texture;
pub mod transform;
