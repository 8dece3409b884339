//! This module contains all logic for turning model files into scene nodes.
//!
//! Parsing itself is left to the format crates (`gltf`, `tobj`, `stl_io`, `fbxcel-dom`);
//! the loaders here only translate their output into our scene graph.

use std::{fmt, path::Path};

use crate::{data_structures::scene_graph::Node, error::ImportError};

pub mod fbx;
pub mod gltf;
pub mod obj;
pub mod stl;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Fbx,
    /// Both `.gltf` (JSON) and `.glb` (binary) go through the same loader.
    Gltf,
    Obj,
    Stl,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 4] = [
        ModelFormat::Fbx,
        ModelFormat::Gltf,
        ModelFormat::Obj,
        ModelFormat::Stl,
    ];

    /// Detect the format from a file name's extension, ignoring case.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let extension = Path::new(file_name).extension()?.to_str()?;
        Self::from_extension(extension)
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "fbx" => Some(ModelFormat::Fbx),
            "gltf" | "glb" => Some(ModelFormat::Gltf),
            "obj" => Some(ModelFormat::Obj),
            "stl" => Some(ModelFormat::Stl),
            _ => None,
        }
    }

    /// Parse a comma separated list such as `"fbx,obj"` as handed over by the hosting page.
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| {
                let format = Self::from_extension(s.trim_start_matches('.'));
                if format.is_none() {
                    log::warn!("Ignoring unknown model format {s:?}.");
                }
                format
            })
            .collect()
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ModelFormat::Fbx => &["fbx"],
            ModelFormat::Gltf => &["gltf", "glb"],
            ModelFormat::Obj => &["obj"],
            ModelFormat::Stl => &["stl"],
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelFormat::Fbx => "FBX",
            ModelFormat::Gltf => "glTF",
            ModelFormat::Obj => "OBJ",
            ModelFormat::Stl => "STL",
        })
    }
}

/// Parse `bytes` into a single root node ready to be added to the scene.
///
/// `accepted` narrows the formats a caller is willing to handle. A file whose
/// extension is unknown or not accepted is reported as
/// [`ImportError::UnsupportedFormat`] before anything is parsed.
pub async fn import_bytes(
    file_name: &str,
    bytes: Vec<u8>,
    accepted: &[ModelFormat],
) -> Result<Node, ImportError> {
    let format = ModelFormat::from_file_name(file_name)
        .filter(|format| accepted.contains(format))
        .ok_or_else(|| ImportError::UnsupportedFormat {
            file_name: file_name.to_string(),
        })?;
    log::info!("Importing {file_name} ({} bytes) as {format}", bytes.len());
    let started = instant::Instant::now();

    let parsed = match format {
        ModelFormat::Fbx => fbx::load_model_fbx(file_name, &bytes),
        ModelFormat::Gltf => gltf::load_model_gltf(file_name, &bytes),
        ModelFormat::Obj => obj::load_model_obj(file_name, bytes).await,
        ModelFormat::Stl => stl::load_model_stl(file_name, &bytes),
    };
    let node = parsed.map_err(|source| ImportError::Parse {
        file_name: file_name.to_string(),
        format,
        source,
    })?;

    if !node.has_geometry() {
        return Err(ImportError::Empty {
            file_name: file_name.to_string(),
        });
    }
    log::info!(
        "Parsed {file_name} in {} ms: {} meshes",
        started.elapsed().as_millis(),
        node.mesh_count()
    );
    Ok(node)
}

/// Read a file from disk and import it.
#[cfg(not(target_arch = "wasm32"))]
pub async fn import_path(path: &Path, accepted: &[ModelFormat]) -> Result<Node, ImportError> {
    let file_name = display_name(path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ImportError::Read {
            file_name: file_name.clone(),
            source: e.into(),
        })?;
    import_bytes(&file_name, bytes, accepted).await
}

/// Name used for status lines and format detection.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// File stem used to name the imported root node.
pub(crate) fn stem(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_detect_format_ignoring_case() {
        assert_eq!(ModelFormat::from_file_name("a.FBX"), Some(ModelFormat::Fbx));
        assert_eq!(ModelFormat::from_file_name("b.Gltf"), Some(ModelFormat::Gltf));
        assert_eq!(ModelFormat::from_file_name("dir/c.glb"), Some(ModelFormat::Gltf));
        assert_eq!(ModelFormat::from_file_name("d.ObJ"), Some(ModelFormat::Obj));
        assert_eq!(ModelFormat::from_file_name("e.stl"), Some(ModelFormat::Stl));
        assert_eq!(ModelFormat::from_file_name("notes.txt"), None);
        assert_eq!(ModelFormat::from_file_name("fbx"), None);
    }

    #[test]
    fn should_parse_page_format_lists() {
        assert_eq!(
            ModelFormat::parse_list("fbx, .OBJ,,bogus"),
            vec![ModelFormat::Fbx, ModelFormat::Obj]
        );
        assert!(ModelFormat::parse_list("").is_empty());
    }
}
