//! Turns live texture sources into static images so the scene can be serialized.
//!
//! Normalization runs in three phases:
//!
//! 1. [`snapshot_live_textures`] reads every canvas and video texture *now*
//!    and encodes the pixels as a PNG data URL, the same thing
//!    `canvas.toDataURL()` produces in a browser.
//! 2. [`decode_snapshots`] decodes all data URLs concurrently and only
//!    resolves once every one of them is done.
//! 3. [`apply_replacements`] swaps the decoded images into the scene by
//!    [`TextureId`] and flags them for re-upload.
//!
//! The exporter must only run after phase 3. Phases 1 and 3 need the scene,
//! phase 2 does not, so hosts can run it off the event loop.

use std::collections::HashSet;

use anyhow::*;
use futures::future::join_all;
use image::RgbaImage;

use crate::data_structures::{
    scene_graph::Scene,
    texture::{StaticImage, TextureId, TextureSource, VideoSource, to_png_data_url},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotKind {
    Canvas,
    Video,
}

/// Encoded pixels of one live texture at the time it was read.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub texture: TextureId,
    pub kind: SnapshotKind,
    /// Size of the canvas the data URL was taken from.
    pub size: (u32, u32),
    pub data_url: String,
}

/// A decoded snapshot, ready to replace the live source of `texture`.
#[derive(Clone, Debug)]
pub struct Replacement {
    pub texture: TextureId,
    pub image: StaticImage,
}

#[derive(Clone, Debug, Default)]
pub struct NormalizeReport {
    pub replaced: usize,
    /// Live textures that could not be read or decoded; they keep their live source.
    pub failed: Vec<(TextureId, String)>,
}

impl NormalizeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Phase 1: read all live sources. Textures shared between materials are read once.
pub fn snapshot_live_textures(scene: &Scene) -> (Vec<Snapshot>, Vec<(TextureId, String)>) {
    let mut seen = HashSet::new();
    let mut snapshots = Vec::new();
    let mut failed = Vec::new();

    for texture in scene.textures() {
        if !texture.source.is_live() || !seen.insert(texture.id()) {
            continue;
        }
        let snapshot = match &texture.source {
            TextureSource::Canvas(canvas) => canvas
                .read_pixels()
                .and_then(|pixels| snapshot_pixels(texture.id(), SnapshotKind::Canvas, &pixels)),
            TextureSource::Video(video) => snapshot_video(texture.id(), video.as_ref()),
            TextureSource::Image(_) => continue,
        };
        match snapshot {
            Result::Ok(snapshot) => snapshots.push(snapshot),
            Err(e) => {
                log::warn!("Could not snapshot texture {:?}: {e:#}", texture.name);
                failed.push((texture.id(), format!("{e:#}")));
            }
        }
    }
    (snapshots, failed)
}

/// A fresh canvas of the video's native size receives the current frame.
pub fn snapshot_video(texture: TextureId, video: &dyn VideoSource) -> Result<Snapshot> {
    let (width, height) = video.native_size();
    ensure!(width > 0 && height > 0, "video has no frame yet");
    let mut canvas = RgbaImage::new(width, height);
    video.draw_frame(&mut canvas)?;
    snapshot_pixels(texture, SnapshotKind::Video, &canvas)
}

fn snapshot_pixels(texture: TextureId, kind: SnapshotKind, pixels: &RgbaImage) -> Result<Snapshot> {
    Ok(Snapshot {
        texture,
        kind,
        size: pixels.dimensions(),
        data_url: to_png_data_url(pixels)?,
    })
}

async fn decode_snapshot(snapshot: Snapshot) -> Result<Replacement> {
    let image = StaticImage::from_data_url(&snapshot.data_url)
        .with_context(|| format!("decoding {:?} snapshot", snapshot.kind))?;
    Ok(Replacement {
        texture: snapshot.texture,
        image,
    })
}

/// Phase 2: decode every snapshot. Resolves after the last decode finished.
pub async fn decode_snapshots(
    snapshots: Vec<Snapshot>,
) -> (Vec<Replacement>, Vec<(TextureId, String)>) {
    let ids: Vec<_> = snapshots.iter().map(|s| s.texture).collect();
    let decoded = join_all(snapshots.into_iter().map(decode_snapshot)).await;

    let mut replacements = Vec::new();
    let mut failed = Vec::new();
    for (id, result) in ids.into_iter().zip(decoded) {
        match result {
            Result::Ok(replacement) => replacements.push(replacement),
            Err(e) => {
                log::warn!("{e:#}");
                failed.push((id, format!("{e:#}")));
            }
        }
    }
    (replacements, failed)
}

/// Phase 3: swap sources. Returns how many textures were replaced.
///
/// Every texture carrying a replaced id is updated, including clones shared
/// by several materials. Ids no longer present in the scene are ignored.
pub fn apply_replacements(scene: &mut Scene, replacements: Vec<Replacement>) -> usize {
    if replacements.is_empty() {
        return 0;
    }
    let mut applied = HashSet::new();
    scene.for_each_texture_mut(&mut |texture| {
        if let Some(replacement) = replacements.iter().find(|r| r.texture == texture.id()) {
            texture.replace_source(TextureSource::Image(replacement.image.clone()));
            applied.insert(texture.id());
        }
    });
    for replacement in &replacements {
        if !applied.contains(&replacement.texture) {
            log::debug!("Texture {:?} left the scene before normalization finished.", replacement.texture);
        }
    }
    applied.len()
}

/// All three phases in a row.
pub async fn normalize_textures(scene: &mut Scene) -> NormalizeReport {
    let (snapshots, mut failed) = snapshot_live_textures(scene);
    if snapshots.is_empty() && failed.is_empty() {
        return NormalizeReport::default();
    }
    let (replacements, decode_failed) = decode_snapshots(snapshots).await;
    failed.extend(decode_failed);
    let replaced = apply_replacements(scene, replacements);
    log::info!("Normalized {replaced} live textures.");
    NormalizeReport { replaced, failed }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::data_structures::{
        mesh::{Geometry, Material, Mesh},
        scene_graph::Node,
        texture::{Canvas, Texture},
    };

    fn textured_node(texture: Texture) -> Node {
        Node::mesh(Mesh::new(
            None,
            Geometry {
                positions: vec![[0.0; 3]; 3],
                ..Default::default()
            },
            Material {
                map: Some(texture),
                ..Default::default()
            },
        ))
    }

    #[test]
    fn should_snapshot_shared_texture_once() {
        let canvas = Arc::new(Canvas::new(2, 2));
        let texture = Texture::new(None, TextureSource::Canvas(canvas));
        let mut scene = Scene::new();
        scene.add(textured_node(texture.clone()));
        scene.add(textured_node(texture));

        let (snapshots, failed) = snapshot_live_textures(&scene);
        assert_eq!(snapshots.len(), 1);
        assert!(failed.is_empty());
        assert!(snapshots[0].data_url.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn should_skip_textures_removed_before_apply() {
        let canvas = Arc::new(Canvas::new(1, 1));
        let mut scene = Scene::new();
        scene.add(textured_node(Texture::new(None, TextureSource::Canvas(canvas))));
        let (snapshots, _) = snapshot_live_textures(&scene);
        let (replacements, _) = futures::executor::block_on(decode_snapshots(snapshots));

        let mut other = Scene::new();
        other.add(textured_node(Texture::from_image(
            None,
            StaticImage::from_pixels(RgbaImage::new(1, 1)),
        )));
        assert_eq!(apply_replacements(&mut other, replacements), 0);
    }
}
