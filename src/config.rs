//! Runtime configuration of the viewer and the converter.
//!
//! Defaults reproduce the classic three-pane converter page: a 75° camera,
//! a dim grey ambient light plus one white directional light, and binary
//! output. Native front ends override fields from command line flags; the
//! browser entry point narrows `formats` for single-format pages.

use std::path::PathBuf;

use cgmath::InnerSpace;

use crate::{export::ExportOptions, resources::ModelFormat};

#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    /// Vertical field of view in degrees.
    pub fov_y: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y: 75.0,
            z_near: 0.1,
            z_far: 1000.0,
            position: [0.0, 0.0, 5.0],
            target: [0.0, 0.0, 0.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LightingConfig {
    pub ambient_color: u32,
    pub ambient_intensity: f32,
    pub directional_color: u32,
    pub directional_intensity: f32,
    /// Not normalized; see [`LightingConfig::directional_direction`].
    pub directional_position: [f32; 3],
}

impl LightingConfig {
    pub fn directional_direction(&self) -> cgmath::Vector3<f32> {
        let position: cgmath::Vector3<f32> = self.directional_position.into();
        if position.magnitude2() > 0.0 {
            position.normalize()
        } else {
            cgmath::Vector3::unit_y()
        }
    }
}

impl Default for LightingConfig {
    fn default() -> Self {
        Self {
            ambient_color: 0xcccccc,
            ambient_intensity: 0.4,
            directional_color: 0xffffff,
            directional_intensity: 0.8,
            directional_position: [1.0, 1.0, 0.0],
        }
    }
}

#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub camera: CameraConfig,
    pub lighting: LightingConfig,
    /// Formats the file picker hands to the importer. Everything else is rejected.
    pub formats: Vec<ModelFormat>,
    pub export: ExportOptions,
    pub clear_colour: wgpu::Color,
    /// Where native downloads are written.
    pub output_dir: PathBuf,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            lighting: LightingConfig::default(),
            formats: ModelFormat::ALL.to_vec(),
            export: ExportOptions::default(),
            clear_colour: wgpu::Color::BLACK,
            output_dir: PathBuf::from("."),
        }
    }
}

impl ViewerConfig {
    /// Restrict the accepted formats, e.g. for the single format `fbx2glb` page.
    pub fn with_formats(mut self, formats: Vec<ModelFormat>) -> Self {
        if !formats.is_empty() {
            self.formats = formats;
        }
        self
    }
}
