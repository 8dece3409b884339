//! Perspective camera and its uniform.
//!
//! The camera is fixed: it looks from [`CameraConfig::position`] at
//! [`CameraConfig::target`]. Only the aspect ratio follows the viewport.

use cgmath::{Matrix4, Point3, Vector3, perspective};

use crate::config::CameraConfig;

/// wgpu uses a depth range of 0..1 while cgmath produces OpenGL's -1..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

#[derive(Clone, Debug, PartialEq)]
pub struct PerspectiveCamera {
    pub fov_y: cgmath::Deg<f32>,
    pub aspect: f32,
    pub z_near: f32,
    pub z_far: f32,
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

impl PerspectiveCamera {
    pub fn new(config: &CameraConfig, width: u32, height: u32) -> Self {
        Self {
            fov_y: cgmath::Deg(config.fov_y),
            aspect: aspect_ratio(width, height),
            z_near: config.z_near,
            z_far: config.z_far,
            position: config.position.into(),
            target: config.target.into(),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = aspect_ratio(width, height);
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, Vector3::unit_y())
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fov_y, self.aspect, self.z_near, self.z_far)
    }

    pub fn view_proj(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }
}

fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}
