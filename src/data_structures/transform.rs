//! Local node transforms.
//!
//! Every scene node carries a [`Transform`] relative to its parent. World
//! transforms are obtained by multiplying down the hierarchy, the same way the
//! renderer and the exporter walk the tree.

use std::ops::Mul;

use cgmath::{InnerSpace, Matrix, One, SquareMatrix};

/// Translation, rotation (as quaternion) and scale of a node relative to its parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Transform {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            // `Quaternion::one()` is the identity quaternion (no rotation)
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// Build a transform from glTF style decomposed arrays (rotation as `[x, y, z, w]`).
    pub fn from_decomposed(position: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            position: position.into(),
            rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
            scale: scale.into(),
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::new()
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// The matrix used to transform normals: inverse transpose of the upper 3x3.
    pub fn normal_matrix(matrix: &cgmath::Matrix4<f32>) -> cgmath::Matrix3<f32> {
        let upper = cgmath::Matrix3::from_cols(
            matrix.x.truncate(),
            matrix.y.truncate(),
            matrix.z.truncate(),
        );
        upper
            .invert()
            .map(|inverse| inverse.transpose())
            .unwrap_or(upper)
    }

    /// Rotation as `[x, y, z, w]`, the layout glTF expects.
    pub fn rotation_xyzw(&self) -> [f32; 4] {
        let rotation = self.rotation.normalize();
        [rotation.v.x, rotation.v.y, rotation.v.z, rotation.s]
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl From<cgmath::Vector3<f32>> for Transform {
    fn from(position: cgmath::Vector3<f32>) -> Self {
        Transform {
            position,
            ..Default::default()
        }
    }
}

impl<'a, 'b> Mul<&'b Transform> for &'a Transform {
    type Output = Transform;

    fn mul(self, rhs: &'b Transform) -> Self::Output {
        let new_rotation = self.rotation * rhs.rotation;

        let new_scale = cgmath::Vector3::new(
            self.scale.x * rhs.scale.x,
            self.scale.y * rhs.scale.y,
            self.scale.z * rhs.scale.z,
        );
        let scaled_rhs_pos = cgmath::Vector3::new(
            self.scale.x * rhs.position.x,
            self.scale.y * rhs.position.y,
            self.scale.z * rhs.position.z,
        );
        let new_position = self.position + (self.rotation * scaled_rhs_pos);

        Transform {
            position: new_position,
            rotation: new_rotation,
            scale: new_scale,
        }
    }
}

impl Mul<Transform> for Transform {
    type Output = Self;

    fn mul(self, rhs: Transform) -> Self::Output {
        &self * &rhs
    }
}

#[cfg(test)]
mod tests {
    use cgmath::{Deg, Rotation3};

    use super::*;

    #[test]
    fn should_compose_parent_and_child() {
        let parent = Transform {
            position: [1.0, 0.0, 0.0].into(),
            rotation: cgmath::Quaternion::from_angle_y(Deg(90.0)),
            scale: [2.0, 2.0, 2.0].into(),
        };
        let child = Transform::from(cgmath::Vector3::new(0.0, 0.0, 1.0));
        let world = &parent * &child;

        // +Z rotated 90 degrees around Y points to +X, scaled by 2
        assert!((world.position.x - 3.0).abs() < 1e-5);
        assert!(world.position.y.abs() < 1e-5);
        assert!(world.position.z.abs() < 1e-5);
        assert_eq!(world.scale, cgmath::Vector3::new(2.0, 2.0, 2.0));
    }

    #[test]
    fn should_round_trip_gltf_rotation_layout() {
        let transform = Transform::from_decomposed([0.0; 3], [0.0, 0.0, 0.0, 1.0], [1.0; 3]);
        assert!(transform.is_identity());
        assert_eq!(transform.rotation_xyzw(), [0.0, 0.0, 0.0, 1.0]);
    }
}
