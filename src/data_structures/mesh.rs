//! CPU side mesh and material definitions.
//!
//! Importers fill these in, the renderer uploads them and the exporter writes
//! them back out as glTF primitives.

use cgmath::InnerSpace;

use crate::data_structures::texture::Texture;

/// Vertex streams of one primitive. All streams except `positions` may be empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub indices: Option<Vec<u32>>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        match &self.indices {
            Some(indices) => indices.len() / 3,
            None => self.positions.len() / 3,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Axis aligned bounds as `(min, max)`. `None` for empty geometry.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.positions.first()?;
        Some(self.positions.iter().fold((first, first), |(mut min, mut max), p| {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
            (min, max)
        }))
    }

    /// Index list of the triangles, synthesized for non-indexed geometry.
    pub fn triangle_indices(&self) -> Vec<u32> {
        match &self.indices {
            Some(indices) => indices.clone(),
            None => (0..self.positions.len() as u32).collect(),
        }
    }

    /// The first index that points past the vertex streams, if any.
    pub fn out_of_range_index(&self) -> Option<u32> {
        let count = self.positions.len();
        self.indices
            .as_ref()?
            .iter()
            .copied()
            .find(|&i| i as usize >= count)
    }

    /// Fill `normals` with area weighted vertex normals when the source had none.
    pub fn compute_normals(&mut self) {
        if !self.normals.is_empty() || self.positions.is_empty() {
            return;
        }
        let mut normals = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); self.positions.len()];
        for c in self.triangle_indices().chunks_exact(3) {
            let corner = |i: u32| self.positions.get(i as usize).copied().map(cgmath::Vector3::from);
            // triangles pointing past the vertex streams are skipped
            let (Some(pos0), Some(pos1), Some(pos2)) = (corner(c[0]), corner(c[1]), corner(c[2])) else {
                continue;
            };
            // cross product length is twice the triangle area, which gives the weighting
            let face_normal = (pos1 - pos0).cross(pos2 - pos0);
            for &i in c {
                normals[i as usize] += face_normal;
            }
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }
}

/// Subset of the glTF metallic-roughness material that survives every input format.
#[derive(Clone, Debug)]
pub struct Material {
    pub name: Option<String>,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub double_sided: bool,
    pub map: Option<Texture>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: None,
            base_color: [1.0, 1.0, 1.0, 1.0],
            metallic: 0.0,
            roughness: 1.0,
            double_sided: false,
            map: None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Primitive {
    pub geometry: Geometry,
    pub material: Material,
}

/// A renderable mesh: one or more primitives sharing a node transform.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

impl Mesh {
    pub fn new(name: Option<String>, geometry: Geometry, material: Material) -> Self {
        Self {
            name,
            primitives: vec![Primitive { geometry, material }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Geometry {
        Geometry {
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            ..Default::default()
        }
    }

    #[test]
    fn should_compute_normals_facing_counter_clockwise_side() {
        let mut geometry = triangle();
        geometry.compute_normals();
        assert_eq!(geometry.normals, vec![[0.0, 0.0, 1.0]; 3]);
    }

    #[test]
    fn should_skip_triangles_with_out_of_range_indices() {
        let mut geometry = Geometry {
            indices: Some(vec![0, 1, 2, 0, 1, 7]),
            ..triangle()
        };
        assert_eq!(geometry.out_of_range_index(), Some(7));

        geometry.compute_normals();
        assert_eq!(geometry.normals, vec![[0.0, 0.0, 1.0]; 3]);
        assert_eq!(triangle().out_of_range_index(), None);
    }

    #[test]
    fn should_compute_bounds() {
        let (min, max) = triangle().bounds().unwrap();
        assert_eq!(min, [0.0, 0.0, 0.0]);
        assert_eq!(max, [1.0, 1.0, 0.0]);
        assert_eq!(Geometry::default().bounds(), None);
    }
}
