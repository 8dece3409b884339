use std::io::Cursor;

use anyhow::*;

use crate::data_structures::{
    mesh::{Geometry, Material, Mesh},
    scene_graph::Node,
};

/// ASCII or binary STL. Faces keep their own vertices so shading stays flat.
pub fn load_model_stl(file_name: &str, bytes: &[u8]) -> Result<Node> {
    let mesh = stl_io::read_stl(&mut Cursor::new(bytes))?;
    ensure!(!mesh.faces.is_empty(), "no facets found");

    let mut positions = Vec::with_capacity(mesh.faces.len() * 3);
    let mut normals = Vec::with_capacity(mesh.faces.len() * 3);
    for face in &mesh.faces {
        let corners = face.vertices.map(|i| {
            let v = &mesh.vertices[i];
            [v[0], v[1], v[2]]
        });
        let normal = face_normal(&corners, [face.normal[0], face.normal[1], face.normal[2]]);
        positions.extend(corners);
        normals.extend([normal; 3]);
    }

    let geometry = Geometry {
        positions,
        normals,
        tex_coords: Vec::new(),
        indices: None,
    };
    let name = super::stem(file_name);
    Ok(Node::mesh(Mesh::new(name, geometry, Material::default())))
}

/// Many exporters leave the stored facet normal zeroed; recompute from the winding then.
fn face_normal(corners: &[[f32; 3]; 3], stored: [f32; 3]) -> [f32; 3] {
    use cgmath::InnerSpace;

    let stored = cgmath::Vector3::from(stored);
    if stored.magnitude2() > 0.0 {
        return stored.normalize().into();
    }
    let [a, b, c] = corners.map(cgmath::Vector3::from);
    let normal = (b - a).cross(c - a);
    if normal.magnitude2() > 0.0 {
        normal.normalize().into()
    } else {
        [0.0, 0.0, 1.0]
    }
}
