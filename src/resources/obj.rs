use std::io::{BufReader, Cursor};

use anyhow::*;

use crate::data_structures::{
    mesh::{Geometry, Material, Mesh},
    scene_graph::Node,
};

/// Wavefront OBJ. Only the single uploaded file is available, so `mtllib`
/// references cannot be resolved and every object gets the default material.
pub async fn load_model_obj(file_name: &str, bytes: Vec<u8>) -> Result<Node> {
    let mut obj_reader = BufReader::new(Cursor::new(bytes));

    let (models, obj_materials) = tobj::load_obj_buf_async(
        &mut obj_reader,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        |p| async move {
            log::warn!("Material library {p} is not part of the upload; using defaults.");
            Err(tobj::LoadError::OpenFileFailed)
        },
    )
    .await?;
    let materials = obj_materials.unwrap_or_default();

    let children = models
        .into_iter()
        .map(|m| {
            let positions = m
                .mesh
                .positions
                .chunks_exact(3)
                .map(|p| [p[0], p[1], p[2]])
                .collect();
            let normals = m
                .mesh
                .normals
                .chunks_exact(3)
                .map(|n| [n[0], n[1], n[2]])
                .collect();
            // OBJ puts the texture origin bottom left
            let tex_coords = m
                .mesh
                .texcoords
                .chunks_exact(2)
                .map(|t| [t[0], 1.0 - t[1]])
                .collect();

            let mut geometry = Geometry {
                positions,
                normals,
                tex_coords,
                indices: Some(m.mesh.indices),
            };
            geometry.compute_normals();

            let material = m
                .mesh
                .material_id
                .and_then(|id| materials.get(id))
                .map(|mtl| Material {
                    name: Some(mtl.name.clone()),
                    base_color: match (mtl.diffuse, mtl.dissolve) {
                        (Some([r, g, b]), alpha) => [r, g, b, alpha.unwrap_or(1.0)],
                        (None, alpha) => [1.0, 1.0, 1.0, alpha.unwrap_or(1.0)],
                    },
                    ..Default::default()
                })
                .unwrap_or_default();

            Node::mesh(Mesh::new(Some(m.name), geometry, material))
        })
        .collect::<Vec<_>>();

    ensure!(!children.is_empty(), "no objects found");
    Ok(Node::group(super::stem(file_name), children))
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn should_triangulate_and_flip_tex_coords() {
        let node =
            futures::executor::block_on(load_model_obj("quad.obj", QUAD.as_bytes().to_vec()))
                .unwrap();
        assert_eq!(node.name.as_deref(), Some("quad"));
        let mesh = node.children[0].as_mesh().unwrap();
        assert_eq!(mesh.name.as_deref(), Some("quad"));

        let geometry = &mesh.primitives[0].geometry;
        assert_eq!(geometry.triangle_count(), 2);
        assert_eq!(geometry.vertex_count(), 4);
        assert!(geometry.tex_coords.contains(&[0.0, 1.0]));
        assert_eq!(geometry.normals.len(), 4);
    }

    #[test]
    fn should_fall_back_to_default_material_without_mtl() {
        let source = format!("mtllib missing.mtl\nusemtl red\n{QUAD}");
        let node =
            futures::executor::block_on(load_model_obj("quad.obj", source.into_bytes())).unwrap();
        let material = &node.children[0].as_mesh().unwrap().primitives[0].material;
        assert_eq!(material.base_color, [1.0; 4]);
    }
}
