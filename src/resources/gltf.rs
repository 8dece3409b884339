//! glTF 2.0 loading (`.gltf` with embedded buffers and `.glb`).
//!
//! The whole document is resolved by [`::gltf::import_slice`]; this module
//! only maps its nodes, meshes, materials and base colour images onto the
//! scene graph. The returned root is the document's default scene.

use std::collections::HashMap;

use anyhow::*;
use image::RgbaImage;

use crate::data_structures::{
    mesh::{Geometry, Material, Mesh, Primitive},
    scene_graph::Node,
    texture::{StaticImage, Texture},
    transform::Transform,
};

pub fn load_model_gltf(file_name: &str, bytes: &[u8]) -> Result<Node> {
    let (document, buffers, images) = ::gltf::import_slice(bytes)?;

    let scene = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .ok_or_else(|| anyhow!("{file_name} has no scene"))?;

    let mut textures = HashMap::new();
    let children = scene
        .nodes()
        .map(|node| to_scene_node(node, &buffers, &images, &mut textures))
        .collect::<Result<Vec<_>>>()?;

    let name = scene
        .name()
        .map(str::to_string)
        .or_else(|| super::stem(file_name));
    Ok(Node::group(name, children))
}

fn to_scene_node(
    node: ::gltf::Node,
    buffers: &[::gltf::buffer::Data],
    images: &[::gltf::image::Data],
    textures: &mut HashMap<usize, Texture>,
) -> Result<Node> {
    let (translation, rotation, scale) = node.transform().decomposed();
    let transform = Transform::from_decomposed(translation, rotation, scale);

    let mut scene_node = match node.mesh() {
        Some(mesh) => {
            let mut primitives = Vec::new();
            for primitive in mesh.primitives() {
                if let Some(primitive) = to_primitive(&mesh, primitive, buffers, images, textures)? {
                    primitives.push(primitive);
                }
            }
            let mut scene_node = Node::mesh(Mesh {
                name: mesh.name().map(str::to_string),
                primitives,
            });
            if let Some(name) = node.name() {
                scene_node.name = Some(name.to_string());
            }
            scene_node
        }
        None => Node::group(node.name().map(str::to_string), Vec::new()),
    };
    scene_node.transform = transform;

    for child in node.children() {
        let child_node = to_scene_node(child, buffers, images, textures)?;
        scene_node.add_child(child_node);
    }

    Ok(scene_node)
}

fn to_primitive(
    mesh: &::gltf::Mesh,
    primitive: ::gltf::Primitive,
    buffers: &[::gltf::buffer::Data],
    images: &[::gltf::image::Data],
    textures: &mut HashMap<usize, Texture>,
) -> Result<Option<Primitive>> {
    if primitive.mode() != ::gltf::mesh::Mode::Triangles {
        log::warn!(
            "Skipping {:?} primitive of mesh {:?}; only triangle lists are supported.",
            primitive.mode(),
            mesh.name()
        );
        return Ok(None);
    }
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));

    let positions: Vec<[f32; 3]> = match reader.read_positions() {
        Some(positions) => positions.collect(),
        None => {
            log::warn!("Primitive of mesh {:?} has no positions.", mesh.name());
            return Ok(None);
        }
    };
    let normals = reader
        .read_normals()
        .map(|normals| normals.collect())
        .unwrap_or_default();
    let tex_coords = reader
        .read_tex_coords(0)
        .map(|tex_coords| tex_coords.into_f32().collect())
        .unwrap_or_default();
    let indices = reader
        .read_indices()
        .map(|indices| indices.into_u32().collect());

    let mut geometry = Geometry {
        positions,
        normals,
        tex_coords,
        indices,
    };
    if let Some(index) = geometry.out_of_range_index() {
        bail!(
            "mesh {:?} references vertex {index} but has only {} vertices",
            mesh.name().unwrap_or_default(),
            geometry.vertex_count()
        );
    }
    geometry.compute_normals();

    let material = to_material(primitive.material(), images, textures);
    Ok(Some(Primitive { geometry, material }))
}

fn to_material(
    material: ::gltf::Material,
    images: &[::gltf::image::Data],
    textures: &mut HashMap<usize, Texture>,
) -> Material {
    let pbr = material.pbr_metallic_roughness();
    let map = pbr.base_color_texture().and_then(|info| {
        let image_index = info.texture().source().index();
        if let Some(texture) = textures.get(&image_index) {
            return Some(texture.clone());
        }
        let texture = match images.get(image_index).map(to_static_image) {
            Some(Result::Ok(image)) => {
                let name = info.texture().source().name().map(str::to_string);
                Texture::from_image(name, image)
            }
            Some(Err(e)) => {
                log::warn!("Dropping base colour texture {image_index}: {e}");
                return None;
            }
            None => return None,
        };
        textures.insert(image_index, texture.clone());
        Some(texture)
    });

    Material {
        name: material.name().map(str::to_string),
        base_color: pbr.base_color_factor(),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        double_sided: material.double_sided(),
        map,
    }
}

/// Expand whatever pixel layout the document decoded into RGBA8.
fn to_static_image(data: &::gltf::image::Data) -> Result<StaticImage> {
    use ::gltf::image::Format;

    let pixel_count = (data.width * data.height) as usize;
    let rgba: Vec<u8> = match data.format {
        Format::R8G8B8A8 => data.pixels.clone(),
        Format::R8G8B8 => data
            .pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => data
            .pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        Format::R8 => data.pixels.iter().flat_map(|&p| [p, p, p, 255]).collect(),
        other => bail!("unsupported image layout {other:?}"),
    };
    ensure!(
        rgba.len() == pixel_count * 4,
        "image data does not match its {}x{} size",
        data.width,
        data.height
    );
    let pixels = RgbaImage::from_raw(data.width, data.height, rgba)
        .ok_or_else(|| anyhow!("image buffer too small"))?;
    Ok(StaticImage::from_pixels(pixels))
}
