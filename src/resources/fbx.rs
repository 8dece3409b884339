use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
};

use anyhow::*;
use cgmath::{Deg, Quaternion, Rotation3};
use fbxcel_dom::{
    any::AnyDocument,
    v7400::{
        data::mesh::{
            TriangleVertexIndex, TriangleVertices,
            layer::{TypedLayerElementHandle, material::Materials, normal::Normals, uv::Uv},
        },
        object::{
            ObjectId, TypedObjectHandle,
            geometry::MeshHandle as GeometryHandle,
            material::MaterialHandle,
            model::{ModelHandle, TypedModelHandle},
            property::{
                ObjectProperties,
                loaders::{F64Arr3Loader, PrimitiveLoader},
            },
            texture::TextureHandle,
        },
    },
};

use crate::data_structures::{
    mesh::{Geometry, Material, Mesh, Primitive},
    scene_graph::Node,
    texture::{StaticImage, Texture},
    transform::Transform,
};

/// Binary FBX 7.x. Models keep their hierarchy and local transforms under one
/// group named after the file.
///
/// Each mesh model becomes one mesh node with a primitive per material slot.
/// Normals and UVs come from the first layer; missing normals are recomputed.
/// Only textures embedded in the file can be used.
pub fn load_model_fbx(file_name: &str, bytes: &[u8]) -> Result<Node> {
    let doc = match AnyDocument::from_seekable_reader(Cursor::new(bytes))? {
        AnyDocument::V7400(_, doc) => doc,
        _ => bail!("unsupported FBX version"),
    };

    let mut textures = HashMap::new();
    let mut children = Vec::new();
    for object in doc.objects() {
        let TypedObjectHandle::Model(model) = object.get_typed() else {
            continue;
        };
        if model.parent_model().is_some() {
            continue;
        }
        if let Some(node) = to_scene_node(model, &mut textures)? {
            children.push(node);
        }
    }

    ensure!(!children.is_empty(), "no mesh geometry found");
    log::debug!("{file_name}: {} FBX root models", children.len());
    Ok(Node::group(super::stem(file_name), children))
}

/// Models without geometry anywhere below them are dropped.
fn to_scene_node(
    model: TypedModelHandle,
    textures: &mut HashMap<ObjectId, Texture>,
) -> Result<Option<Node>> {
    let name = model
        .name()
        .filter(|name| !name.is_empty())
        .map(str::to_string);

    let mut node = match model {
        TypedModelHandle::Mesh(mesh_model) => {
            let materials = mesh_model
                .materials()
                .map(|material| to_material(material, textures))
                .collect::<Vec<_>>();
            let primitives = to_primitives(&mesh_model.geometry()?, &materials)
                .with_context(|| format!("mesh {name:?}"))?;
            if primitives.is_empty() {
                log::warn!("Skipping empty FBX geometry {name:?}.");
                Node::group(name, Vec::new())
            } else {
                Node::mesh(Mesh { name, primitives })
            }
        }
        _ => Node::group(name, Vec::new()),
    };

    for child in model.child_models() {
        if let Some(child) = to_scene_node(child, textures)? {
            node.add_child(child);
        }
    }
    if !node.has_geometry() {
        return Ok(None);
    }
    Ok(Some(node.with_transform(local_transform(&model)?)))
}

/// `Lcl Translation`, `PreRotation` and `Lcl Rotation` (XYZ Euler degrees)
/// and `Lcl Scaling`. Pivots and offsets are ignored.
fn local_transform(model: &ModelHandle) -> Result<Transform> {
    let properties = model.properties_by_native_typename("FbxNode");
    let translation = vector_property(&properties, "Lcl Translation", [0.0; 3])?;
    let pre_rotation = vector_property(&properties, "PreRotation", [0.0; 3])?;
    let rotation = vector_property(&properties, "Lcl Rotation", [0.0; 3])?;
    let scaling = vector_property(&properties, "Lcl Scaling", [1.0; 3])?;

    let to_f32 = |v: [f64; 3]| [v[0] as f32, v[1] as f32, v[2] as f32];
    Ok(Transform {
        position: to_f32(translation).into(),
        rotation: euler_xyz(pre_rotation) * euler_xyz(rotation),
        scale: to_f32(scaling).into(),
    })
}

fn vector_property(properties: &ObjectProperties, name: &str, default: [f64; 3]) -> Result<[f64; 3]> {
    match properties.get_property(name) {
        Some(property) => property
            .load_value(F64Arr3Loader::new())
            .with_context(|| format!("property {name}")),
        None => Ok(default),
    }
}

/// FBX applies X first, then Y, then Z.
fn euler_xyz(degrees: [f64; 3]) -> Quaternion<f32> {
    Quaternion::from_angle_z(Deg(degrees[2] as f32))
        * Quaternion::from_angle_y(Deg(degrees[1] as f32))
        * Quaternion::from_angle_x(Deg(degrees[0] as f32))
}

#[derive(Default)]
struct LayerData<'a> {
    normals: Option<Normals<'a>>,
    uv: Option<Uv<'a>>,
    materials: Option<Materials<'a>>,
}

/// First normal, UV and material element of the first layer. Elements in a
/// mapping this loader cannot read are skipped with a warning.
fn layer_data<'a>(geometry: &GeometryHandle<'a>) -> Result<LayerData<'a>> {
    let mut data = LayerData::default();
    let Some(layer) = geometry.layers().next() else {
        return Ok(data);
    };
    for entry in layer.layer_element_entries() {
        match entry.typed_layer_element()? {
            TypedLayerElementHandle::Normal(handle) if data.normals.is_none() => {
                match handle.normals() {
                    Result::Ok(normals) => data.normals = Some(normals),
                    Err(e) => log::warn!("Ignoring FBX normals: {e}"),
                }
            }
            TypedLayerElementHandle::Uv(handle) if data.uv.is_none() => match handle.uv() {
                Result::Ok(uv) => data.uv = Some(uv),
                Err(e) => log::warn!("Ignoring FBX UVs: {e}"),
            },
            TypedLayerElementHandle::Material(handle) if data.materials.is_none() => {
                match handle.materials() {
                    Result::Ok(materials) => data.materials = Some(materials),
                    Err(e) => log::warn!("Ignoring FBX material indices: {e}"),
                }
            }
            _ => {}
        }
    }
    Ok(data)
}

/// Triangulate the polygons and split them by material slot. Vertices are
/// not shared, every triangle corner gets its own normal and UV.
fn to_primitives(geometry: &GeometryHandle, materials: &[Material]) -> Result<Vec<Primitive>> {
    let polygon_vertices = geometry.polygon_vertices()?;
    let triangles = polygon_vertices.triangulate_each(|_, poly, out| {
        ensure!(poly.len() >= 3, "polygon with {} vertices", poly.len());
        // fan around the first vertex
        for i in 1..poly.len() - 1 {
            out.push([poly[0], poly[i], poly[i + 1]]);
        }
        Ok(())
    })?;
    let layers = layer_data(geometry)?;

    let corners = triangles.triangle_vertex_indices().collect::<Vec<_>>();
    let mut slots: BTreeMap<u32, Geometry> = BTreeMap::new();
    for triangle in corners.chunks_exact(3) {
        let slot = match &layers.materials {
            Some(indices) => indices.material_index(&triangles, triangle[0])?.to_u32(),
            None => 0,
        };
        let target = slots.entry(slot).or_default();
        for &corner in triangle {
            push_corner(target, &triangles, &layers, corner)?;
        }
    }

    Ok(slots
        .into_iter()
        .map(|(slot, mut geometry)| {
            geometry.compute_normals();
            let material = materials.get(slot as usize).cloned().unwrap_or_default();
            Primitive { geometry, material }
        })
        .collect())
}

fn push_corner<'a>(
    geometry: &mut Geometry,
    triangles: &TriangleVertices<'a>,
    layers: &LayerData<'a>,
    corner: TriangleVertexIndex,
) -> Result<()> {
    let point = triangles
        .control_point(corner)
        .ok_or_else(|| anyhow!("triangle vertex without control point"))?;
    geometry
        .positions
        .push([point.x as f32, point.y as f32, point.z as f32]);

    if let Some(normals) = &layers.normals {
        let n = normals.normal(triangles, corner)?;
        geometry.normals.push([n.x as f32, n.y as f32, n.z as f32]);
    }
    if let Some(uv) = &layers.uv {
        let t = uv.uv(triangles, corner)?;
        // FBX puts the texture origin bottom left
        geometry.tex_coords.push([t.x as f32, 1.0 - t.y as f32]);
    }
    Ok(())
}

/// Diffuse colour and opacity of a lambert or phong material, plus its
/// embedded diffuse texture.
fn to_material(material: MaterialHandle, textures: &mut HashMap<ObjectId, Texture>) -> Material {
    let properties = material.properties();
    let [r, g, b] = match properties.diffuse_color_or_default() {
        Result::Ok(color) => [color.r as f32, color.g as f32, color.b as f32],
        Err(e) => {
            log::warn!("Unreadable diffuse colour: {e}");
            [0.8; 3]
        }
    };
    let opacity = properties
        .get_property("Opacity")
        .and_then(|property| property.load_value(PrimitiveLoader::<f64>::new()).ok())
        .map_or(1.0, |opacity| opacity as f32);

    let map = material
        .diffuse_texture()
        .and_then(|texture| to_texture(texture, textures));

    Material {
        name: material
            .name()
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        base_color: [r, g, b, opacity],
        map,
        ..Default::default()
    }
}

fn to_texture(texture: TextureHandle, textures: &mut HashMap<ObjectId, Texture>) -> Option<Texture> {
    if let Some(known) = textures.get(&texture.object_id()) {
        return Some(known.clone());
    }
    let clip = texture.video_clip()?;
    let file_name = clip.relative_filename().unwrap_or_default();
    let content = match clip.content() {
        Some(content) if !content.is_empty() => content,
        _ => {
            log::warn!("Texture {file_name:?} is not embedded in the FBX file; dropping it.");
            return None;
        }
    };
    let image = match StaticImage::from_bytes(content, None) {
        Result::Ok(image) => image,
        Err(e) => {
            log::warn!("Dropping texture {file_name:?}: {e}");
            return None;
        }
    };
    let name = texture
        .name()
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let loaded = Texture::from_image(name, image);
    textures.insert(texture.object_id(), loaded.clone());
    Some(loaded)
}

#[cfg(test)]
mod tests {
    use cgmath::InnerSpace;

    use super::*;

    #[test]
    fn should_reject_non_fbx_input() {
        assert!(load_model_fbx("a.fbx", b"Kaydara FBX Binary  \0 truncated").is_err());
        assert!(load_model_fbx("b.fbx", b"; FBX 7.3.0 ascii export").is_err());
    }

    #[test]
    fn should_rotate_x_before_z() {
        let rotation = euler_xyz([90.0, 0.0, 90.0]);
        let v = rotation * cgmath::Vector3::unit_y();
        // x turns +Y into +Z, z then leaves +Z alone
        assert!((v - cgmath::Vector3::unit_z()).magnitude() < 1e-5);
    }

    #[test]
    fn should_read_quad_fixture_layers_and_material() {
        let bytes = include_bytes!("../../tests/fixtures/quad.fbx");
        let root = load_model_fbx("quad.fbx", bytes).unwrap();
        assert_eq!(root.name.as_deref(), Some("quad"));
        assert_eq!(root.children.len(), 1);

        let quad = &root.children[0];
        assert_eq!(quad.name.as_deref(), Some("Quad"));
        assert_eq!(quad.transform.position, cgmath::Vector3::new(1.0, 2.0, 3.0));
        assert_eq!(quad.transform.scale, cgmath::Vector3::new(2.0, 2.0, 2.0));

        let mesh = quad.as_mesh().unwrap();
        assert_eq!(mesh.primitives.len(), 1);
        let primitive = &mesh.primitives[0];
        assert_eq!(primitive.geometry.triangle_count(), 2);
        assert_eq!(primitive.geometry.normals, vec![[0.0, 0.0, 1.0]; 6]);
        assert!(primitive.geometry.tex_coords.contains(&[1.0, 0.0]));
        assert!(primitive.geometry.tex_coords.contains(&[0.0, 1.0]));

        let material = &primitive.material;
        assert_eq!(material.name.as_deref(), Some("Red"));
        assert_eq!(material.base_color, [1.0, 0.0, 0.0, 1.0]);
        let map = material.map.as_ref().unwrap();
        assert_eq!(map.source.as_image().unwrap().dimensions(), (2, 2));
    }
}
