//! Scene to glTF 2.0 serialization.
//!
//! The scene is flattened into a single buffer: every vertex stream, index
//! list and embedded texture image gets its own 4-byte aligned buffer view.
//! Binary output stores that buffer in the GLB `BIN` chunk; JSON output
//! embeds it as a base64 `data:` URI so the `.gltf` file stands alone.
//!
//! The directional light is written through `KHR_lights_punctual`. glTF has
//! no ambient lights, so those become plain named nodes.

pub mod download;

use std::{borrow::Cow, collections::BTreeMap, collections::HashMap};

use base64::Engine;
use cgmath::InnerSpace;
use gltf::json::{
    self,
    extensions::scene::khr_lights_punctual,
    validation::{Checked::Valid, USize64},
};

use crate::{
    data_structures::{
        mesh::{Material, Primitive},
        scene_graph::{Light, LightKind, Node, NodeKind, Scene},
        texture::{Texture, TextureId, TextureSource},
        transform::Transform,
    },
    error::ExportError,
};

pub use download::{DownloadSink, save_export};

pub const GLB_FILE_NAME: &str = "scene.glb";
pub const GLTF_FILE_NAME: &str = "scene.gltf";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportOptions {
    /// Produce GLB. JSON glTF otherwise.
    pub binary: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { binary: true }
    }
}

/// Output of one export, consumed by a [`DownloadSink`].
#[derive(Clone, Debug)]
pub enum ExportResult {
    Binary(Vec<u8>),
    Json(json::Root),
}

impl ExportResult {
    pub fn file_name(&self) -> &'static str {
        match self {
            ExportResult::Binary(_) => GLB_FILE_NAME,
            ExportResult::Json(_) => GLTF_FILE_NAME,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportResult::Binary(_) => "application/octet-stream",
            ExportResult::Json(_) => "model/gltf+json",
        }
    }

    /// File contents. JSON is pretty printed with two space indentation.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ExportError> {
        match self {
            ExportResult::Binary(bytes) => Ok(bytes.clone()),
            ExportResult::Json(root) => {
                let output = serde_json::to_string_pretty(root)?;
                log::debug!("{output}");
                Ok(output.into_bytes())
            }
        }
    }
}

/// Serialize every node of `scene`.
///
/// Fails with [`ExportError::LiveTexture`] if a texture still points at a
/// canvas or video; run [`crate::normalize`] first.
pub fn export_scene(scene: &Scene, options: &ExportOptions) -> Result<ExportResult, ExportError> {
    let mut builder = GltfBuilder::new();
    let mut nodes = Vec::new();
    for child in scene.children() {
        nodes.push(builder.push_node(child)?);
    }
    // readers reject a scene without nodes, an empty document has no scene at all
    if !nodes.is_empty() {
        builder.root.scene = Some(builder.root.push(json::Scene {
            extensions: Default::default(),
            extras: Default::default(),
            name: Some("Scene".to_string()),
            nodes,
        }));
    }

    let (mut root, buffer) = builder.finish();
    log::info!(
        "Exporting {} nodes, {} meshes, {} bytes of buffer data",
        root.nodes.len(),
        root.meshes.len(),
        buffer.len()
    );

    if options.binary {
        let json_string = json::serialize::to_string(&root)?;
        let json_length = padded_len(json_string.len());
        let mut length = 12 + 8 + json_length;
        if !buffer.is_empty() {
            length += 8 + buffer.len();
        }
        let glb = gltf::binary::Glb {
            header: gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                length: u32::try_from(length)
                    .map_err(|_| ExportError::Encode(anyhow::anyhow!("scene exceeds the GLB size limit")))?,
            },
            json: Cow::Owned(json_string.into_bytes()),
            bin: (!buffer.is_empty()).then_some(Cow::Owned(buffer)),
        };
        Ok(ExportResult::Binary(glb.to_vec()?))
    } else {
        if let Some(buffer_json) = root.buffers.first_mut() {
            buffer_json.uri = Some(format!(
                "data:application/octet-stream;base64,{}",
                base64::engine::general_purpose::STANDARD.encode(&buffer)
            ));
        }
        Ok(ExportResult::Json(root))
    }
}

const KHR_LIGHTS_PUNCTUAL: &str = "KHR_lights_punctual";

/// glTF directional lights shine down their local -Z axis; ours shine from the
/// node position towards the origin.
fn aim_directional_light(transform: &Transform) -> Transform {
    let towards_origin = if transform.position.magnitude2() > 0.0 {
        -transform.position.normalize()
    } else {
        -cgmath::Vector3::unit_y()
    };
    Transform {
        rotation: cgmath::Quaternion::from_arc(-cgmath::Vector3::unit_z(), towards_origin, None),
        ..*transform
    }
}

fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

struct GltfBuilder {
    root: json::Root,
    buffer: Vec<u8>,
    buffer_index: json::Index<json::Buffer>,
    textures: HashMap<TextureId, json::Index<json::Texture>>,
    sampler: Option<json::Index<json::texture::Sampler>>,
}

impl GltfBuilder {
    fn new() -> Self {
        let mut root = json::Root {
            asset: json::Asset {
                generator: Some(format!("model2glb {}", env!("CARGO_PKG_VERSION"))),
                version: "2.0".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        // length is filled in by `finish`
        let buffer_index = root.push(json::Buffer {
            byte_length: USize64(0),
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            uri: None,
        });
        Self {
            root,
            buffer: Vec::new(),
            buffer_index,
            textures: HashMap::new(),
            sampler: None,
        }
    }

    fn finish(mut self) -> (json::Root, Vec<u8>) {
        if self.buffer.is_empty() {
            self.root.buffers.clear();
        } else {
            self.buffer.resize(padded_len(self.buffer.len()), 0);
            self.root.buffers[self.buffer_index.value()].byte_length =
                USize64::from(self.buffer.len());
        }
        (self.root, self.buffer)
    }

    fn push_view(
        &mut self,
        bytes: &[u8],
        target: Option<json::buffer::Target>,
    ) -> json::Index<json::buffer::View> {
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(bytes);
        self.buffer.resize(padded_len(self.buffer.len()), 0);
        self.root.push(json::buffer::View {
            buffer: self.buffer_index,
            byte_length: USize64::from(bytes.len()),
            byte_offset: Some(USize64::from(offset)),
            byte_stride: None,
            extensions: Default::default(),
            extras: Default::default(),
            name: None,
            target: target.map(Valid),
        })
    }

    fn push_accessor(
        &mut self,
        bytes: &[u8],
        count: usize,
        component_type: json::accessor::ComponentType,
        type_: json::accessor::Type,
        target: json::buffer::Target,
        bounds: Option<([f32; 3], [f32; 3])>,
    ) -> json::Index<json::Accessor> {
        let view = self.push_view(bytes, Some(target));
        self.root.push(json::Accessor {
            buffer_view: Some(view),
            byte_offset: Some(USize64(0)),
            count: USize64::from(count),
            component_type: Valid(json::accessor::GenericComponentType(component_type)),
            extensions: Default::default(),
            extras: Default::default(),
            type_: Valid(type_),
            min: bounds.map(|(min, _)| json::Value::from(Vec::from(min))),
            max: bounds.map(|(_, max)| json::Value::from(Vec::from(max))),
            name: None,
            normalized: false,
            sparse: None,
        })
    }

    fn push_node(&mut self, node: &Node) -> Result<json::Index<json::Node>, ExportError> {
        let mut transform = node.transform;
        let mut light = None;
        let mesh = match &node.kind {
            NodeKind::Light(source) => {
                light = self.push_light(node.name.as_deref(), source);
                if light.is_some() {
                    transform = aim_directional_light(&node.transform);
                }
                None
            }
            NodeKind::Group => None,
            NodeKind::Mesh(mesh) => {
                let primitives = mesh
                    .primitives
                    .iter()
                    .filter(|p| !p.geometry.is_empty())
                    .map(|p| self.push_primitive(p))
                    .collect::<Result<Vec<_>, _>>()?;
                if primitives.is_empty() {
                    None
                } else {
                    Some(self.root.push(json::Mesh {
                        extensions: Default::default(),
                        extras: Default::default(),
                        name: mesh.name.clone(),
                        primitives,
                        weights: None,
                    }))
                }
            }
        };

        let mut children = Vec::new();
        for child in &node.children {
            children.push(self.push_node(child)?);
        }

        let identity = transform.is_identity();
        let extensions = light.map(|light| json::extensions::scene::Node {
            khr_lights_punctual: Some(khr_lights_punctual::KhrLightsPunctual { light }),
            ..Default::default()
        });
        Ok(self.root.push(json::Node {
            children: (!children.is_empty()).then_some(children),
            extensions,
            mesh,
            name: node.name.clone(),
            translation: (!identity).then(|| transform.position.into()),
            rotation: (!identity).then(|| json::scene::UnitQuaternion(transform.rotation_xyzw())),
            scale: (!identity).then(|| transform.scale.into()),
            ..Default::default()
        }))
    }

    /// Directional lights become `KHR_lights_punctual` lights. Ambient lights have
    /// no glTF counterpart and only keep their node.
    fn push_light(
        &mut self,
        name: Option<&str>,
        light: &Light,
    ) -> Option<json::Index<khr_lights_punctual::Light>> {
        match light.kind {
            LightKind::Ambient => {
                log::warn!("Ambient light {name:?} is exported as an empty node.");
                None
            }
            LightKind::Directional => {
                if !self.root.extensions_used.iter().any(|e| e == KHR_LIGHTS_PUNCTUAL) {
                    self.root.extensions_used.push(KHR_LIGHTS_PUNCTUAL.to_string());
                }
                Some(self.root.push(khr_lights_punctual::Light {
                    color: light.color,
                    extensions: None,
                    extras: Default::default(),
                    intensity: light.intensity,
                    name: name.map(str::to_string),
                    range: None,
                    spot: None,
                    type_: Valid(khr_lights_punctual::Type::Directional),
                }))
            }
        }
    }

    fn push_primitive(&mut self, primitive: &Primitive) -> Result<json::mesh::Primitive, ExportError> {
        use json::accessor::{ComponentType, Type};
        use json::buffer::Target;

        let geometry = &primitive.geometry;
        let mut attributes = BTreeMap::new();

        let positions = self.push_accessor(
            bytemuck::cast_slice(&geometry.positions),
            geometry.positions.len(),
            ComponentType::F32,
            Type::Vec3,
            Target::ArrayBuffer,
            geometry.bounds(),
        );
        attributes.insert(Valid(json::mesh::Semantic::Positions), positions);

        if geometry.normals.len() == geometry.positions.len() {
            let normals = self.push_accessor(
                bytemuck::cast_slice(&geometry.normals),
                geometry.normals.len(),
                ComponentType::F32,
                Type::Vec3,
                Target::ArrayBuffer,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::Normals), normals);
        }
        if geometry.tex_coords.len() == geometry.positions.len() {
            let tex_coords = self.push_accessor(
                bytemuck::cast_slice(&geometry.tex_coords),
                geometry.tex_coords.len(),
                ComponentType::F32,
                Type::Vec2,
                Target::ArrayBuffer,
                None,
            );
            attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), tex_coords);
        }

        let indices = geometry.indices.as_ref().map(|indices| {
            self.push_accessor(
                bytemuck::cast_slice(indices),
                indices.len(),
                ComponentType::U32,
                Type::Scalar,
                Target::ElementArrayBuffer,
                None,
            )
        });

        let material = self.push_material(&primitive.material)?;
        Ok(json::mesh::Primitive {
            attributes,
            extensions: Default::default(),
            extras: Default::default(),
            indices,
            material: Some(material),
            mode: Valid(json::mesh::Mode::Triangles),
            targets: None,
        })
    }

    fn push_material(&mut self, material: &Material) -> Result<json::Index<json::Material>, ExportError> {
        let base_color_texture = match &material.map {
            Some(texture) => Some(json::texture::Info {
                index: self.push_texture(texture)?,
                tex_coord: 0,
                extensions: Default::default(),
                extras: Default::default(),
            }),
            None => None,
        };
        let alpha_mode = if material.base_color[3] < 1.0 {
            json::material::AlphaMode::Blend
        } else {
            json::material::AlphaMode::Opaque
        };

        Ok(self.root.push(json::Material {
            name: material.name.clone(),
            alpha_mode: Valid(alpha_mode),
            double_sided: material.double_sided,
            pbr_metallic_roughness: json::material::PbrMetallicRoughness {
                base_color_factor: json::material::PbrBaseColorFactor(material.base_color),
                base_color_texture,
                metallic_factor: json::material::StrengthFactor(material.metallic),
                roughness_factor: json::material::StrengthFactor(material.roughness),
                ..Default::default()
            },
            ..Default::default()
        }))
    }

    /// Textures shared between materials are written once.
    fn push_texture(&mut self, texture: &Texture) -> Result<json::Index<json::Texture>, ExportError> {
        if let Some(index) = self.textures.get(&texture.id()) {
            return Ok(*index);
        }
        let image = match &texture.source {
            TextureSource::Image(image) => image,
            TextureSource::Canvas(_) | TextureSource::Video(_) => {
                let name = texture
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{:?}", texture.id()));
                return Err(ExportError::LiveTexture(name));
            }
        };
        let encoded = image.to_embeddable().map_err(ExportError::Encode)?;

        let view = self.push_view(&encoded.bytes, None);
        let source = self.root.push(json::Image {
            buffer_view: Some(view),
            mime_type: Some(json::image::MimeType(encoded.mime_type)),
            name: texture.name.clone(),
            uri: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        let sampler = self.sampler();
        let index = self.root.push(json::Texture {
            name: texture.name.clone(),
            sampler: Some(sampler),
            source,
            extensions: Default::default(),
            extras: Default::default(),
        });
        self.textures.insert(texture.id(), index);
        Ok(index)
    }

    fn sampler(&mut self) -> json::Index<json::texture::Sampler> {
        use json::texture::{MagFilter, MinFilter, Sampler, WrappingMode};

        if let Some(sampler) = self.sampler {
            return sampler;
        }
        let sampler = self.root.push(Sampler {
            mag_filter: Some(Valid(MagFilter::Linear)),
            min_filter: Some(Valid(MinFilter::LinearMipmapLinear)),
            wrap_s: Valid(WrappingMode::Repeat),
            wrap_t: Valid(WrappingMode::Repeat),
            ..Default::default()
        });
        self.sampler = Some(sampler);
        sampler
    }
}
