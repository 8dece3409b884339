//! Scene graph and hierarchical scene organization.
//!
//! A [`Scene`] owns an ordered list of root [`Node`]s. Nodes are groups,
//! meshes or lights and carry a local [`Transform`]. Importers produce one
//! root node per file which is handed over to the scene in one piece; the
//! texture normalizer and the exporter walk the tree in place.
//!
//! Every mutation made through the scene bumps [`Scene::revision`], which the
//! renderer uses to decide when GPU buffers are stale.

use crate::{
    config::LightingConfig,
    data_structures::{
        mesh::{Mesh, Primitive},
        texture::Texture,
        transform::Transform,
    },
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Ambient,
    /// Shines from the node position towards the origin.
    Directional,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Light {
    /// Colour from a `0xRRGGBB` hex value.
    pub fn from_hex(kind: LightKind, hex: u32, intensity: f32) -> Self {
        let channel = |shift: u32| ((hex >> shift) & 0xff) as f32 / 255.0;
        Self {
            kind,
            color: [channel(16), channel(8), channel(0)],
            intensity,
        }
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Light(Light),
}

/// A node in the scene graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: Option<String>,
    pub transform: Transform,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    pub fn group(name: Option<String>, children: Vec<Node>) -> Self {
        Self {
            name,
            transform: Transform::default(),
            kind: NodeKind::Group,
            children,
        }
    }

    pub fn mesh(mesh: Mesh) -> Self {
        Self {
            name: mesh.name.clone(),
            transform: Transform::default(),
            kind: NodeKind::Mesh(mesh),
            children: Vec::new(),
        }
    }

    pub fn light(name: &str, light: Light, transform: Transform) -> Self {
        Self {
            name: Some(name.to_string()),
            transform,
            kind: NodeKind::Light(light),
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn add_child(&mut self, child: Node) {
        self.children.push(child);
    }

    pub fn as_mesh(&self) -> Option<&Mesh> {
        match &self.kind {
            NodeKind::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&Light> {
        match &self.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        }
    }

    /// Depth-first, parent before children. `f` receives the world transform of each node.
    pub fn traverse<'a>(&'a self, parent: &Transform, f: &mut dyn FnMut(&'a Node, &Transform)) {
        let world = parent * &self.transform;
        f(self, &world);
        for child in &self.children {
            child.traverse(&world, f);
        }
    }

    pub fn traverse_mut(&mut self, f: &mut dyn FnMut(&mut Node)) {
        f(self);
        for child in self.children.iter_mut() {
            child.traverse_mut(f);
        }
    }

    /// Number of mesh nodes in this subtree, including `self`.
    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.traverse(&Transform::default(), &mut |node, _| {
            if node.as_mesh().is_some() {
                count += 1;
            }
        });
        count
    }

    /// Whether the subtree contains anything that can be drawn or exported.
    pub fn has_geometry(&self) -> bool {
        let mut found = false;
        self.traverse(&Transform::default(), &mut |node, _| {
            if let Some(mesh) = node.as_mesh() {
                found |= mesh.primitives.iter().any(|p| !p.geometry.is_empty());
            }
        });
        found
    }
}

/// The single long-lived scene shared by importer, renderer, normalizer and exporter.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    children: Vec<Node>,
    revision: u64,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scene holding the permanent ambient and directional startup lights.
    pub fn with_default_lights(lighting: &LightingConfig) -> Self {
        let mut scene = Self::new();
        scene.add(Node::light(
            "AmbientLight",
            Light::from_hex(
                LightKind::Ambient,
                lighting.ambient_color,
                lighting.ambient_intensity,
            ),
            Transform::default(),
        ));
        scene.add(Node::light(
            "DirectionalLight",
            Light::from_hex(
                LightKind::Directional,
                lighting.directional_color,
                lighting.directional_intensity,
            ),
            Transform::from(lighting.directional_direction()),
        ));
        scene
    }

    /// Append a root node. Nodes are never replaced or deduplicated.
    pub fn add(&mut self, node: Node) {
        self.children.push(node);
        self.touch();
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Mark the scene as changed for consumers that cache derived data.
    pub fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    /// Visit every node with its world transform.
    pub fn traverse<'a>(&'a self, f: &mut dyn FnMut(&'a Node, &Transform)) {
        let root = Transform::default();
        for child in &self.children {
            child.traverse(&root, f);
        }
    }

    /// Visit every node mutably. Counts as a modification.
    pub fn traverse_mut(&mut self, f: &mut dyn FnMut(&mut Node)) {
        for child in self.children.iter_mut() {
            child.traverse_mut(f);
        }
        self.touch();
    }

    pub fn lights(&self) -> Vec<(Light, Transform)> {
        let mut lights = Vec::new();
        self.traverse(&mut |node, world| {
            if let Some(light) = node.as_light() {
                lights.push((*light, *world));
            }
        });
        lights
    }

    pub fn mesh_count(&self) -> usize {
        self.children.iter().map(Node::mesh_count).sum()
    }

    /// Every primitive that has a texture map, with read access.
    pub fn textures(&self) -> Vec<&Texture> {
        let mut textures = Vec::new();
        self.traverse(&mut |node, _| {
            if let Some(mesh) = node.as_mesh() {
                textures.extend(mesh.primitives.iter().filter_map(|p| p.material.map.as_ref()));
            }
        });
        textures
    }

    /// Apply `f` to every texture map in the scene.
    pub fn for_each_texture_mut(&mut self, f: &mut dyn FnMut(&mut Texture)) {
        self.for_each_primitive_mut(&mut |primitive| {
            if let Some(texture) = primitive.material.map.as_mut() {
                f(texture);
            }
        });
    }

    pub fn for_each_primitive_mut(&mut self, f: &mut dyn FnMut(&mut Primitive)) {
        self.visit_primitives(f);
        self.touch();
    }

    /// Mark every texture as uploaded. Bookkeeping for the renderer, so the
    /// revision is left alone.
    pub fn clear_texture_updates(&mut self) {
        self.visit_primitives(&mut |primitive| {
            if let Some(texture) = primitive.material.map.as_mut() {
                texture.needs_update = false;
            }
        });
    }

    fn visit_primitives(&mut self, f: &mut dyn FnMut(&mut Primitive)) {
        for child in self.children.iter_mut() {
            child.traverse_mut(&mut |node| {
                if let NodeKind::Mesh(mesh) = &mut node.kind {
                    mesh.primitives.iter_mut().for_each(|primitive| f(primitive));
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::mesh::{Geometry, Material};

    fn triangle_mesh(name: &str) -> Node {
        Node::mesh(Mesh::new(
            Some(name.to_string()),
            Geometry {
                positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                ..Default::default()
            },
            Material::default(),
        ))
    }

    #[test]
    fn should_start_with_two_permanent_lights() {
        let scene = Scene::with_default_lights(&LightingConfig::default());
        assert_eq!(scene.child_count(), 2);
        assert_eq!(scene.mesh_count(), 0);

        let lights = scene.lights();
        assert_eq!(lights[0].0.kind, LightKind::Ambient);
        assert!((lights[0].0.intensity - 0.4).abs() < f32::EPSILON);
        assert!((lights[0].0.color[0] - 0.8).abs() < 1e-6);
        assert_eq!(lights[1].0.kind, LightKind::Directional);
        let direction = lights[1].1.position;
        assert!((direction.x - direction.y).abs() < 1e-6);
        assert!((direction.x - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn should_accumulate_root_nodes_and_bump_revision() {
        let mut scene = Scene::new();
        let before = scene.revision();
        scene.add(triangle_mesh("a"));
        scene.add(triangle_mesh("a"));
        assert_eq!(scene.child_count(), 2);
        assert_eq!(scene.mesh_count(), 2);
        assert!(scene.revision() > before);
    }

    #[test]
    fn should_clear_texture_updates_without_bumping_revision() {
        use crate::data_structures::texture::{StaticImage, Texture};

        let mut node = triangle_mesh("textured");
        if let NodeKind::Mesh(mesh) = &mut node.kind {
            mesh.primitives[0].material.map = Some(Texture::from_image(
                None,
                StaticImage::from_pixels(image::RgbaImage::new(1, 1)),
            ));
        }
        let mut scene = Scene::new();
        scene.add(node);
        assert!(scene.textures()[0].needs_update);

        let revision = scene.revision();
        scene.clear_texture_updates();
        assert!(!scene.textures()[0].needs_update);
        assert_eq!(scene.revision(), revision);

        scene.for_each_texture_mut(&mut |texture| texture.needs_update = true);
        assert!(scene.revision() > revision);
    }

    #[test]
    fn should_pass_world_transforms_down_the_tree() {
        let mut parent = Node::group(None, vec![]).with_transform(Transform::from(
            cgmath::Vector3::new(1.0, 2.0, 3.0),
        ));
        parent.add_child(triangle_mesh("child"));
        let mut scene = Scene::new();
        scene.add(parent);

        let mut positions = Vec::new();
        scene.traverse(&mut |node, world| {
            if node.as_mesh().is_some() {
                positions.push(world.position);
            }
        });
        assert_eq!(positions, vec![cgmath::Vector3::new(1.0, 2.0, 3.0)]);
    }
}
