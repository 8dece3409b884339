//! Draws a [`Scene`] every frame.
//!
//! GPU buffers are derived from the scene and rebuilt whenever
//! [`Scene::revision`] moves. Textures are cached by [`TextureId`]; a texture
//! flagged `needs_update` is uploaded again and its flag cleared. Live canvas
//! and video textures are refreshed on every frame so the viewer shows what
//! the source currently displays.

use std::{collections::HashMap, sync::Arc};

use cgmath::InnerSpace;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::{
    camera::PerspectiveCamera,
    context::Context,
    data_structures::{
        mesh::Primitive,
        scene_graph::{LightKind, NodeKind, Scene},
        texture::{
            CanvasSource, GpuTexture, Texture, TextureId, TextureSource, VideoSource,
        },
        transform::Transform,
    },
    pipelines::basic::{
        DrawUniform, GlobalsUniform, MeshVertex, ScenePipelines, draw_layout, globals_layout,
        mk_scene_pipelines,
    },
};

struct DrawCall {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    bind_group: wgpu::BindGroup,
    double_sided: bool,
}

enum LiveSource {
    Canvas(Arc<dyn CanvasSource>),
    Video(Arc<dyn VideoSource>),
}

pub struct SceneRenderer {
    pipelines: ScenePipelines,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    draw_layout: wgpu::BindGroupLayout,
    white: GpuTexture,
    textures: HashMap<TextureId, GpuTexture>,
    live: HashMap<TextureId, LiveSource>,
    draws: Vec<DrawCall>,
    revision: Option<u64>,
}

impl SceneRenderer {
    pub fn new(ctx: &Context) -> Self {
        let globals_layout = globals_layout(&ctx.device);
        let draw_layout = draw_layout(&ctx.device);
        let pipelines = mk_scene_pipelines(&ctx.device, &ctx.config, &globals_layout, &draw_layout);

        let globals_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Globals Buffer"),
            size: std::mem::size_of::<GlobalsUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &globals_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
            label: Some("globals_bind_group"),
        });

        Self {
            pipelines,
            globals_buffer,
            globals_bind_group,
            draw_layout,
            white: GpuTexture::create_white(&ctx.device, &ctx.queue),
            textures: HashMap::new(),
            live: HashMap::new(),
            draws: Vec::new(),
            revision: None,
        }
    }

    /// Bring GPU state up to date with `scene`. Call once per frame before [`SceneRenderer::draw`].
    pub fn prepare(&mut self, ctx: &Context, scene: &mut Scene, camera: &PerspectiveCamera) {
        ctx.queue.write_buffer(
            &self.globals_buffer,
            0,
            bytemuck::cast_slice(&[globals_uniform(scene, camera)]),
        );

        if self.revision != Some(scene.revision()) {
            let uploaded = self.rebuild(ctx, scene);
            if uploaded > 0 {
                scene.clear_texture_updates();
            }
            self.revision = Some(scene.revision());
        }

        self.refresh_live_textures(&ctx.queue);
    }

    pub fn draw<'pass>(&'pass self, render_pass: &mut wgpu::RenderPass<'pass>) {
        render_pass.set_bind_group(0, &self.globals_bind_group, &[]);
        for draw in &self.draws {
            let pipeline = if draw.double_sided {
                &self.pipelines.double_sided
            } else {
                &self.pipelines.culled
            };
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(1, &draw.bind_group, &[]);
            render_pass.set_vertex_buffer(0, draw.vertex_buffer.slice(..));
            render_pass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..draw.index_count, 0, 0..1);
        }
    }

    /// Returns the number of textures uploaded.
    fn rebuild(&mut self, ctx: &Context, scene: &Scene) -> usize {
        let mut uploaded = 0;
        let mut seen = Vec::new();
        let mut draws = Vec::new();

        scene.traverse(&mut |node, world| {
            let NodeKind::Mesh(mesh) = &node.kind else {
                return;
            };
            for primitive in mesh.primitives.iter().filter(|p| !p.geometry.is_empty()) {
                if let Some(texture) = &primitive.material.map
                    && !seen.contains(&texture.id())
                {
                    seen.push(texture.id());
                    if texture.needs_update || !self.textures.contains_key(&texture.id()) {
                        self.upload_texture(ctx, texture);
                        uploaded += 1;
                    }
                }
                draws.push(self.mk_draw_call(ctx, primitive, world));
            }
        });

        // drop textures that left the scene
        self.textures.retain(|id, _| seen.contains(id));
        self.live.retain(|id, _| seen.contains(id));
        log::debug!(
            "Rebuilt {} draw calls, uploaded {uploaded} textures",
            draws.len()
        );
        self.draws = draws;
        uploaded
    }

    fn upload_texture(&mut self, ctx: &Context, texture: &Texture) {
        let label = texture.name.as_deref();
        let pixels = match &texture.source {
            TextureSource::Image(image) => {
                self.live.remove(&texture.id());
                let gpu_texture = GpuTexture::from_image(&ctx.device, &ctx.queue, image, label);
                self.textures.insert(texture.id(), gpu_texture);
                return;
            }
            TextureSource::Canvas(canvas) => {
                self.live
                    .insert(texture.id(), LiveSource::Canvas(canvas.clone()));
                canvas.read_pixels()
            }
            TextureSource::Video(video) => {
                self.live.insert(texture.id(), LiveSource::Video(video.clone()));
                let (width, height) = video.native_size();
                let mut frame = RgbaImage::new(width, height);
                video.draw_frame(&mut frame).map(|_| frame)
            }
        };
        let pixels = pixels.unwrap_or_else(|e| {
            log::warn!("Could not read live texture {label:?}: {e:#}");
            RgbaImage::new(1, 1)
        });
        let gpu_texture = GpuTexture::from_rgba(&ctx.device, &ctx.queue, &pixels, label);
        self.textures.insert(texture.id(), gpu_texture);
    }

    fn refresh_live_textures(&self, queue: &wgpu::Queue) {
        for (id, source) in &self.live {
            let Some(gpu_texture) = self.textures.get(id) else {
                continue;
            };
            let pixels = match source {
                LiveSource::Canvas(canvas) => canvas.read_pixels(),
                LiveSource::Video(video) => {
                    let (width, height) = gpu_texture.size();
                    let mut frame = RgbaImage::new(width, height);
                    video.draw_frame(&mut frame).map(|_| frame)
                }
            };
            // size changes are picked up on the next rebuild
            if let Ok(pixels) = pixels {
                gpu_texture.write_rgba(queue, &pixels);
            }
        }
    }

    fn mk_draw_call(&self, ctx: &Context, primitive: &Primitive, world: &Transform) -> DrawCall {
        let vertices = MeshVertex::from_geometry(&primitive.geometry);
        let indices = primitive.geometry.triangle_indices();

        let vertex_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Mesh Index Buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });

        let model = world.to_matrix();
        let normal = cgmath::Matrix4::from(Transform::normal_matrix(&model));
        let uniform = DrawUniform {
            model: model.into(),
            normal: normal.into(),
            base_color: primitive.material.base_color,
        };
        let uniform_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw Uniform Buffer"),
                contents: bytemuck::cast_slice(&[uniform]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

        let texture = primitive
            .material
            .map
            .as_ref()
            .and_then(|texture| self.textures.get(&texture.id()))
            .unwrap_or(&self.white);
        let sampler = texture.sampler.as_ref().or(self.white.sampler.as_ref());
        let mut entries = vec![
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
        ];
        if let Some(sampler) = sampler {
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            });
        }
        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.draw_layout,
            entries: &entries,
            label: Some("draw_bind_group"),
        });

        DrawCall {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            bind_group,
            double_sided: primitive.material.double_sided,
        }
    }
}

/// Camera and light state of the frame. Without a directional light only the ambient term remains.
pub fn globals_uniform(scene: &Scene, camera: &PerspectiveCamera) -> GlobalsUniform {
    let mut ambient = [0.0f32; 4];
    let mut light_dir = [0.0, 1.0, 0.0, 0.0];
    let mut light_color = [0.0f32; 4];

    for (light, world) in scene.lights() {
        let rgb = light.color.map(|c| c * light.intensity);
        match light.kind {
            LightKind::Ambient => {
                for i in 0..3 {
                    ambient[i] += rgb[i];
                }
            }
            LightKind::Directional => {
                let direction = if world.position.magnitude2() > 0.0 {
                    world.position.normalize()
                } else {
                    cgmath::Vector3::unit_y()
                };
                light_dir = direction.extend(0.0).into();
                light_color = [rgb[0], rgb[1], rgb[2], 1.0];
            }
        }
    }

    GlobalsUniform {
        view_proj: camera.view_proj().into(),
        ambient,
        light_dir,
        light_color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CameraConfig, LightingConfig};

    #[test]
    fn should_feed_startup_lights_into_globals() {
        let scene = Scene::with_default_lights(&LightingConfig::default());
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 4, 3);
        let globals = globals_uniform(&scene, &camera);

        assert!((globals.ambient[0] - 0.8 * 0.4).abs() < 1e-6);
        assert!((globals.light_color[1] - 0.8).abs() < 1e-6);
        let dir = cgmath::Vector3::new(globals.light_dir[0], globals.light_dir[1], globals.light_dir[2]);
        assert!((dir.magnitude() - 1.0).abs() < 1e-6);
        assert!(dir.z.abs() < 1e-6);
    }
}
