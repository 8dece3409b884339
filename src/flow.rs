//! Application event loop.
//!
//! [`App`] owns the [`Scene`] for the lifetime of the window and drives it
//! with winit's [`ApplicationHandler`]:
//!
//! - every `RedrawRequested` renders the scene and requests the next frame,
//! - imports run off the event loop and come back as [`AppEvent::Imported`],
//! - a convert request snapshots live textures, decodes them off the event
//!   loop and exports once [`AppEvent::TexturesDecoded`] arrives.
//!
//! The scene is only ever touched on the event loop thread.

use std::{iter, sync::Arc};

use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop, EventLoopProxy},
    keyboard::{Key, NamedKey},
    window::Window,
};

use crate::{
    camera::PerspectiveCamera,
    config::ViewerConfig,
    context::Context,
    data_structures::{
        scene_graph::{Node, Scene},
        texture::TextureId,
    },
    error::{ImportError, report},
    export::{DownloadSink, export_scene, save_export},
    normalize::{Replacement, apply_replacements, decode_snapshots, snapshot_live_textures},
    render::SceneRenderer,
    status::{LogStatus, Status, StatusSink},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Messages delivered to the event loop through an [`EventLoopProxy`].
pub enum AppEvent {
    /// GPU setup finished (wasm only; native setup blocks in `resumed`).
    Initialized(HostState),
    /// Read and import a file from disk.
    #[cfg(not(target_arch = "wasm32"))]
    ImportPath(std::path::PathBuf),
    Importing(String),
    Imported {
        file_name: String,
        result: Result<Node, ImportError>,
    },
    /// Normalize and export the scene.
    Convert,
    TexturesDecoded {
        replacements: Vec<Replacement>,
        failed: Vec<(TextureId, String)>,
    },
    Exit,
}

impl std::fmt::Debug for AppEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(_) => f.write_str("Initialized"),
            #[cfg(not(target_arch = "wasm32"))]
            Self::ImportPath(path) => f.debug_tuple("ImportPath").field(path).finish(),
            Self::Importing(file_name) => f.debug_tuple("Importing").field(file_name).finish(),
            Self::Imported { file_name, result } => f
                .debug_struct("Imported")
                .field("file_name", file_name)
                .field("ok", &result.is_ok())
                .finish(),
            Self::Convert => f.write_str("Convert"),
            Self::TexturesDecoded {
                replacements,
                failed,
            } => f
                .debug_struct("TexturesDecoded")
                .field("replacements", &replacements.len())
                .field("failed", &failed.len())
                .finish(),
            Self::Exit => f.write_str("Exit"),
        }
    }
}

/// GPU resources plus the camera looking at the scene.
pub struct HostState {
    pub(crate) ctx: Context,
    renderer: SceneRenderer,
    camera: PerspectiveCamera,
    is_surface_configured: bool,
}

impl HostState {
    async fn new(window: Arc<Window>, config: &ViewerConfig) -> anyhow::Result<Self> {
        let ctx = Context::new(window, config.clear_colour).await?;
        let (width, height) = ctx.size();
        let camera = PerspectiveCamera::new(&config.camera, width, height);
        let renderer = SceneRenderer::new(&ctx);
        Ok(Self {
            ctx,
            renderer,
            camera,
            is_surface_configured: false,
        })
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.ctx.resize(width, height) {
            self.camera.resize(width, height);
            self.is_surface_configured = true;
        }
    }

    fn render(&mut self, scene: &mut Scene) -> Result<(), wgpu::SurfaceError> {
        self.ctx.window.request_redraw();

        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        self.renderer.prepare(&self.ctx, scene, &self.camera);

        let output = self.ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.ctx.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                ..Default::default()
            });
            self.renderer.draw(&mut render_pass);
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}

pub struct App {
    config: ViewerConfig,
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    proxy: EventLoopProxy<AppEvent>,
    scene: Scene,
    state: Option<HostState>,
    status: Box<dyn StatusSink>,
    downloads: Box<dyn DownloadSink>,
}

impl App {
    fn new(event_loop: &EventLoop<AppEvent>, config: ViewerConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        let scene = Scene::with_default_lights(&config.lighting);

        #[cfg(not(target_arch = "wasm32"))]
        let downloads: Box<dyn DownloadSink> = Box::new(
            crate::export::download::DirectorySink::new(config.output_dir.clone()),
        );
        #[cfg(target_arch = "wasm32")]
        let downloads: Box<dyn DownloadSink> = Box::new(crate::export::download::BrowserDownload);

        #[cfg(not(target_arch = "wasm32"))]
        let status: Box<dyn StatusSink> = Box::new(LogStatus);
        #[cfg(target_arch = "wasm32")]
        let status: Box<dyn StatusSink> = match web_sys::window().and_then(|w| w.document()) {
            Some(document) => Box::new(crate::status::DomStatus::from_document(&document)),
            None => Box::new(LogStatus),
        };

        Ok(Self {
            config,
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime: tokio::runtime::Runtime::new()?,
            proxy,
            scene,
            state: None,
            status,
            downloads,
        })
    }

    fn show(&self, status: Status) {
        self.status.show(&status);
    }

    fn on_imported(&mut self, file_name: String, result: Result<Node, ImportError>) {
        match result {
            Ok(node) => {
                let meshes = node.mesh_count();
                self.scene.add(node);
                self.show(Status::Imported { file_name, meshes });
            }
            Err(e) => self.show(Status::from(&e)),
        }
    }

    /// Phase one of the export runs here, the decode is handed off.
    fn start_convert(&self) {
        self.show(Status::Converting);
        let (snapshots, mut failed) = snapshot_live_textures(&self.scene);
        let proxy = self.proxy.clone();
        let decode = async move {
            let (replacements, decode_failed) = decode_snapshots(snapshots).await;
            failed.extend(decode_failed);
            if let Err(e) = proxy.send_event(AppEvent::TexturesDecoded {
                replacements,
                failed,
            }) {
                log::error!("Event loop closed before textures were decoded: {e}");
            }
        };

        #[cfg(not(target_arch = "wasm32"))]
        self.async_runtime.spawn(decode);
        #[cfg(target_arch = "wasm32")]
        wasm_bindgen_futures::spawn_local(decode);
    }

    fn finish_convert(&mut self, replacements: Vec<Replacement>, failed: Vec<(TextureId, String)>) {
        let replaced = apply_replacements(&mut self.scene, replacements);
        if replaced > 0 {
            log::info!("Normalized {replaced} live textures.");
        }
        for (id, reason) in &failed {
            log::warn!("Texture {id:?} keeps its live source: {reason}");
        }

        let saved = export_scene(&self.scene, &self.config.export)
            .and_then(|result| save_export(&result, self.downloads.as_ref()));
        match saved {
            Ok(file_name) => self.show(Status::Saved(file_name.to_string())),
            Err(e) => {
                log::error!("Export failed: {}", report(&e));
                self.show(Status::from(&e));
            }
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn import_path(&self, path: std::path::PathBuf) {
        let file_name = crate::resources::display_name(&path);
        self.show(Status::Importing(file_name.clone()));
        let formats = self.config.formats.clone();
        let proxy = self.proxy.clone();
        self.async_runtime.spawn_blocking(move || {
            let result =
                futures::executor::block_on(crate::resources::import_path(&path, &formats));
            if let Err(e) = proxy.send_event(AppEvent::Imported { file_name, result }) {
                log::error!("Event loop closed before import finished: {e}");
            }
        });
    }
}

impl ApplicationHandler<AppEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title("model2glb");

        #[cfg(target_arch = "wasm32")]
        {
            use wasm_bindgen::JsCast;
            use winit::platform::web::WindowAttributesExtWebSys;

            const CANVAS_ID: &str = "canvas";

            let canvas = web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.get_element_by_id(CANVAS_ID));
            match canvas {
                Some(canvas) => {
                    window_attributes = window_attributes.with_canvas(Some(canvas.unchecked_into()));
                }
                // winit creates its own canvas; it still has to be attached to the page
                None => window_attributes = window_attributes.with_append(true),
            }
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Could not create window: {e}");
                event_loop.exit();
                return;
            }
        };

        let config = self.config.clone();
        let init_future = async move { HostState::new(window, &config).await };

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(mut state) => {
                    let size = state.ctx.window.inner_size();
                    state.resize(size.width, size.height);
                    self.status = Box::new(crate::status::WindowTitleStatus {
                        window: state.ctx.window.clone(),
                    });
                    state.ctx.window.request_redraw();
                    self.state = Some(state);
                    self.show(Status::Ready);
                }
                Err(e) => {
                    log::error!("Cannot create the render context: {e:#}");
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match init_future.await {
                    Ok(state) => {
                        if proxy.send_event(AppEvent::Initialized(state)).is_err() {
                            log::error!("Event loop closed during initialization");
                        }
                    }
                    Err(e) => log::error!("Cannot create the render context: {e:#}"),
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: AppEvent) {
        log::debug!("{event:?}");
        match event {
            AppEvent::Initialized(mut state) => {
                // This is the message from our wasm `spawn_local`
                let size = state.ctx.window.inner_size();
                state.resize(size.width, size.height);
                state.ctx.window.request_redraw();
                self.state = Some(state);
                self.show(Status::Ready);
            }
            #[cfg(not(target_arch = "wasm32"))]
            AppEvent::ImportPath(path) => self.import_path(path),
            AppEvent::Importing(file_name) => self.show(Status::Importing(file_name)),
            AppEvent::Imported { file_name, result } => self.on_imported(file_name, result),
            AppEvent::Convert => self.start_convert(),
            AppEvent::TexturesDecoded {
                replacements,
                failed,
            } => self.finish_convert(replacements, failed),
            AppEvent::Exit => event_loop.exit(),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            #[cfg(not(target_arch = "wasm32"))]
            WindowEvent::DroppedFile(path) => self.import_path(path),
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                let convert = match &event.logical_key {
                    Key::Named(NamedKey::Enter) => true,
                    Key::Character(c) => c.eq_ignore_ascii_case("c"),
                    _ => false,
                };
                if convert {
                    self.start_convert();
                }
            }
            WindowEvent::Resized(size) => {
                if let Some(state) = &mut self.state {
                    state.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(state) = &mut self.state else {
                    return;
                };
                match state.render(&mut self.scene) {
                    Ok(()) => {}
                    // Reconfigure the surface if it's lost or outdated
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = state.ctx.window.inner_size();
                        state.resize(size.width, size.height);
                    }
                    Err(e) => {
                        log::error!("Unable to render {}", e);
                    }
                }
            }
            _ => {}
        }
    }
}

/// Open the viewer and block until its window closes.
///
/// `setup` receives a proxy before the loop starts; use it to queue initial
/// imports or to wire up external controls such as DOM elements.
pub fn run(
    config: ViewerConfig,
    setup: impl FnOnce(EventLoopProxy<AppEvent>) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    init_logger();

    let event_loop: EventLoop<AppEvent> = EventLoop::with_user_event().build()?;
    setup(event_loop.create_proxy())?;

    let mut app = App::new(&event_loop, config)?;
    event_loop.run_app(&mut app)?;

    Ok(())
}

/// `env_logger` natively, the browser console on the web. Only the first call has an effect.
pub fn init_logger() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        #[cfg(not(target_arch = "wasm32"))]
        {
            if let Err(e) = env_logger::try_init() {
                println!("Warning: Could not initialize logger: {}", e);
            };
        }

        #[cfg(target_arch = "wasm32")]
        {
            if console_log::init_with_level(log::Level::Info).is_err() {
                web_sys::console::warn_1(&JsValue::from_str("logger already initialized"));
            }
        }
    });
}
