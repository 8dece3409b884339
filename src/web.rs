//! Browser front end: binds the page's file input and convert button to the
//! viewer and adapts DOM canvases and videos to live texture sources.
//!
//! The hosting page calls [`start`] with the formats it accepts:
//!
//! ```js
//! import init, { start } from "./pkg/model2glb.js";
//! await init();
//! start("fbx,gltf,glb");
//! ```

use anyhow::*;
use image::RgbaImage;
use wasm_bindgen::{JsCast, prelude::*};
use wasm_bindgen_futures::JsFuture;
use winit::event_loop::EventLoopProxy;

use crate::{
    config::ViewerConfig,
    data_structures::texture::{CanvasSource, VideoSource},
    error::ImportError,
    export::download::ObjectUrl,
    flow::{self, AppEvent},
    resources::{ModelFormat, import_bytes},
};

const FILE_INPUT_ID: &str = "file-input";
const CONVERT_BUTTON_ID: &str = "convert-button";

fn js_err(e: JsValue) -> Error {
    anyhow!("{e:?}")
}

/// Entry point for the converter pages. `formats` is a comma separated
/// extension list; empty or missing means every supported format.
#[wasm_bindgen]
pub fn start(formats: Option<String>) -> Result<(), JsValue> {
    std::panic::set_hook(Box::new(console_error_panic_hook));
    flow::init_logger();

    let formats = ModelFormat::parse_list(formats.as_deref().unwrap_or_default());
    let config = ViewerConfig::default().with_formats(formats);
    let accepted = config.formats.clone();
    log::info!("Accepting {accepted:?}");

    flow::run(config, move |proxy| bind_controls(proxy, accepted))
        .map_err(|e| JsValue::from_str(&format!("{e:#}")))
}

fn console_error_panic_hook(info: &std::panic::PanicHookInfo) {
    web_sys::console::error_1(&JsValue::from_str(&info.to_string()));
}

fn bind_controls(proxy: EventLoopProxy<AppEvent>, formats: Vec<ModelFormat>) -> Result<()> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| anyhow!("no document"))?;

    let file_input: web_sys::HtmlInputElement = document
        .get_element_by_id(FILE_INPUT_ID)
        .ok_or_else(|| anyhow!("missing #{FILE_INPUT_ID}"))?
        .dyn_into()
        .map_err(|_| anyhow!("#{FILE_INPUT_ID} is not an <input>"))?;
    let accept = formats
        .iter()
        .flat_map(|format| format.extensions())
        .map(|extension| format!(".{extension}"))
        .collect::<Vec<_>>()
        .join(",");
    file_input.set_accept(&accept);

    let on_change = {
        let input = file_input.clone();
        let proxy = proxy.clone();
        Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
            let Some(file) = input.files().and_then(|files| files.get(0)) else {
                return;
            };
            import_file(file, proxy.clone(), formats.clone());
        })
    };
    file_input
        .add_event_listener_with_callback("change", on_change.as_ref().unchecked_ref())
        .map_err(js_err)?;
    // listeners live as long as the page
    on_change.forget();

    let convert_button = document
        .get_element_by_id(CONVERT_BUTTON_ID)
        .ok_or_else(|| anyhow!("missing #{CONVERT_BUTTON_ID}"))?;
    let on_click = Closure::<dyn FnMut(web_sys::Event)>::new(move |_event: web_sys::Event| {
        if proxy.send_event(AppEvent::Convert).is_err() {
            log::error!("Viewer is not running");
        }
    });
    convert_button
        .add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())
        .map_err(js_err)?;
    on_click.forget();

    Ok(())
}

fn import_file(file: web_sys::File, proxy: EventLoopProxy<AppEvent>, formats: Vec<ModelFormat>) {
    let file_name = file.name();
    if proxy.send_event(AppEvent::Importing(file_name.clone())).is_err() {
        log::error!("Viewer is not running");
        return;
    }

    wasm_bindgen_futures::spawn_local(async move {
        let result = match read_file(&file).await {
            Result::Ok(bytes) => import_bytes(&file_name, bytes, &formats).await,
            Err(source) => Err(ImportError::Read {
                file_name: file_name.clone(),
                source,
            }),
        };
        if proxy
            .send_event(AppEvent::Imported { file_name, result })
            .is_err()
        {
            log::error!("Viewer stopped before the import finished");
        }
    });
}

/// Fetch the file contents through an object URL that is revoked once read.
async fn read_file(file: &web_sys::File) -> Result<Vec<u8>> {
    let url = ObjectUrl::new(file)?;
    let window = web_sys::window().ok_or_else(|| anyhow!("no window"))?;
    let response: web_sys::Response = JsFuture::from(window.fetch_with_str(url.as_str()))
        .await
        .map_err(js_err)?
        .dyn_into()
        .map_err(|_| anyhow!("fetch did not return a Response"))?;
    let buffer = JsFuture::from(response.array_buffer().map_err(js_err)?)
        .await
        .map_err(js_err)?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

fn create_canvas(width: u32, height: u32) -> Result<(web_sys::HtmlCanvasElement, web_sys::CanvasRenderingContext2d)> {
    let document = web_sys::window()
        .and_then(|window| window.document())
        .ok_or_else(|| anyhow!("no document"))?;
    let canvas: web_sys::HtmlCanvasElement = document
        .create_element("canvas")
        .map_err(js_err)?
        .dyn_into()
        .map_err(|_| anyhow!("<canvas> is not a canvas element"))?;
    canvas.set_width(width);
    canvas.set_height(height);
    let context = context_2d(&canvas)?;
    Ok((canvas, context))
}

fn context_2d(canvas: &web_sys::HtmlCanvasElement) -> Result<web_sys::CanvasRenderingContext2d> {
    canvas
        .get_context("2d")
        .map_err(js_err)?
        .ok_or_else(|| anyhow!("canvas has no 2d context"))?
        .dyn_into()
        .map_err(|_| anyhow!("unexpected 2d context type"))
}

fn read_image_data(context: &web_sys::CanvasRenderingContext2d, width: u32, height: u32) -> Result<RgbaImage> {
    let data = context
        .get_image_data(0.0, 0.0, width as f64, height as f64)
        .map_err(js_err)?
        .data();
    RgbaImage::from_raw(width, height, data.0).ok_or_else(|| anyhow!("short image data"))
}

/// A `<canvas>` element used as a texture source.
#[derive(Debug, Clone)]
pub struct DomCanvas(pub web_sys::HtmlCanvasElement);

impl CanvasSource for DomCanvas {
    fn size(&self) -> (u32, u32) {
        (self.0.width(), self.0.height())
    }

    fn read_pixels(&self) -> Result<RgbaImage> {
        let (width, height) = self.size();
        ensure!(width > 0 && height > 0, "canvas is empty");
        read_image_data(&context_2d(&self.0)?, width, height)
    }
}

/// A `<video>` element used as a texture source.
#[derive(Debug, Clone)]
pub struct DomVideo(pub web_sys::HtmlVideoElement);

impl VideoSource for DomVideo {
    fn native_size(&self) -> (u32, u32) {
        (self.0.video_width(), self.0.video_height())
    }

    fn draw_frame(&self, target: &mut RgbaImage) -> Result<()> {
        let (width, height) = target.dimensions();
        let (_canvas, context) = create_canvas(width, height)?;
        context
            .draw_image_with_html_video_element_and_dw_and_dh(
                &self.0,
                0.0,
                0.0,
                width as f64,
                height as f64,
            )
            .map_err(js_err)?;
        *target = read_image_data(&context, width, height)?;
        Ok(())
    }
}
