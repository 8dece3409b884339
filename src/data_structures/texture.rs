//! Textures: CPU side pixel sources and their GPU counterparts.
//!
//! A material's [`Texture`] points at a [`TextureSource`]. Sources are either
//! static decoded images or live surfaces (canvases and videos) whose pixels
//! change over time. Only static images can be serialized, so live sources are
//! snapshotted by [`crate::normalize`] before export.
//!
//! [`GpuTexture`] wraps the WGPU resources the renderer binds for a texture.

use std::{
    fmt::Debug,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use anyhow::*;
use base64::Engine;
use image::{ImageFormat, RgbaImage};

/// `Send + Sync` natively, nothing on wasm32 where DOM handles are neither.
#[cfg(not(target_arch = "wasm32"))]
pub trait MaybeSendSync: Send + Sync {}
#[cfg(not(target_arch = "wasm32"))]
impl<T: Send + Sync> MaybeSendSync for T {}

#[cfg(target_arch = "wasm32")]
pub trait MaybeSendSync {}
#[cfg(target_arch = "wasm32")]
impl<T> MaybeSendSync for T {}

/// A live 2D surface whose current contents can be read back.
pub trait CanvasSource: MaybeSendSync + Debug {
    fn size(&self) -> (u32, u32);

    /// Copy of the pixels as they are right now.
    fn read_pixels(&self) -> Result<RgbaImage>;
}

/// A playing video. Frames are pulled by drawing onto a caller provided canvas.
pub trait VideoSource: MaybeSendSync + Debug {
    /// Intrinsic frame size (`videoWidth` x `videoHeight` in the browser).
    fn native_size(&self) -> (u32, u32);

    /// Draw the current frame scaled to fill `canvas`.
    fn draw_frame(&self, canvas: &mut RgbaImage) -> Result<()>;
}

/// In-memory canvas that can be drawn into while a texture references it.
#[derive(Debug)]
pub struct Canvas {
    pixels: std::sync::RwLock<RgbaImage>,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_image(RgbaImage::new(width, height))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            pixels: std::sync::RwLock::new(image),
        }
    }

    /// Mutate the canvas contents in place.
    pub fn draw(&self, f: impl FnOnce(&mut RgbaImage)) -> Result<()> {
        let mut pixels = self
            .pixels
            .write()
            .map_err(|_| anyhow!("canvas lock poisoned"))?;
        f(&mut pixels);
        Ok(())
    }
}

impl CanvasSource for Canvas {
    fn size(&self) -> (u32, u32) {
        self.pixels
            .read()
            .map(|pixels| pixels.dimensions())
            .unwrap_or((0, 0))
    }

    fn read_pixels(&self) -> Result<RgbaImage> {
        self.pixels
            .read()
            .map(|pixels| pixels.clone())
            .map_err(|_| anyhow!("canvas lock poisoned"))
    }
}

/// Encoded form of an image together with its MIME type.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// A decoded, immutable image. Cloning shares the pixel buffer.
#[derive(Clone, Debug)]
pub struct StaticImage {
    pixels: Arc<RgbaImage>,
    encoded: Option<Arc<EncodedImage>>,
}

impl StaticImage {
    pub fn from_pixels(pixels: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(pixels),
            encoded: None,
        }
    }

    /// Decode image file contents (PNG, JPEG, ...).
    ///
    /// * `mime_type` is an optional hint such as `image/png`. If None, the format is guessed.
    pub fn from_bytes(bytes: &[u8], mime_type: Option<&str>) -> Result<Self> {
        let format = mime_type
            .and_then(|mt| mt.split('/').last())
            .and_then(ImageFormat::from_extension);
        let img = match format {
            Some(format) => image::load_from_memory_with_format(bytes, format)?,
            None => image::load_from_memory(bytes)?,
        };
        let mime_type = match format {
            Some(format) => format.to_mime_type().to_string(),
            None => image::guess_format(bytes)?.to_mime_type().to_string(),
        };
        Ok(Self {
            pixels: Arc::new(img.to_rgba8()),
            encoded: Some(Arc::new(EncodedImage {
                mime_type,
                bytes: bytes.to_vec(),
            })),
        })
    }

    /// Decode a base64 `data:` URL, the backing store of snapshotted live textures.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| anyhow!("not a data url"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| anyhow!("data url without payload"))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| anyhow!("only base64 data urls are supported"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .context("invalid base64 in data url")?;
        Self::from_bytes(&bytes, Some(mime_type))
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn encoded(&self) -> Option<&EncodedImage> {
        self.encoded.as_deref()
    }

    /// PNG or JPEG bytes ready to embed in a glTF file. Other formats are re-encoded as PNG.
    pub fn to_embeddable(&self) -> Result<EncodedImage> {
        match self.encoded() {
            Some(encoded) if encoded.mime_type == "image/png" || encoded.mime_type == "image/jpeg" => {
                Ok(encoded.clone())
            }
            _ => Ok(EncodedImage {
                mime_type: "image/png".to_string(),
                bytes: encode_png(&self.pixels)?,
            }),
        }
    }
}

pub fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    pixels.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

/// `data:image/png;base64,...` for the given pixels, like `canvas.toDataURL()`.
pub fn to_png_data_url(pixels: &RgbaImage) -> Result<String> {
    let png = encode_png(pixels)?;
    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Where a texture gets its pixels from.
#[derive(Clone, Debug)]
pub enum TextureSource {
    Image(StaticImage),
    Canvas(Arc<dyn CanvasSource>),
    Video(Arc<dyn VideoSource>),
}

impl TextureSource {
    pub fn is_live(&self) -> bool {
        !matches!(self, TextureSource::Image(_))
    }

    pub fn as_image(&self) -> Option<&StaticImage> {
        match self {
            TextureSource::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// Process-wide identity of a texture; survives clones so replacements can find their target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl TextureId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A material's texture map.
#[derive(Clone, Debug)]
pub struct Texture {
    id: TextureId,
    pub name: Option<String>,
    pub source: TextureSource,
    /// Set when `source` changed and the GPU copy is stale.
    pub needs_update: bool,
}

impl Texture {
    pub fn new(name: Option<String>, source: TextureSource) -> Self {
        Self {
            id: TextureId::next(),
            name,
            source,
            needs_update: true,
        }
    }

    pub fn from_image(name: Option<String>, image: StaticImage) -> Self {
        Self::new(name, TextureSource::Image(image))
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    /// Swap in a new pixel source and flag the texture for re-upload.
    pub fn replace_source(&mut self, source: TextureSource) {
        self.source = source;
        self.needs_update = true;
    }
}

/// A GPU texture with a view and optional sampler.
#[derive(Clone, Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl GpuTexture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            sampler: None,
        }
    }

    /// A 1x1 white texture, bound for materials without a map so the shader stays the same.
    pub fn create_white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let white = RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        Self::from_rgba(device, queue, &white, Some("default white map"))
    }

    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &StaticImage,
        label: Option<&str>,
    ) -> Self {
        Self::from_rgba(device, queue, img.pixels(), label)
    }

    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: &RgbaImage,
        label: Option<&str>,
    ) -> Self {
        let dimensions = rgba.dimensions();
        let size = wgpu::Extent3d {
            width: dimensions.0.max(1),
            height: dimensions.1.max(1),
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = Some(create_default_sampler(device));

        let gpu_texture = Self {
            texture,
            view,
            sampler,
        };
        gpu_texture.write_rgba(queue, rgba);
        gpu_texture
    }

    pub fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    /// Overwrite the pixels in place. `rgba` must match [`GpuTexture::size`]; empty images are ignored.
    pub fn write_rgba(&self, queue: &wgpu::Queue, rgba: &RgbaImage) {
        let (width, height) = rgba.dimensions();
        if width == 0 || height == 0 || (width, height) != self.size() {
            return;
        }
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

pub fn create_default_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_decode_png_data_url() {
        let pixels = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let url = to_png_data_url(&pixels).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let image = StaticImage::from_data_url(&url).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.pixels().get_pixel(2, 1), &image::Rgba([10, 20, 30, 255]));
        assert_eq!(image.encoded().unwrap().mime_type, "image/png");
    }

    #[test]
    fn should_reject_non_data_url() {
        assert!(StaticImage::from_data_url("blob:http://localhost/1234").is_err());
        assert!(StaticImage::from_data_url("data:image/png,plain").is_err());
    }

    #[test]
    fn should_keep_identity_across_clones_and_flag_replacements() {
        let mut texture = Texture::from_image(None, StaticImage::from_pixels(RgbaImage::new(1, 1)));
        texture.needs_update = false;
        let copy = texture.clone();
        assert_eq!(copy.id(), texture.id());

        texture.replace_source(TextureSource::Canvas(Arc::new(Canvas::new(2, 2))));
        assert!(texture.needs_update);
        assert!(texture.source.is_live());
        assert_ne!(Texture::new(None, texture.source.clone()).id(), texture.id());
    }
}
