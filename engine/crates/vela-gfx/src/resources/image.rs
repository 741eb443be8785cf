use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{GfxBackend, GfxTextureMemory, TextureDescriptor};
use crate::error::{GfxError, GfxResult};
use crate::sampler::GfxSamplerDesc;

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);
impl TextureId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// host 端图像的像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Rgba8Unorm,
    Rgba8Srgb,
    R16Unorm,
    Rgba16Unorm,
    R32Float,
    Rgba32Float,
}
impl ImageFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8Unorm | Self::Rgba8Srgb => 4,
            Self::R16Unorm => 2,
            Self::Rgba16Unorm => 8,
            Self::R32Float => 4,
            Self::Rgba32Float => 16,
        }
    }

    #[inline]
    pub fn is_srgb(self) -> bool {
        matches!(self, Self::Rgba8Srgb)
    }
}

/// 已解码的图像数据，尚未上传到 GPU
#[derive(Clone)]
pub struct GfxImage {
    name: String,
    width: u32,
    height: u32,
    format: ImageFormat,
    pixels: Vec<u8>,
}
impl std::fmt::Debug for GfxImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxImage")
            .field("name", &self.name)
            .field("extent", &(self.width, self.height))
            .field("format", &self.format)
            .finish()
    }
}
// new & init
impl GfxImage {
    pub fn new(name: impl AsRef<str>, width: u32, height: u32, format: ImageFormat, pixels: Vec<u8>) -> GfxResult<Self> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(GfxError::Unsupported(format!(
                "image `{}`: {}x{} {:?} expects {} bytes, got {}",
                name.as_ref(),
                width,
                height,
                format,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            name: name.as_ref().to_string(),
            width,
            height,
            format,
            pixels,
        })
    }

    /// 1x1 的纯色图像，用作缺省纹理
    pub fn solid_rgba8(name: impl AsRef<str>, color: [u8; 4]) -> Self {
        Self {
            name: name.as_ref().to_string(),
            width: 1,
            height: 1,
            format: ImageFormat::Rgba8Unorm,
            pixels: color.to_vec(),
        }
    }
}
// getters
impl GfxImage {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// 上传到 GPU 的纹理，可注册到 bindless 的 image 槽位
pub struct GfxTexture {
    memory: Box<dyn GfxTextureMemory>,

    id: TextureId,
    width: u32,
    height: u32,
    format: ImageFormat,
    sampler: GfxSamplerDesc,

    name: String,
}
impl std::fmt::Debug for GfxTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxTexture")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("extent", &(self.width, self.height))
            .field("format", &self.format)
            .finish()
    }
}
// new & init
impl GfxTexture {
    pub fn new(backend: &dyn GfxBackend, image: &GfxImage, sampler: GfxSamplerDesc) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxTexture::new");
        let memory = backend.create_texture(image, &sampler)?;
        Ok(Self {
            memory,
            id: TextureId(NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)),
            width: image.width(),
            height: image.height(),
            format: image.format(),
            sampler,
            name: image.name().to_string(),
        })
    }
}
// getters
impl GfxTexture {
    #[inline]
    pub fn id(&self) -> TextureId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn format(&self) -> ImageFormat {
        self.format
    }

    #[inline]
    pub fn sampler(&self) -> &GfxSamplerDesc {
        &self.sampler
    }

    #[inline]
    pub fn descriptor(&self) -> TextureDescriptor {
        TextureDescriptor {
            texture_id: self.id,
            view_handle: self.memory.view_handle(),
            sampler_handle: self.memory.sampler_handle(),
        }
    }
}
