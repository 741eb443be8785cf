//! 图像解码与纹理创建
//!
//! 颜色空间由材质中的用途决定：diffuse / emissive 为 sRGB，normal / roughness-metallic 为线性。

use std::collections::HashSet;

use gltf::image::Format;
use gltf::texture::{MagFilter, MinFilter, WrappingMode};
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use rayon::prelude::*;
use vela_gfx::resources::image::{GfxImage, GfxTexture, ImageFormat};
use vela_gfx::sampler::{AddressMode, Filter, GfxSamplerDesc};
use vela_render_interface::render_context::RenderContext;
use vela_scene::material::MaterialTexture;
use vela_scene::resources::{SceneResources, SceneTexture, TextureHandle};

use crate::error::{AssetError, AssetResult};

/// 被当作颜色使用（需要 sRGB）的 glTF texture 下标
pub(crate) fn srgb_textures(document: &gltf::Document) -> HashSet<usize> {
    let mut srgb = HashSet::new();
    let mut linear = HashSet::new();
    for material in document.materials() {
        let pbr = material.pbr_metallic_roughness();
        srgb.extend(pbr.base_color_texture().map(|info| info.texture().index()));
        srgb.extend(material.emissive_texture().map(|info| info.texture().index()));
        linear.extend(pbr.metallic_roughness_texture().map(|info| info.texture().index()));
        linear.extend(material.normal_texture().map(|info| info.texture().index()));
    }
    for index in srgb.intersection(&linear) {
        log::warn!("texture {index} is used both as color and as data, loaded as sRGB");
    }
    srgb
}

pub(crate) fn sampler_desc(sampler: &gltf::texture::Sampler) -> GfxSamplerDesc {
    let mag_filter = match sampler.mag_filter() {
        Some(MagFilter::Nearest) => Filter::Nearest,
        Some(MagFilter::Linear) | None => Filter::Linear,
    };
    let (min_filter, mipmap_filter) = match sampler.min_filter() {
        Some(MinFilter::Nearest) | Some(MinFilter::NearestMipmapNearest) => (Filter::Nearest, Filter::Nearest),
        Some(MinFilter::NearestMipmapLinear) => (Filter::Nearest, Filter::Linear),
        Some(MinFilter::LinearMipmapNearest) => (Filter::Linear, Filter::Nearest),
        Some(MinFilter::Linear) | Some(MinFilter::LinearMipmapLinear) | None => (Filter::Linear, Filter::Linear),
    };
    let address = |mode: WrappingMode| match mode {
        WrappingMode::ClampToEdge => AddressMode::ClampToEdge,
        WrappingMode::MirroredRepeat => AddressMode::MirroredRepeat,
        WrappingMode::Repeat => AddressMode::Repeat,
    };
    GfxSamplerDesc {
        mag_filter,
        min_filter,
        mipmap_filter,
        address_u: address(sampler.wrap_s()),
        address_v: address(sampler.wrap_t()),
    }
}

fn to_u16(bytes: &[u8]) -> Vec<u16> {
    bytes.chunks_exact(2).map(|c| u16::from_ne_bytes([c[0], c[1]])).collect()
}

fn to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes.chunks_exact(4).map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// 把 glTF 解码出的像素转换为 GPU 使用的格式
///
/// 8 位图像统一为 RGBA8（按用途选择 sRGB / UNORM），16 位单通道保留为 R16，
/// 其余 16 位为 RGBA16，浮点为 RGBA32F。
pub(crate) fn convert_image(data: &gltf::image::Data, srgb: bool, name: &str) -> AssetResult<GfxImage> {
    let (w, h) = (data.width, data.height);
    let pixels = data.pixels.clone();
    let mismatch = || AssetError::semantic(format!("image `{name}`: pixel data does not match {w}x{h} {:?}", data.format));

    let dynamic = match data.format {
        Format::R8 => ImageBuffer::<Luma<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        Format::R8G8 => ImageBuffer::<LumaA<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageLumaA8),
        Format::R8G8B8 => ImageBuffer::<Rgb<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        Format::R8G8B8A8 => ImageBuffer::<Rgba<u8>, _>::from_raw(w, h, pixels).map(DynamicImage::ImageRgba8),
        Format::R16 => {
            return Ok(GfxImage::new(name, w, h, ImageFormat::R16Unorm, pixels)?);
        }
        Format::R16G16 => ImageBuffer::<LumaA<u16>, _>::from_raw(w, h, to_u16(&pixels)).map(DynamicImage::ImageLumaA16),
        Format::R16G16B16 => ImageBuffer::<Rgb<u16>, _>::from_raw(w, h, to_u16(&pixels)).map(DynamicImage::ImageRgb16),
        Format::R16G16B16A16 => {
            ImageBuffer::<Rgba<u16>, _>::from_raw(w, h, to_u16(&pixels)).map(DynamicImage::ImageRgba16)
        }
        Format::R32G32B32FLOAT => {
            ImageBuffer::<Rgb<f32>, _>::from_raw(w, h, to_f32(&pixels)).map(DynamicImage::ImageRgb32F)
        }
        Format::R32G32B32A32FLOAT => {
            ImageBuffer::<Rgba<f32>, _>::from_raw(w, h, to_f32(&pixels)).map(DynamicImage::ImageRgba32F)
        }
    }
    .ok_or_else(mismatch)?;

    let image = match data.format {
        Format::R8 | Format::R8G8 | Format::R8G8B8 | Format::R8G8B8A8 => {
            let format = if srgb { ImageFormat::Rgba8Srgb } else { ImageFormat::Rgba8Unorm };
            GfxImage::new(name, w, h, format, dynamic.to_rgba8().into_raw())?
        }
        Format::R32G32B32FLOAT | Format::R32G32B32A32FLOAT => {
            let pixels = dynamic.to_rgba32f().into_raw();
            GfxImage::new(name, w, h, ImageFormat::Rgba32Float, bytemuck::cast_slice(&pixels).to_vec())?
        }
        _ => {
            let pixels = dynamic.to_rgba16().into_raw();
            GfxImage::new(name, w, h, ImageFormat::Rgba16Unorm, bytemuck::cast_slice(&pixels).to_vec())?
        }
    };
    Ok(image)
}

/// 为每个 glTF texture 创建纹理并注册 bindless 槽位，返回按 texture 下标排列的结果
///
/// 像素转换在 rayon 中并行进行，GPU 资源按下标顺序创建，保证 bindless 索引稳定。
pub(crate) fn load_textures(
    ctx: &RenderContext,
    document: &gltf::Document,
    images: &[gltf::image::Data],
    resources: &mut SceneResources,
    created: &mut Vec<TextureHandle>,
) -> AssetResult<Vec<MaterialTexture>> {
    let _span = tracy_client::span!("gltf::load_textures");
    let srgb = srgb_textures(document);

    let textures = document.textures().collect::<Vec<_>>();
    let converted = textures
        .par_iter()
        .map(|texture| {
            let source = texture.source().index();
            let name = texture.name().map_or_else(|| format!("texture-{}", texture.index()), str::to_string);
            let data = images
                .get(source)
                .ok_or_else(|| AssetError::semantic(format!("texture {} references missing image {source}", texture.index())))?;
            convert_image(data, srgb.contains(&texture.index()), &name)
        })
        .collect::<AssetResult<Vec<_>>>()?;

    let mut out = Vec::with_capacity(textures.len());
    for (texture, image) in textures.iter().zip(converted) {
        let gfx_texture = GfxTexture::new(ctx.backend(), &image, sampler_desc(&texture.sampler()))?;
        let bindless_index = ctx.bindless_manager().add_texture(&gfx_texture);
        let handle = resources.textures.insert(SceneTexture {
            texture: gfx_texture,
            bindless_index,
        });
        created.push(handle);
        out.push(MaterialTexture {
            texture: handle,
            bindless_index,
        });
    }
    log::info!("loaded {} textures", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb8_expands_to_rgba8() {
        let data = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: Format::R8G8B8,
            width: 2,
            height: 1,
        };
        let image = convert_image(&data, true, "rgb").unwrap();
        assert_eq!(image.format(), ImageFormat::Rgba8Srgb);
        assert_eq!(image.pixels(), &[10, 20, 30, 255, 40, 50, 60, 255]);

        let linear = convert_image(&data, false, "rgb").unwrap();
        assert_eq!(linear.format(), ImageFormat::Rgba8Unorm);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let data = gltf::image::Data {
            pixels: vec![0; 5],
            format: Format::R8G8B8A8,
            width: 2,
            height: 1,
        };
        assert!(matches!(convert_image(&data, false, "bad"), Err(AssetError::Semantic(_))));
    }
}
