use glam::{Mat3, Vec2, Vec3, Vec4};
use vela_gfx::backend::{DrawPushConstants, MaterialKind};
use vela_render_interface::bindless_manager::BINDLESS_ATLAS_INDEX;

use crate::resources::TextureHandle;

bitflags::bitflags! {
    /// 材质可用的贴图与能力
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFeatures: u32 {
        const HAS_DIFFUSE_MAP            = 0x01;
        const HAS_NORMAL_MAP             = 0x02;
        const HAS_ROUGHNESS_METALLIC_MAP = 0x04;
        const HAS_EMISSIVE_MAP           = 0x08;
        const HAS_SKELETAL_ANIMATION     = 0x10;
    }
}

/// KHR_texture_transform 的 uv 变换
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureTransform {
    pub offset: Vec2,
    pub rotation: f32,
    pub scale: Vec2,
}
impl Default for TextureTransform {
    fn default() -> Self {
        Self {
            offset: Vec2::ZERO,
            rotation: 0.0,
            scale: Vec2::ONE,
        }
    }
}
impl TextureTransform {
    /// uv' = T * R * S * uv
    pub fn matrix(&self) -> Mat3 {
        let translation = Mat3::from_translation(self.offset);
        let (s, c) = self.rotation.sin_cos();
        let rotation = Mat3::from_cols(Vec3::new(c, -s, 0.0), Vec3::new(s, c, 0.0), Vec3::Z);
        let scale = Mat3::from_scale(self.scale);
        translation * rotation * scale
    }
}

/// 材质引用的一张贴图：场景资源句柄 + bindless 槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialTexture {
    pub texture: TextureHandle,
    pub bindless_index: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaterialTextures {
    pub diffuse: Option<MaterialTexture>,
    pub normal: Option<MaterialTexture>,
    pub roughness_metallic: Option<MaterialTexture>,
    pub emissive: Option<MaterialTexture>,
}

/// 材质数值参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialParams {
    pub base_color: Vec4,
    pub roughness: f32,
    pub metallic: f32,
    pub emissive_color: Vec3,
    pub emissive_strength: f32,
    pub normal_map_intensity: f32,
    pub texture_transform: Option<TextureTransform>,
}
impl MaterialParams {
    pub fn with_normal_map_intensity(normal_map_intensity: f32) -> Self {
        Self {
            base_color: Vec4::ONE,
            roughness: 1.0,
            metallic: 0.0,
            emissive_color: Vec3::ZERO,
            emissive_strength: 1.0,
            normal_map_intensity,
            texture_transform: None,
        }
    }

    #[inline]
    pub fn is_emissive(&self) -> bool {
        self.emissive_strength > 0.0 && self.emissive_color.max_element() > 0.0
    }
}
impl Default for MaterialParams {
    fn default() -> Self {
        Self::with_normal_map_intensity(1.0)
    }
}

/// 材质：种类标签 + 公共参数
///
/// `kind` 决定 draw 时的 pipeline，由 `features` 选出最具体的一种。
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub features: MaterialFeatures,
    pub params: MaterialParams,
    pub textures: MaterialTextures,
}
// new & init
impl Material {
    pub fn new(name: impl Into<String>, params: MaterialParams, textures: MaterialTextures, skeletal: bool) -> Self {
        let mut features = MaterialFeatures::empty();
        features.set(MaterialFeatures::HAS_DIFFUSE_MAP, textures.diffuse.is_some());
        features.set(MaterialFeatures::HAS_NORMAL_MAP, textures.normal.is_some());
        features.set(MaterialFeatures::HAS_ROUGHNESS_METALLIC_MAP, textures.roughness_metallic.is_some());
        features.set(MaterialFeatures::HAS_EMISSIVE_MAP, textures.emissive.is_some());
        features.set(MaterialFeatures::HAS_SKELETAL_ANIMATION, skeletal);

        Self {
            name: name.into(),
            kind: Self::select_kind(features, &params),
            features,
            params,
            textures,
        }
    }

    /// 天空盒，只在 diffuse 槽位放 cubemap
    pub fn cubemap(name: impl Into<String>, cubemap: MaterialTexture) -> Self {
        Self {
            name: name.into(),
            kind: MaterialKind::Cubemap,
            features: MaterialFeatures::HAS_DIFFUSE_MAP,
            params: MaterialParams::default(),
            textures: MaterialTextures {
                diffuse: Some(cubemap),
                ..Default::default()
            },
        }
    }

    /// 依据可用贴图选择最具体的材质种类
    pub fn select_kind(features: MaterialFeatures, params: &MaterialParams) -> MaterialKind {
        type F = MaterialFeatures;
        if features.contains(F::HAS_SKELETAL_ANIMATION) {
            return MaterialKind::DiffuseSA;
        }

        let diffuse = features.contains(F::HAS_DIFFUSE_MAP);
        let normal = features.contains(F::HAS_NORMAL_MAP);
        let roughness_metallic = features.contains(F::HAS_ROUGHNESS_METALLIC_MAP);
        let emissive = features.contains(F::HAS_EMISSIVE_MAP);

        match (diffuse, normal, roughness_metallic, emissive) {
            (true, _, _, true) => MaterialKind::PbrMulti,
            (true, true, true, false) => MaterialKind::DiffuseNormalRoughnessMetallicMap,
            (true, true, false, false) => MaterialKind::DiffuseNormalMap,
            (true, false, _, false) => MaterialKind::DiffuseMap,
            (false, _, _, true) => MaterialKind::EmissiveTexture,
            (false, _, _, false) if params.is_emissive() => MaterialKind::Emissive,
            (false, _, _, false) => MaterialKind::NoMap,
        }
    }
}
// tools
impl Material {
    /// 生成 draw 的 push constant，缺失的贴图槽位指向 atlas
    pub fn push_constants(&self, instance_buffer_index: u32, joint_buffer_index: u32) -> DrawPushConstants {
        let slot = |t: Option<MaterialTexture>| t.map_or(BINDLESS_ATLAS_INDEX, |t| t.bindless_index);
        let emissive = self.params.emissive_color * self.params.emissive_strength;

        DrawPushConstants {
            instance_buffer_index,
            joint_buffer_index,
            diffuse_texture: slot(self.textures.diffuse),
            normal_texture: slot(self.textures.normal),
            roughness_metallic_texture: slot(self.textures.roughness_metallic),
            emissive_texture: slot(self.textures.emissive),
            features: self.features.bits(),
            _padding_0: 0,
            base_color: self.params.base_color.to_array(),
            emissive: [emissive.x, emissive.y, emissive.z, self.params.emissive_strength],
            roughness: self.params.roughness,
            metallic: self.params.metallic,
            normal_map_intensity: self.params.normal_map_intensity,
            _padding_1: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use slotmap::KeyData;

    use super::*;

    fn texture(slot: u32) -> Option<MaterialTexture> {
        Some(MaterialTexture {
            texture: TextureHandle::from(KeyData::from_ffi(slot as u64 | (1 << 32))),
            bindless_index: slot,
        })
    }

    #[test]
    fn test_select_most_specific_kind() {
        let params = MaterialParams::default();
        let kind = |textures: MaterialTextures| Material::new("m", params, textures, false).kind;

        assert_eq!(kind(MaterialTextures::default()), MaterialKind::NoMap);
        assert_eq!(
            kind(MaterialTextures {
                diffuse: texture(1),
                ..Default::default()
            }),
            MaterialKind::DiffuseMap
        );
        assert_eq!(
            kind(MaterialTextures {
                diffuse: texture(1),
                normal: texture(2),
                ..Default::default()
            }),
            MaterialKind::DiffuseNormalMap
        );
        assert_eq!(
            kind(MaterialTextures {
                diffuse: texture(1),
                normal: texture(2),
                roughness_metallic: texture(3),
                emissive: None,
            }),
            MaterialKind::DiffuseNormalRoughnessMetallicMap
        );
        assert_eq!(
            kind(MaterialTextures {
                diffuse: texture(1),
                normal: texture(2),
                roughness_metallic: texture(3),
                emissive: texture(4),
            }),
            MaterialKind::PbrMulti
        );
        assert_eq!(
            kind(MaterialTextures {
                emissive: texture(4),
                ..Default::default()
            }),
            MaterialKind::EmissiveTexture
        );

        let glowing = MaterialParams {
            emissive_color: Vec3::ONE,
            ..Default::default()
        };
        assert_eq!(Material::new("g", glowing, MaterialTextures::default(), false).kind, MaterialKind::Emissive);
        assert_eq!(Material::new("s", params, MaterialTextures::default(), true).kind, MaterialKind::DiffuseSA);
    }

    #[test]
    fn test_push_constants_fall_back_to_atlas() {
        let material = Material::new(
            "m",
            MaterialParams::default(),
            MaterialTextures {
                diffuse: texture(7),
                ..Default::default()
            },
            false,
        );
        let pc = material.push_constants(3, u32::MAX);
        assert_eq!(pc.instance_buffer_index, 3);
        assert_eq!(pc.diffuse_texture, 7);
        assert_eq!(pc.normal_texture, BINDLESS_ATLAS_INDEX);
        assert_eq!(pc.roughness, 1.0);
        assert_eq!(pc.metallic, 0.0);
        assert_eq!(pc.features, MaterialFeatures::HAS_DIFFUSE_MAP.bits());
    }

    #[test]
    fn test_texture_transform_offset() {
        let t = TextureTransform {
            offset: Vec2::new(0.5, 0.0),
            rotation: 0.0,
            scale: Vec2::splat(2.0),
        };
        let uv = t.matrix().transform_point2(Vec2::new(1.0, 1.0));
        assert!(uv.abs_diff_eq(Vec2::new(2.5, 2.0), 1e-6));
    }
}
