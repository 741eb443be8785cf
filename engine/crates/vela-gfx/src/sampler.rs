use ash::vk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

/// 纹理采样状态，由 glTF sampler 转换而来
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GfxSamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mipmap_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
}

// vk 转换
impl Filter {
    #[inline]
    pub fn to_vk(self) -> vk::Filter {
        match self {
            Filter::Nearest => vk::Filter::NEAREST,
            Filter::Linear => vk::Filter::LINEAR,
        }
    }

    #[inline]
    pub fn to_vk_mipmap(self) -> vk::SamplerMipmapMode {
        match self {
            Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
            Filter::Linear => vk::SamplerMipmapMode::LINEAR,
        }
    }
}
impl AddressMode {
    #[inline]
    pub fn to_vk(self) -> vk::SamplerAddressMode {
        match self {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        }
    }
}
impl GfxSamplerDesc {
    pub fn to_vk_create_info(&self) -> vk::SamplerCreateInfo<'static> {
        vk::SamplerCreateInfo::default()
            .mag_filter(self.mag_filter.to_vk())
            .min_filter(self.min_filter.to_vk())
            .mipmap_mode(self.mipmap_filter.to_vk_mipmap())
            .address_mode_u(self.address_u.to_vk())
            .address_mode_v(self.address_v.to_vk())
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
    }
}
