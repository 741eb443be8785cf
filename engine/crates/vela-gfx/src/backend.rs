use std::any::Any;

use crate::error::GfxResult;
use crate::resources::buffer::{BufferId, BufferUsage};
use crate::resources::image::{GfxImage, TextureId};
use crate::sampler::GfxSamplerDesc;

/// 创建 buffer 所需的信息
#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub name: String,
}

/// 后端持有的 buffer 内存
///
/// `mapped_slice*` 只有在 `map()` 与 `unmap()` 之间返回 `Some`。
pub trait GfxBufferMemory: Send + Sync {
    fn map(&mut self) -> GfxResult<()>;
    fn unmap(&mut self);

    fn mapped_slice(&self) -> Option<&[u8]>;
    fn mapped_slice_mut(&mut self) -> Option<&mut [u8]>;

    /// 将 host 端写入的数据对 GPU 可见
    fn flush(&self, offset: u64, size: u64) -> GfxResult<()>;

    /// 后端原生句柄（Vulkan 中为 `vk::Buffer` 的 raw 值）
    fn raw_handle(&self) -> u64;

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// 后端持有的纹理（image + view + sampler）
pub trait GfxTextureMemory: Send + Sync {
    /// Vulkan 中为 `vk::ImageView` 的 raw 值
    fn view_handle(&self) -> u64;
    /// Vulkan 中为 `vk::Sampler` 的 raw 值
    fn sampler_handle(&self) -> u64;

    fn as_any(&self) -> &dyn Any;
}

/// 写入 bindless descriptor set 时对 buffer 的描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDescriptor {
    pub buffer_id: BufferId,
    pub raw_handle: u64,
    pub range: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub texture_id: TextureId,
    pub view_handle: u64,
    pub sampler_handle: u64,
}

/// 一条待提交的 bindless descriptor 写入
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindlessWrite {
    /// binding 0: storage buffer 数组
    StorageBuffer { index: u32, buffer: BufferDescriptor },
    /// binding 1: combined image sampler 数组
    Texture { index: u32, texture: TextureDescriptor },
}

/// 材质种类，决定 draw 时使用的 pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialKind {
    NoMap,
    DiffuseMap,
    DiffuseNormalMap,
    DiffuseNormalRoughnessMetallicMap,
    Emissive,
    EmissiveTexture,
    DiffuseSA,
    Cubemap,
    PbrMulti,
}
impl MaterialKind {
    pub const ALL: [MaterialKind; 9] = [
        MaterialKind::NoMap,
        MaterialKind::DiffuseMap,
        MaterialKind::DiffuseNormalMap,
        MaterialKind::DiffuseNormalRoughnessMetallicMap,
        MaterialKind::Emissive,
        MaterialKind::EmissiveTexture,
        MaterialKind::DiffuseSA,
        MaterialKind::Cubemap,
        MaterialKind::PbrMulti,
    ];
}

/// 每个 draw 的 push constant
///
/// 着色器通过 `instance_buffer_index` 在 bindless storage buffer 数组中找到实例数据，
/// 再用 `gl_InstanceIndex` 索引到具体实例。
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawPushConstants {
    pub instance_buffer_index: u32,
    pub joint_buffer_index: u32,
    pub diffuse_texture: u32,
    pub normal_texture: u32,
    pub roughness_metallic_texture: u32,
    pub emissive_texture: u32,
    pub features: u32,
    pub _padding_0: u32,
    pub base_color: [f32; 4],
    /// rgb + strength
    pub emissive: [f32; 4],
    pub roughness: f32,
    pub metallic: f32,
    pub normal_map_intensity: f32,
    pub _padding_1: f32,
}

/// 一次实例化 draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCommand {
    pub kind: MaterialKind,
    pub vertex_buffer: u64,
    /// `None` 表示非索引绘制
    pub index_buffer: Option<u64>,
    pub first_index: u32,
    pub index_count: u32,
    pub first_vertex: u32,
    pub vertex_count: u32,
    pub instance_count: u32,
    pub push_constants: DrawPushConstants,
}

/// 渲染后端的能力接口
///
/// 加载器与场景代码只依赖这个 trait，不接触具体的图形 API。
/// 实现需要自行保证对设备的访问是串行的。
pub trait GfxBackend: Send + Sync {
    fn name(&self) -> &str;

    fn create_buffer(&self, desc: &BufferDesc) -> GfxResult<Box<dyn GfxBufferMemory>>;

    /// 同步拷贝 `size` 个字节，函数返回时拷贝已经完成
    fn copy_buffer(&self, src: &dyn GfxBufferMemory, dst: &mut dyn GfxBufferMemory, size: u64) -> GfxResult<()>;

    fn create_texture(&self, image: &GfxImage, sampler: &GfxSamplerDesc) -> GfxResult<Box<dyn GfxTextureMemory>>;

    /// 一次批量提交所有的 descriptor 写入
    fn update_descriptor_sets(&self, writes: &[BindlessWrite]) -> GfxResult<()>;

    /// `frame_slot` 为 frames in flight 中的槽位
    fn begin_frame(&self, frame_id: u64, frame_slot: usize) -> GfxResult<()>;
    fn record_draws(&self, draws: &[DrawCommand]) -> GfxResult<()>;
    fn end_frame(&self) -> GfxResult<()>;

    fn wait_idle(&self) -> GfxResult<()>;
}
