use glam::Mat4;
use vela_gfx::backend::BufferDescriptor;
use vela_gfx::error::{GfxError, GfxResult};

use crate::per_frame_buffer::PerFrameBuffer;
use crate::render_context::RenderContext;

/// 着色器通过 `gl_InstanceIndex` 读取的单个实例
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceData {
    pub model: Mat4,
    /// 关节矩阵缓冲在 bindless 中的索引，无骨骼时为 `u32::MAX`
    pub joint_buffer_index: u32,
    pub entity_id: u32,
    pub _padding: [u32; 2],
}
impl InstanceData {
    pub const NO_SKELETON: u32 = u32::MAX;

    #[inline]
    pub fn new(model: Mat4) -> Self {
        Self {
            model,
            joint_buffer_index: Self::NO_SKELETON,
            entity_id: 0,
            _padding: [0; 2],
        }
    }
}

/// 实例缓冲某个帧槽位的绑定状态
///
/// 扩容后 `generation` 增加，之前取得的描述失效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceBufferDescriptor {
    pub bindless_index: u32,
    pub generation: u32,
    pub buffer: BufferDescriptor,
}

/// 每个 primitive 一份的实例数据缓冲
///
/// CPU 端保存全部实例；GPU 端每个 frames in flight 槽位一份 host visible 的 storage buffer，
/// 只在该槽位的数据过期时（实例变化或关节缓冲索引变化）重新上传。容量不足时按两倍扩容。
pub struct InstanceBuffer {
    instances: Vec<InstanceData>,
    /// 每次修改 `instances` 时递增
    version: u64,

    gpu: PerFrameBuffer,
    /// 每个槽位上传时使用的关节缓冲索引
    uploaded_joint_index: Vec<Option<u32>>,

    name: String,
}
impl std::fmt::Debug for InstanceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceBuffer")
            .field("name", &self.name)
            .field("count", &self.instances.len())
            .field("version", &self.version)
            .field("frames", &self.gpu.frame_count())
            .finish()
    }
}
// new & init
impl InstanceBuffer {
    const STRIDE: usize = size_of::<InstanceData>();

    pub fn new(ctx: &RenderContext, name: impl AsRef<str>) -> GfxResult<Self> {
        Self::with_capacity(ctx, ctx.settings().instance_buffer_initial_capacity, name)
    }

    pub fn with_capacity(ctx: &RenderContext, capacity: usize, name: impl AsRef<str>) -> GfxResult<Self> {
        let capacity = capacity.max(1);
        let name = name.as_ref().to_string();
        let gpu = PerFrameBuffer::new(ctx, (capacity * Self::STRIDE) as u64, format!("{name}-instances"))?;

        Ok(Self {
            instances: Vec::with_capacity(capacity),
            version: 0,
            uploaded_joint_index: vec![None; gpu.frame_count()],
            gpu,
            name,
        })
    }
}
// getters
impl InstanceBuffer {
    #[inline]
    pub fn count(&self) -> usize {
        self.instances.len()
    }

    /// 该槽位 GPU buffer 能容纳的实例数量
    #[inline]
    pub fn capacity(&self, frame_slot: usize) -> usize {
        self.gpu.buffer(frame_slot).size() as usize / Self::STRIDE
    }

    #[inline]
    pub fn bindless_index(&self, frame_slot: usize) -> u32 {
        self.gpu.bindless_index(frame_slot)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn gpu_buffers(&self) -> &PerFrameBuffer {
        &self.gpu
    }

    #[inline]
    pub fn descriptor(&self, frame_slot: usize) -> InstanceBufferDescriptor {
        InstanceBufferDescriptor {
            bindless_index: self.gpu.bindless_index(frame_slot),
            generation: self.gpu.generation(frame_slot),
            buffer: self.gpu.descriptor(frame_slot),
        }
    }

    /// CPU 端的实例
    #[inline]
    pub fn get(&self, index: usize) -> Option<InstanceData> {
        self.instances.get(index).copied()
    }

    /// 该槽位 GPU buffer 中已上传的实例
    pub fn uploaded(&self, frame_slot: usize, index: usize) -> Option<InstanceData> {
        if index >= self.instances.len() || self.gpu.version(frame_slot).is_none() {
            return None;
        }
        let bytes = self.gpu.buffer(frame_slot).mapped_bytes().ok()?;
        let offset = index * Self::STRIDE;
        Some(bytemuck::pod_read_unaligned(bytes.get(offset..offset + Self::STRIDE)?))
    }

    /// 该槽位的 GPU 数据与 CPU 一致
    #[inline]
    pub fn is_uploaded(&self, frame_slot: usize) -> bool {
        self.gpu.version(frame_slot) == Some(self.version)
    }
}
// tools
impl InstanceBuffer {
    /// 追加一个实例，返回它的下标
    pub fn append(&mut self, data: InstanceData) -> usize {
        self.instances.push(data);
        self.version += 1;
        self.instances.len() - 1
    }

    pub fn update_at(&mut self, index: usize, data: InstanceData) -> GfxResult<()> {
        let count = self.instances.len();
        let Some(slot) = self.instances.get_mut(index) else {
            return Err(GfxError::OutOfBounds {
                name: self.name.clone(),
                offset: (index * Self::STRIDE) as u64,
                len: Self::STRIDE as u64,
                capacity: (count * Self::STRIDE) as u64,
            });
        };
        *slot = data;
        self.version += 1;
        Ok(())
    }

    /// 调整实例数量，新增部分填入单位矩阵
    pub fn resize(&mut self, count: usize) {
        if count == self.instances.len() {
            return;
        }
        self.instances.resize(count, InstanceData::new(Mat4::IDENTITY));
        self.version += 1;
    }

    #[inline]
    pub fn clear(&mut self) {
        self.resize(0);
    }

    /// # Phase: Before Render
    ///
    /// 当前帧槽位的数据过期时上传全部实例，`joint_buffer_index` 是该槽位的关节缓冲索引。
    /// 返回是否发生了上传。
    pub fn upload(
        &mut self,
        ctx: &RenderContext,
        frame_id: u64,
        frame_slot: usize,
        joint_buffer_index: u32,
    ) -> GfxResult<bool> {
        let index = frame_slot % self.gpu.frame_count();
        if self.gpu.version(index) == Some(self.version) && self.uploaded_joint_index[index] == Some(joint_buffer_index) {
            return Ok(false);
        }

        let records = self
            .instances
            .iter()
            .map(|data| InstanceData {
                joint_buffer_index,
                ..*data
            })
            .collect::<Vec<_>>();
        self.gpu.write(ctx, frame_id, index, bytemuck::cast_slice(&records), self.version)?;
        self.uploaded_joint_index[index] = Some(joint_buffer_index);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline_settings::RendererSettings;
    use std::sync::Arc;
    use vela_gfx::host::HostBackend;

    fn context() -> (Arc<HostBackend>, RenderContext) {
        let host = Arc::new(HostBackend::new());
        let ctx = RenderContext::new(host.clone(), RendererSettings::default()).unwrap();
        (host, ctx)
    }

    #[test]
    fn test_instance_record_size() {
        assert!(size_of::<InstanceData>() >= 64);
        assert_eq!(size_of::<InstanceData>() % 16, 0);
    }

    #[test]
    fn test_upload_grows_and_rebinds() {
        let (host, ctx) = context();
        let mut instances = InstanceBuffer::with_capacity(&ctx, 2, "prim").unwrap();
        let before = instances.descriptor(1);

        for i in 0..5 {
            let model = Mat4::from_translation(glam::Vec3::new(i as f32, 0.0, 0.0));
            assert_eq!(instances.append(InstanceData::new(model)), i);
        }
        assert_eq!(instances.count(), 5);
        assert!(instances.upload(&ctx, 1, 1, InstanceData::NO_SKELETON).unwrap());
        assert_eq!(instances.capacity(1), 8);
        // 其他槽位还没有上传，也没有扩容
        assert_eq!(instances.capacity(0), 2);
        assert!(!instances.is_uploaded(0));

        let after = instances.descriptor(1);
        assert_eq!(after.bindless_index, before.bindless_index);
        assert_ne!(after.generation, before.generation);
        assert_ne!(after.buffer.buffer_id, before.buffer.buffer_id);
        assert_eq!(ctx.pending_destroy_count(), 1);

        assert_eq!(instances.uploaded(1, 1).unwrap().model.w_axis.x, 1.0);
        assert_eq!(instances.uploaded(1, 4).unwrap().model.w_axis.x, 4.0);
        assert!(instances.uploaded(1, 5).is_none());
        assert!(instances.uploaded(0, 1).is_none());

        ctx.bindless_manager().update_bindless_descriptor_sets().unwrap();
        assert_eq!(
            host.bound_buffer(instances.bindless_index(1)).map(|d| d.buffer_id),
            Some(after.buffer.buffer_id)
        );
    }

    #[test]
    fn test_each_frame_slot_uploads_once_per_change() {
        let (_host, ctx) = context();
        let mut instances = InstanceBuffer::new(&ctx, "prim").unwrap();
        instances.append(InstanceData::new(Mat4::IDENTITY));

        assert!(instances.upload(&ctx, 1, 1, InstanceData::NO_SKELETON).unwrap());
        assert!(!instances.upload(&ctx, 1, 1, InstanceData::NO_SKELETON).unwrap());
        assert!(instances.upload(&ctx, 2, 2, InstanceData::NO_SKELETON).unwrap());

        let moved = InstanceData::new(Mat4::from_translation(glam::Vec3::Y));
        instances.update_at(0, moved).unwrap();
        assert!(!instances.is_uploaded(1) && !instances.is_uploaded(2));
        assert!(instances.upload(&ctx, 4, 1, InstanceData::NO_SKELETON).unwrap());
        assert_eq!(instances.uploaded(1, 0), Some(moved));

        // 关节缓冲索引按槽位写入
        assert!(instances.upload(&ctx, 5, 2, 9).unwrap());
        assert_eq!(instances.uploaded(2, 0).unwrap().joint_buffer_index, 9);
        assert_eq!(instances.get(0), Some(moved));
    }

    #[test]
    fn test_update_at() {
        let (_host, ctx) = context();
        let mut instances = InstanceBuffer::new(&ctx, "prim").unwrap();
        instances.resize(3);
        assert_eq!(instances.get(2).unwrap().model, Mat4::IDENTITY);

        let scaled = InstanceData::new(Mat4::from_scale(glam::Vec3::splat(2.0)));
        instances.update_at(2, scaled).unwrap();
        assert_eq!(instances.get(2), Some(scaled));
        assert!(instances.update_at(3, scaled).is_err());
    }
}
