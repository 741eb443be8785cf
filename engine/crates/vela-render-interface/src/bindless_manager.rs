use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use vela_gfx::backend::{BindlessWrite, BufferDescriptor, GfxBackend, TextureDescriptor};
use vela_gfx::error::GfxResult;
use vela_gfx::resources::buffer::{BufferId, GfxBuffer};
use vela_gfx::resources::image::{GfxTexture, TextureId};

/// image 槽位 0 保留给纹理 atlas，也是槽位耗尽时返回的哨兵值
pub const BINDLESS_ATLAS_INDEX: u32 = 0;

#[derive(Default)]
struct BindlessState {
    buffers: HashMap<BufferId, u32>,
    next_buffer_index: u32,

    textures: HashMap<TextureId, u32>,
    /// 从 1 开始，0 为 atlas
    next_texture_index: u32,

    /// 尚未提交到 descriptor set 的写入
    pending: Vec<BindlessWrite>,

    overflow_count: usize,
}

/// Bindless 描述符管理器
///
/// 进程内唯一的槽位池：storage buffer 与 image 各自拥有一段连续的索引空间。
/// 索引按照注册顺序单调递增，进程生命周期内不会复用。
///
/// # 线程
/// 所有方法只需要 `&self`，注册可以在加载线程中进行；
/// `update_bindless_descriptor_sets` 在渲染线程每帧调用一次。
///
/// # 使用示例
/// ```ignore
/// let index = ctx.bindless_manager().add_buffer(&joint_buffer);
/// // 在着色器中: storage_buffers[index]
/// ```
pub struct BindlessManager {
    backend: Arc<dyn GfxBackend>,

    max_buffers: u32,
    max_textures: u32,

    state: Mutex<BindlessState>,
}
// new & init
impl BindlessManager {
    pub fn new(backend: Arc<dyn GfxBackend>, max_buffers: u32, max_textures: u32) -> Self {
        Self {
            backend,
            max_buffers,
            max_textures,
            state: Mutex::new(BindlessState {
                next_texture_index: BINDLESS_ATLAS_INDEX + 1,
                ..Default::default()
            }),
        }
    }
}
impl Drop for BindlessManager {
    fn drop(&mut self) {
        log::info!("Dropping BindlessManager");
    }
}
// buffers
impl BindlessManager {
    /// 注册一个 storage buffer，返回其 bindless 索引
    ///
    /// 已注册过的 buffer 直接返回缓存的索引；槽位耗尽时返回 [`BINDLESS_ATLAS_INDEX`]。
    #[inline]
    pub fn add_buffer(&self, buffer: &GfxBuffer) -> u32 {
        self.add_buffer_descriptor(buffer.descriptor())
    }

    pub fn add_buffer_descriptor(&self, descriptor: BufferDescriptor) -> u32 {
        let mut state = self.lock_state();
        if let Some(&index) = state.buffers.get(&descriptor.buffer_id) {
            return index;
        }

        if state.next_buffer_index >= self.max_buffers {
            state.overflow_count += 1;
            log::error!(
                "[CRITICAL] bindless storage buffer pool exhausted ({} slots), buffer {:?} falls back to index {}",
                self.max_buffers,
                descriptor.buffer_id,
                BINDLESS_ATLAS_INDEX
            );
            return BINDLESS_ATLAS_INDEX;
        }

        let index = state.next_buffer_index;
        state.next_buffer_index += 1;
        state.buffers.insert(descriptor.buffer_id, index);
        state.pending.push(BindlessWrite::StorageBuffer {
            index,
            buffer: descriptor,
        });
        index
    }

    /// 将已分配的槽位指向另一个 buffer（例如实例缓冲扩容之后）
    pub fn rebind_buffer(&self, index: u32, buffer: &GfxBuffer) {
        let descriptor = buffer.descriptor();
        let mut state = self.lock_state();
        debug_assert!(index < state.next_buffer_index, "rebinding an unassigned bindless slot {index}");

        state.buffers.retain(|_, slot| *slot != index);
        state.buffers.insert(descriptor.buffer_id, index);
        // 同一槽位尚未提交的旧写入已经过时
        state
            .pending
            .retain(|write| !matches!(write, BindlessWrite::StorageBuffer { index: pending, .. } if *pending == index));
        state.pending.push(BindlessWrite::StorageBuffer {
            index,
            buffer: descriptor,
        });
    }

    #[inline]
    pub fn buffer_index(&self, buffer_id: BufferId) -> Option<u32> {
        self.lock_state().buffers.get(&buffer_id).copied()
    }

    /// 已分配的 storage buffer 槽位数量
    #[inline]
    pub fn buffer_count(&self) -> u32 {
        self.lock_state().next_buffer_index
    }
}
// textures
impl BindlessManager {
    /// 将 atlas 纹理写入 0 号 image 槽位
    pub fn set_atlas(&self, texture: &GfxTexture) {
        let mut state = self.lock_state();
        state.textures.insert(texture.id(), BINDLESS_ATLAS_INDEX);
        state.pending.push(BindlessWrite::Texture {
            index: BINDLESS_ATLAS_INDEX,
            texture: texture.descriptor(),
        });
    }

    #[inline]
    pub fn add_texture(&self, texture: &GfxTexture) -> u32 {
        self.add_texture_descriptor(texture.descriptor())
    }

    pub fn add_texture_descriptor(&self, descriptor: TextureDescriptor) -> u32 {
        let mut state = self.lock_state();
        if let Some(&index) = state.textures.get(&descriptor.texture_id) {
            return index;
        }

        if state.next_texture_index >= self.max_textures {
            state.overflow_count += 1;
            log::error!(
                "[CRITICAL] bindless image pool exhausted ({} slots), texture {:?} falls back to the atlas",
                self.max_textures,
                descriptor.texture_id
            );
            return BINDLESS_ATLAS_INDEX;
        }

        let index = state.next_texture_index;
        state.next_texture_index += 1;
        state.textures.insert(descriptor.texture_id, index);
        state.pending.push(BindlessWrite::Texture {
            index,
            texture: descriptor,
        });
        index
    }

    #[inline]
    pub fn texture_index(&self, texture_id: TextureId) -> Option<u32> {
        self.lock_state().textures.get(&texture_id).copied()
    }
}
// update
impl BindlessManager {
    /// # Phase: Before Render
    ///
    /// 取出所有待提交的写入，释放锁之后一次性提交给后端
    pub fn update_bindless_descriptor_sets(&self) -> GfxResult<()> {
        let _span = tracy_client::span!("BindlessManager::update_bindless_descriptor_sets");

        let writes = std::mem::take(&mut self.lock_state().pending);
        if writes.is_empty() {
            return Ok(());
        }
        log::debug!("bindless: submitting {} descriptor writes", writes.len());
        self.backend.update_descriptor_sets(&writes)
    }

    /// 丢弃尚未提交、且引用了即将销毁的资源的写入，同时移除这些资源的缓存索引
    ///
    /// 槽位本身不会回收。返回丢弃的写入数量。
    pub fn discard_pending(&self, buffer_ids: &[BufferId], texture_ids: &[TextureId]) -> usize {
        let mut state = self.lock_state();
        let before = state.pending.len();
        state.pending.retain(|write| match write {
            BindlessWrite::StorageBuffer { buffer, .. } => !buffer_ids.contains(&buffer.buffer_id),
            BindlessWrite::Texture { texture, .. } => !texture_ids.contains(&texture.texture_id),
        });
        for id in buffer_ids {
            state.buffers.remove(id);
        }
        for id in texture_ids {
            state.textures.remove(id);
        }

        let discarded = before - state.pending.len();
        if discarded > 0 {
            log::debug!("bindless: discarded {discarded} pending writes of destroyed resources");
        }
        discarded
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.lock_state().pending.len()
    }

    /// 槽位耗尽的次数
    #[inline]
    pub fn overflow_count(&self) -> usize {
        self.lock_state().overflow_count
    }

    fn lock_state(&self) -> MutexGuard<'_, BindlessState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_gfx::host::HostBackend;
    use vela_gfx::resources::buffer::BufferUsage;
    use vela_gfx::resources::image::GfxImage;
    use vela_gfx::sampler::GfxSamplerDesc;

    fn storage(backend: &HostBackend, name: &str) -> GfxBuffer {
        GfxBuffer::new(backend, 64, BufferUsage::StorageHostVisible, name).unwrap()
    }

    #[test]
    fn test_add_buffer_is_idempotent() {
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), 16, 16);
        let a = storage(&host, "a");
        let b = storage(&host, "b");

        assert_eq!(manager.add_buffer(&a), 0);
        assert_eq!(manager.add_buffer(&a), 0);
        assert_eq!(manager.add_buffer(&b), 1);
        assert_eq!(manager.pending_count(), 2);
        assert_eq!(manager.buffer_index(b.id()), Some(1));
    }

    #[test]
    fn test_single_batched_update() {
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), 16, 16);
        let buffers = (0..5).map(|i| storage(&host, &format!("b{i}"))).collect::<Vec<_>>();
        for buffer in &buffers {
            manager.add_buffer(buffer);
        }

        manager.update_bindless_descriptor_sets().unwrap();
        assert_eq!(host.descriptor_update_calls(), 1);
        assert_eq!(host.descriptor_writes().len(), 5);
        assert_eq!(manager.pending_count(), 0);

        // 没有新的写入时不会调用后端
        manager.update_bindless_descriptor_sets().unwrap();
        assert_eq!(host.descriptor_update_calls(), 1);
    }

    #[test]
    fn test_buffer_pool_overflow() {
        const MAX: u32 = 16384;
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), MAX, 16);

        let buffers = (0..=MAX).map(|i| storage(&host, &format!("b{i}"))).collect::<Vec<_>>();
        let indices = buffers.iter().map(|b| manager.add_buffer(b)).collect::<Vec<_>>();

        assert_eq!(&indices[..MAX as usize], &(0..MAX).collect::<Vec<_>>()[..]);
        assert_eq!(indices[MAX as usize], BINDLESS_ATLAS_INDEX);
        assert_eq!(manager.overflow_count(), 1);
        assert_eq!(manager.buffer_count(), MAX);
    }

    #[test]
    fn test_indices_monotonic_across_threads() {
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), 1024, 16);
        let buffers = (0..64).map(|i| storage(&host, &format!("b{i}"))).collect::<Vec<_>>();

        std::thread::scope(|s| {
            for chunk in buffers.chunks(16) {
                let manager = &manager;
                s.spawn(move || {
                    let indices = chunk.iter().map(|b| manager.add_buffer(b)).collect::<Vec<_>>();
                    assert!(indices.windows(2).all(|w| w[0] < w[1]));
                });
            }
        });

        let mut all = buffers.iter().map(|b| manager.buffer_index(b.id()).unwrap()).collect::<Vec<_>>();
        all.sort();
        assert_eq!(all, (0..64).collect::<Vec<_>>());
    }

    #[test]
    fn test_rebind_buffer() {
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), 16, 16);
        let old = storage(&host, "old");
        let new = storage(&host, "new");

        let index = manager.add_buffer(&old);
        manager.rebind_buffer(index, &new);
        manager.update_bindless_descriptor_sets().unwrap();

        assert_eq!(host.bound_buffer(index).map(|d| d.buffer_id), Some(new.id()));
        assert_eq!(manager.buffer_index(old.id()), None);
        assert_eq!(manager.add_buffer(&new), index);
    }

    #[test]
    fn test_discard_pending_of_destroyed_resources() {
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), 16, 16);
        let kept = storage(&host, "kept");
        let dropped = storage(&host, "dropped");
        let image = GfxImage::solid_rgba8("t", [0; 4]);
        let texture = GfxTexture::new(host.as_ref(), &image, GfxSamplerDesc::default()).unwrap();

        manager.add_buffer(&kept);
        let dropped_index = manager.add_buffer(&dropped);
        manager.add_texture(&texture);
        assert_eq!(manager.pending_count(), 3);

        assert_eq!(manager.discard_pending(&[dropped.id()], &[texture.id()]), 2);
        assert_eq!(manager.buffer_index(dropped.id()), None);
        assert_eq!(manager.texture_index(texture.id()), None);

        manager.update_bindless_descriptor_sets().unwrap();
        let writes = host.descriptor_writes();
        assert_eq!(writes.len(), 1);
        assert!(matches!(writes[0], BindlessWrite::StorageBuffer { buffer, .. } if buffer.buffer_id == kept.id()));
        assert!(host.bound_buffer(dropped_index).is_none());
        // 槽位不会复用
        assert_eq!(manager.buffer_count(), 2);
    }

    #[test]
    fn test_rebind_replaces_pending_write() {
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), 16, 16);
        let old = storage(&host, "old");
        let new = storage(&host, "new");

        let index = manager.add_buffer(&old);
        manager.rebind_buffer(index, &new);
        assert_eq!(manager.pending_count(), 1);
    }

    #[test]
    fn test_texture_slots_skip_atlas() {
        let host = Arc::new(HostBackend::new());
        let manager = BindlessManager::new(host.clone(), 16, 3);
        let image = GfxImage::solid_rgba8("t", [0; 4]);
        let textures = (0..3)
            .map(|_| GfxTexture::new(host.as_ref(), &image, GfxSamplerDesc::default()).unwrap())
            .collect::<Vec<_>>();

        manager.set_atlas(&textures[0]);
        assert_eq!(manager.add_texture(&textures[0]), BINDLESS_ATLAS_INDEX);
        assert_eq!(manager.add_texture(&textures[1]), 1);
        assert_eq!(manager.add_texture(&textures[2]), 2);

        let extra = GfxTexture::new(host.as_ref(), &image, GfxSamplerDesc::default()).unwrap();
        assert_eq!(manager.add_texture(&extra), BINDLESS_ATLAS_INDEX);
        assert_eq!(manager.overflow_count(), 1);
    }
}
