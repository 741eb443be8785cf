use vela_gfx::backend::BufferDescriptor;
use vela_gfx::error::GfxResult;
use vela_gfx::resources::buffer::{BufferId, BufferUsage, GfxBuffer};

use crate::render_context::RenderContext;

struct SlotBuffer {
    buffer: GfxBuffer,
    bindless_index: u32,
    generation: u32,
    /// 最近一次写入的数据版本，`None` 表示从未写入
    version: Option<u64>,
}

/// 每个 frames in flight 槽位一份的 host visible storage buffer
///
/// CPU 只写当前帧槽位的 buffer，其余槽位可能仍被之前提交的帧读取。
/// 每个槽位拥有独立的 bindless 索引；扩容时槽位索引不变，旧 buffer 交给上下文延迟销毁。
pub struct PerFrameBuffer {
    slots: Vec<SlotBuffer>,
    name: String,
}
// new & init
impl PerFrameBuffer {
    pub fn new(ctx: &RenderContext, size: u64, name: impl AsRef<str>) -> GfxResult<Self> {
        let name = name.as_ref().to_string();
        let mut slots = Vec::with_capacity(ctx.frames_in_flight());
        for slot in 0..ctx.frames_in_flight() {
            let buffer = match Self::create_buffer(ctx, size, &name, slot, 0) {
                Ok(buffer) => buffer,
                Err(e) => {
                    // 已注册的槽位不会再被提交
                    let ids = slots.iter().map(|s: &SlotBuffer| s.buffer.id()).collect::<Vec<_>>();
                    ctx.bindless_manager().discard_pending(&ids, &[]);
                    return Err(e);
                }
            };
            let bindless_index = ctx.bindless_manager().add_buffer(&buffer);
            slots.push(SlotBuffer {
                buffer,
                bindless_index,
                generation: 0,
                version: None,
            });
        }
        Ok(Self { slots, name })
    }

    fn create_buffer(ctx: &RenderContext, size: u64, name: &str, slot: usize, generation: u32) -> GfxResult<GfxBuffer> {
        let mut buffer = GfxBuffer::new(
            ctx.backend(),
            size.max(1),
            BufferUsage::StorageHostVisible,
            format!("{name}-F{slot}-{generation}"),
        )?;
        buffer.map()?;
        Ok(buffer)
    }
}
// getters
impl PerFrameBuffer {
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn buffer(&self, frame_slot: usize) -> &GfxBuffer {
        &self.slot(frame_slot).buffer
    }

    #[inline]
    pub fn bindless_index(&self, frame_slot: usize) -> u32 {
        self.slot(frame_slot).bindless_index
    }

    #[inline]
    pub fn generation(&self, frame_slot: usize) -> u32 {
        self.slot(frame_slot).generation
    }

    #[inline]
    pub fn version(&self, frame_slot: usize) -> Option<u64> {
        self.slot(frame_slot).version
    }

    #[inline]
    pub fn descriptor(&self, frame_slot: usize) -> BufferDescriptor {
        self.slot(frame_slot).buffer.descriptor()
    }

    /// 所有槽位当前的 buffer 标识
    pub fn buffer_ids(&self) -> Vec<BufferId> {
        self.slots.iter().map(|s| s.buffer.id()).collect()
    }

    #[inline]
    fn slot(&self, frame_slot: usize) -> &SlotBuffer {
        &self.slots[frame_slot % self.slots.len()]
    }
}
// tools
impl PerFrameBuffer {
    /// 把 `bytes` 写入 `frame_slot` 的 buffer 并 flush，记录数据版本
    ///
    /// 容量不足时按两倍扩容：新 buffer 重新绑定到同一个 bindless 索引，旧 buffer 在 `frame_id` 退役。
    pub fn write(
        &mut self,
        ctx: &RenderContext,
        frame_id: u64,
        frame_slot: usize,
        bytes: &[u8],
        version: u64,
    ) -> GfxResult<()> {
        let index = frame_slot % self.slots.len();
        let slot = &mut self.slots[index];

        let len = bytes.len() as u64;
        if len > slot.buffer.size() {
            let _span = tracy_client::span!("PerFrameBuffer::grow");
            let mut size = slot.buffer.size();
            while size < len {
                size *= 2;
            }
            let new_buffer = Self::create_buffer(ctx, size, &self.name, index, slot.generation + 1)?;
            ctx.bindless_manager().rebind_buffer(slot.bindless_index, &new_buffer);
            log::debug!("buffer `{}` slot {index} grows {} -> {size}", self.name, slot.buffer.size());

            let old = std::mem::replace(&mut slot.buffer, new_buffer);
            ctx.retire_buffer(old, frame_id);
            slot.generation += 1;
        }

        if !bytes.is_empty() {
            slot.buffer.write_at(0, bytes)?;
            slot.buffer.flush_range(0, len)?;
        }
        slot.version = Some(version);
        Ok(())
    }
}
