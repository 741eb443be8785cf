//! 纯 CPU 的渲染后端
//!
//! buffer 与纹理都在内存中，descriptor 写入与 draw 命令会被记录下来供检查。

use std::any::Any;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{
    BindlessWrite, BufferDesc, BufferDescriptor, DrawCommand, GfxBackend, GfxBufferMemory, GfxTextureMemory,
};
use crate::error::{GfxError, GfxResult};
use crate::resources::image::GfxImage;
use crate::sampler::GfxSamplerDesc;

pub struct HostBufferMemory {
    data: Vec<u8>,
    handle: u64,
    mapped: bool,
}
impl GfxBufferMemory for HostBufferMemory {
    fn map(&mut self) -> GfxResult<()> {
        self.mapped = true;
        Ok(())
    }

    fn unmap(&mut self) {
        self.mapped = false;
    }

    fn mapped_slice(&self) -> Option<&[u8]> {
        self.mapped.then_some(self.data.as_slice())
    }

    fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.mapped.then_some(self.data.as_mut_slice())
    }

    fn flush(&self, offset: u64, size: u64) -> GfxResult<()> {
        debug_assert!(offset.saturating_add(size) <= self.data.len() as u64 || size == u64::MAX);
        Ok(())
    }

    fn raw_handle(&self) -> u64 {
        self.handle
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

pub struct HostTextureMemory {
    view: u64,
    sampler: u64,
}
impl GfxTextureMemory for HostTextureMemory {
    fn view_handle(&self) -> u64 {
        self.view
    }

    fn sampler_handle(&self) -> u64 {
        self.sampler
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// 一帧内记录下来的内容
#[derive(Debug, Clone, Default)]
pub struct HostFrame {
    pub frame_id: u64,
    pub frame_slot: usize,
    pub draws: Vec<DrawCommand>,
}

#[derive(Default)]
struct HostRecord {
    /// 每次 `update_descriptor_sets` 调用的写入
    descriptor_updates: Vec<Vec<BindlessWrite>>,
    finished_frames: Vec<HostFrame>,
    current_frame: Option<HostFrame>,
}

pub struct HostBackend {
    next_handle: AtomicU64,
    record: Mutex<HostRecord>,
}
// new & init
impl HostBackend {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            record: Mutex::new(HostRecord::default()),
        }
    }
}
impl Default for HostBackend {
    fn default() -> Self {
        Self::new()
    }
}
// getters
impl HostBackend {
    /// `update_descriptor_sets` 被调用的次数
    pub fn descriptor_update_calls(&self) -> usize {
        self.with_record(|record| record.descriptor_updates.len())
    }

    /// 所有批次中写入过的 descriptor，按提交顺序
    pub fn descriptor_writes(&self) -> Vec<BindlessWrite> {
        self.with_record(|record| record.descriptor_updates.iter().flatten().copied().collect())
    }

    /// 某个 storage buffer 槽位最后一次写入的 buffer
    pub fn bound_buffer(&self, index: u32) -> Option<BufferDescriptor> {
        self.with_record(|record| {
            record.descriptor_updates.iter().flatten().rev().find_map(|write| match write {
                BindlessWrite::StorageBuffer { index: i, buffer } if *i == index => Some(*buffer),
                _ => None,
            })
        })
    }

    pub fn finished_frames(&self) -> Vec<HostFrame> {
        self.with_record(|record| record.finished_frames.clone())
    }

    pub fn last_frame(&self) -> Option<HostFrame> {
        self.with_record(|record| record.finished_frames.last().cloned())
    }

    fn with_record<R>(&self, f: impl FnOnce(&mut HostRecord) -> R) -> R {
        let mut record = self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut record)
    }

    fn alloc_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }
}
impl GfxBackend for HostBackend {
    fn name(&self) -> &str {
        "host"
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GfxResult<Box<dyn GfxBufferMemory>> {
        let size = usize::try_from(desc.size)
            .map_err(|_| GfxError::GpuAlloc(format!("buffer `{}` is too large: {}", desc.name, desc.size)))?;
        Ok(Box::new(HostBufferMemory {
            data: vec![0; size],
            handle: self.alloc_handle(),
            mapped: false,
        }))
    }

    fn copy_buffer(&self, src: &dyn GfxBufferMemory, dst: &mut dyn GfxBufferMemory, size: u64) -> GfxResult<()> {
        let src = src
            .as_any()
            .downcast_ref::<HostBufferMemory>()
            .ok_or_else(|| GfxError::Unsupported("copy from a foreign buffer".to_string()))?;
        let dst = dst
            .as_any_mut()
            .downcast_mut::<HostBufferMemory>()
            .ok_or_else(|| GfxError::Unsupported("copy into a foreign buffer".to_string()))?;

        let size = size as usize;
        if size > src.data.len() || size > dst.data.len() {
            return Err(GfxError::OutOfBounds {
                name: format!("host-buffer-{}", dst.handle),
                offset: 0,
                len: size as u64,
                capacity: dst.data.len().min(src.data.len()) as u64,
            });
        }
        dst.data[..size].copy_from_slice(&src.data[..size]);
        Ok(())
    }

    fn create_texture(&self, image: &GfxImage, _sampler: &GfxSamplerDesc) -> GfxResult<Box<dyn GfxTextureMemory>> {
        log::debug!("host texture `{}` {}x{}", image.name(), image.width(), image.height());
        Ok(Box::new(HostTextureMemory {
            view: self.alloc_handle(),
            sampler: self.alloc_handle(),
        }))
    }

    fn update_descriptor_sets(&self, writes: &[BindlessWrite]) -> GfxResult<()> {
        self.with_record(|record| record.descriptor_updates.push(writes.to_vec()));
        Ok(())
    }

    fn begin_frame(&self, frame_id: u64, frame_slot: usize) -> GfxResult<()> {
        self.with_record(|record| {
            if record.current_frame.is_some() {
                return Err(GfxError::GpuApi(format!("frame {frame_id} begun twice")));
            }
            record.current_frame = Some(HostFrame {
                frame_id,
                frame_slot,
                draws: Vec::new(),
            });
            Ok(())
        })
    }

    fn record_draws(&self, draws: &[DrawCommand]) -> GfxResult<()> {
        self.with_record(|record| match record.current_frame.as_mut() {
            Some(frame) => {
                frame.draws.extend_from_slice(draws);
                Ok(())
            }
            None => Err(GfxError::GpuApi("record_draws outside of a frame".to_string())),
        })
    }

    fn end_frame(&self) -> GfxResult<()> {
        self.with_record(|record| match record.current_frame.take() {
            Some(frame) => {
                record.finished_frames.push(frame);
                Ok(())
            }
            None => Err(GfxError::GpuApi("end_frame without begin_frame".to_string())),
        })
    }

    fn wait_idle(&self) -> GfxResult<()> {
        Ok(())
    }
}
