use std::sync::atomic::{AtomicU64, Ordering};

use crate::backend::{BufferDesc, BufferDescriptor, GfxBackend, GfxBufferMemory};
use crate::error::{GfxError, GfxResult};

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的 buffer 标识，bindless manager 以此作为缓存 key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(u64);
impl BufferId {
    fn next() -> Self {
        Self(NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// buffer 的用途，决定内存类型与 vk usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    UniformHostVisible,
    StorageHostVisible,
    VertexDevice,
    IndexDevice,
    Staging,
}
impl BufferUsage {
    #[inline]
    pub fn is_host_visible(self) -> bool {
        matches!(self, Self::UniformHostVisible | Self::StorageHostVisible | Self::Staging)
    }
}

/// 由后端内存支撑的一段字节
///
/// 映射后的内存只在 `map()` 与 `unmap()` 之间有效；
/// host 写入之后需要 `flush()` 才能保证 GPU 读到。
pub struct GfxBuffer {
    memory: Box<dyn GfxBufferMemory>,

    id: BufferId,
    size: u64,
    usage: BufferUsage,
    mapped: bool,

    name: String,
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        if self.mapped {
            self.memory.unmap();
        }
    }
}
impl std::fmt::Debug for GfxBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GfxBuffer")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .field("mapped", &self.mapped)
            .finish()
    }
}
// new & init
impl GfxBuffer {
    pub fn new(backend: &dyn GfxBackend, size: u64, usage: BufferUsage, name: impl AsRef<str>) -> GfxResult<Self> {
        let name = name.as_ref().to_string();
        if size == 0 {
            return Err(GfxError::GpuAlloc(format!("buffer `{name}` has zero size")));
        }

        let memory = backend.create_buffer(&BufferDesc {
            size,
            usage,
            name: name.clone(),
        })?;

        Ok(Self {
            memory,
            id: BufferId::next(),
            size,
            usage,
            mapped: false,
            name,
        })
    }

    #[inline]
    pub fn new_stage_buffer(backend: &dyn GfxBackend, size: u64, name: impl AsRef<str>) -> GfxResult<Self> {
        Self::new(backend, size, BufferUsage::Staging, name)
    }

    /// 创建 buffer 并填入数据
    ///
    /// host visible 的 buffer 直接写入；device 端的 buffer 通过 stage buffer 同步传输。
    pub fn new_with_data(
        backend: &dyn GfxBackend,
        usage: BufferUsage,
        data: &[u8],
        name: impl AsRef<str>,
    ) -> GfxResult<Self> {
        let mut buffer = Self::new(backend, data.len() as u64, usage, name)?;
        if usage.is_host_visible() {
            buffer.map()?;
            buffer.write_at(0, data)?;
            buffer.flush()?;
        } else {
            buffer.transfer_data_sync(backend, data)?;
        }
        Ok(buffer)
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn id(&self) -> BufferId {
        self.id
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn raw_handle(&self) -> u64 {
        self.memory.raw_handle()
    }

    #[inline]
    pub fn memory(&self) -> &dyn GfxBufferMemory {
        self.memory.as_ref()
    }

    #[inline]
    pub fn descriptor(&self) -> BufferDescriptor {
        BufferDescriptor {
            buffer_id: self.id,
            raw_handle: self.memory.raw_handle(),
            range: self.size,
        }
    }
}
// tools
impl GfxBuffer {
    pub fn map(&mut self) -> GfxResult<()> {
        if !self.usage.is_host_visible() {
            return Err(GfxError::NotHostVisible(self.name.clone()));
        }
        if self.mapped {
            return Err(GfxError::AlreadyMapped(self.name.clone()));
        }
        self.memory.map()?;
        self.mapped = true;
        Ok(())
    }

    pub fn unmap(&mut self) {
        if self.mapped {
            self.memory.unmap();
            self.mapped = false;
        }
    }

    /// 只在映射期间可读
    pub fn mapped_bytes(&self) -> GfxResult<&[u8]> {
        self.memory.mapped_slice().ok_or_else(|| GfxError::NotMapped(self.name.clone()))
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> GfxResult<()> {
        let end = offset.checked_add(bytes.len() as u64);
        if end.is_none_or(|end| end > self.size) {
            return Err(GfxError::OutOfBounds {
                name: self.name.clone(),
                offset,
                len: bytes.len() as u64,
                capacity: self.size,
            });
        }

        let name = &self.name;
        let dst = self.memory.mapped_slice_mut().ok_or_else(|| GfxError::NotMapped(name.clone()))?;
        let offset = offset as usize;
        dst[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    #[inline]
    pub fn write_pod<T: bytemuck::Pod>(&mut self, offset: u64, data: &[T]) -> GfxResult<()> {
        self.write_at(offset, bytemuck::cast_slice(data))
    }

    #[inline]
    pub fn flush(&self) -> GfxResult<()> {
        self.flush_range(0, self.size)
    }

    pub fn flush_range(&self, offset: u64, size: u64) -> GfxResult<()> {
        if !self.mapped {
            return Err(GfxError::NotMapped(self.name.clone()));
        }
        self.memory.flush(offset, size)
    }

    /// 将自身的全部内容拷贝到 `other`
    pub fn copy_to(&self, backend: &dyn GfxBackend, other: &mut GfxBuffer) -> GfxResult<()> {
        if other.size < self.size {
            return Err(GfxError::OutOfBounds {
                name: other.name.clone(),
                offset: 0,
                len: self.size,
                capacity: other.size,
            });
        }
        backend.copy_buffer(self.memory.as_ref(), other.memory.as_mut(), self.size)
    }

    /// 创建一个临时的 stage buffer，先将数据放入 stage buffer，再 transfer 到 self
    ///
    /// 函数是同步等待的，适合加载阶段的大块数据
    pub fn transfer_data_sync(&mut self, backend: &dyn GfxBackend, data: &[u8]) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxBuffer::transfer_data_sync");

        let mut stage_buffer = Self::new_stage_buffer(backend, data.len() as u64, format!("{}-stage-buffer", self.name))?;
        stage_buffer.map()?;
        stage_buffer.write_at(0, data)?;
        stage_buffer.flush()?;
        stage_buffer.unmap();

        stage_buffer.copy_to(backend, self)
    }
}
