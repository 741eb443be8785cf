use std::any::Any;
use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use vk_mem::Alloc;

use crate::backend::{BufferDesc, GfxBufferMemory, GfxTextureMemory};
use crate::error::{GfxError, GfxResult};
use crate::resources::buffer::BufferUsage;
use crate::resources::image::{GfxImage, ImageFormat};
use crate::sampler::GfxSamplerDesc;
use crate::vulkan::core::VulkanCore;

/// vma 分配的 buffer
pub struct VulkanBufferMemory {
    core: Arc<VulkanCore>,

    handle: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,

    /// 只在 map 与 unmap 之间有值
    map_ptr: Option<*mut u8>,
}
// map_ptr 只在持有 &mut self 时写入
unsafe impl Send for VulkanBufferMemory {}
unsafe impl Sync for VulkanBufferMemory {}

impl Drop for VulkanBufferMemory {
    fn drop(&mut self) {
        let allocator = self.core.allocator();
        unsafe {
            if self.map_ptr.take().is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }
            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// new & init
impl VulkanBufferMemory {
    pub fn new(core: Arc<VulkanCore>, desc: &BufferDesc) -> GfxResult<Self> {
        let buffer_ci = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(Self::vk_usage(desc.usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let alloc_ci = match desc.usage {
            BufferUsage::Staging => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
            usage if usage.is_host_visible() => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
                ..Default::default()
            },
            _ => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
        };

        let (handle, allocation) = unsafe { core.allocator().create_buffer(&buffer_ci, &alloc_ci) }
            .map_err(|e| GfxError::GpuAlloc(format!("buffer `{}` ({} bytes): {:?}", desc.name, desc.size, e)))?;

        Ok(Self {
            core,
            handle,
            allocation,
            size: desc.size,
            map_ptr: None,
        })
    }

    fn vk_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
        match usage {
            BufferUsage::UniformHostVisible => vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            BufferUsage::StorageHostVisible => {
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_SRC
                    | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::VertexDevice => {
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::IndexDevice => vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }
}
impl GfxBufferMemory for VulkanBufferMemory {
    fn map(&mut self) -> GfxResult<()> {
        if self.map_ptr.is_none() {
            let ptr = unsafe { self.core.allocator().map_memory(&mut self.allocation)? };
            self.map_ptr = Some(ptr);
        }
        Ok(())
    }

    fn unmap(&mut self) {
        if self.map_ptr.take().is_some() {
            unsafe { self.core.allocator().unmap_memory(&mut self.allocation) };
        }
    }

    fn mapped_slice(&self) -> Option<&[u8]> {
        self.map_ptr.map(|ptr| unsafe { std::slice::from_raw_parts(ptr as *const u8, self.size as usize) })
    }

    fn mapped_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.map_ptr.map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr, self.size as usize) })
    }

    fn flush(&self, offset: u64, size: u64) -> GfxResult<()> {
        self.core.allocator().flush_allocation(&self.allocation, offset, size)?;
        Ok(())
    }

    fn raw_handle(&self) -> u64 {
        self.handle.as_raw()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// vma 分配的 2D 纹理，带 view 与 sampler
pub struct VulkanTextureMemory {
    core: Arc<VulkanCore>,

    image: vk::Image,
    allocation: vk_mem::Allocation,
    view: vk::ImageView,
    sampler: vk::Sampler,
}
unsafe impl Send for VulkanTextureMemory {}
unsafe impl Sync for VulkanTextureMemory {}

impl Drop for VulkanTextureMemory {
    fn drop(&mut self) {
        unsafe {
            self.core.device().destroy_sampler(self.sampler, None);
            self.core.device().destroy_image_view(self.view, None);
            self.core.allocator().destroy_image(self.image, &mut self.allocation);
        }
    }
}
// new & init
impl VulkanTextureMemory {
    /// 创建 image，通过 stage buffer 上传像素，并转换到 SHADER_READ_ONLY_OPTIMAL
    pub fn new(core: Arc<VulkanCore>, image: &GfxImage, sampler_desc: &GfxSamplerDesc) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanTextureMemory::new");

        let format = Self::vk_format(image.format());
        let extent = vk::Extent3D {
            width: image.width(),
            height: image.height(),
            depth: 1,
        };
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (vk_image, mut allocation) = unsafe { core.allocator().create_image(&image_ci, &alloc_ci) }
            .map_err(|e| GfxError::GpuAlloc(format!("image `{}`: {:?}", image.name(), e)))?;

        // 上传像素
        let upload = Self::upload_pixels(&core, vk_image, extent, image);
        if let Err(e) = upload {
            unsafe { core.allocator().destroy_image(vk_image, &mut allocation) };
            return Err(e);
        }

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(vk_image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(Self::color_range());
        let view = unsafe { core.device().create_image_view(&view_ci, None)? };
        let sampler = unsafe { core.device().create_sampler(&sampler_desc.to_vk_create_info(), None)? };

        Ok(Self {
            core,
            image: vk_image,
            allocation,
            view,
            sampler,
        })
    }

    fn upload_pixels(core: &Arc<VulkanCore>, vk_image: vk::Image, extent: vk::Extent3D, image: &GfxImage) -> GfxResult<()> {
        let mut stage = VulkanBufferMemory::new(
            core.clone(),
            &BufferDesc {
                size: image.pixels().len() as u64,
                usage: BufferUsage::Staging,
                name: format!("{}-stage-buffer", image.name()),
            },
        )?;
        stage.map()?;
        if let Some(dst) = stage.mapped_slice_mut() {
            dst.copy_from_slice(image.pixels());
        }
        stage.flush(0, vk::WHOLE_SIZE)?;
        stage.unmap();

        let stage_buffer = stage.vk_buffer();
        core.one_time_exec(
            |device, cmd| unsafe {
                let to_transfer = vk::ImageMemoryBarrier::default()
                    .image(vk_image)
                    .subresource_range(Self::color_range())
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_access_mask(vk::AccessFlags::empty())
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE);
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_transfer),
                );

                let region = vk::BufferImageCopy::default()
                    .image_subresource(
                        vk::ImageSubresourceLayers::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .mip_level(0)
                            .base_array_layer(0)
                            .layer_count(1),
                    )
                    .image_extent(extent);
                device.cmd_copy_buffer_to_image(
                    cmd,
                    stage_buffer,
                    vk_image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    std::slice::from_ref(&region),
                );

                let to_shader = vk::ImageMemoryBarrier::default()
                    .image(vk_image)
                    .subresource_range(Self::color_range())
                    .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                    .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .dst_access_mask(vk::AccessFlags::SHADER_READ);
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    std::slice::from_ref(&to_shader),
                );
            },
            image.name(),
        )
    }

    fn color_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1)
    }

    pub fn vk_format(format: ImageFormat) -> vk::Format {
        match format {
            ImageFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            ImageFormat::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            ImageFormat::R16Unorm => vk::Format::R16_UNORM,
            ImageFormat::Rgba16Unorm => vk::Format::R16G16B16A16_UNORM,
            ImageFormat::R32Float => vk::Format::R32_SFLOAT,
            ImageFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
        }
    }
}
impl GfxTextureMemory for VulkanTextureMemory {
    fn view_handle(&self) -> u64 {
        self.view.as_raw()
    }

    fn sampler_handle(&self) -> u64 {
        self.sampler.as_raw()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
