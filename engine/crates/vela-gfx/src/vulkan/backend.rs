use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use ash::vk::Handle;

use crate::backend::{
    BindlessWrite, BufferDesc, DrawCommand, DrawPushConstants, GfxBackend, GfxBufferMemory, GfxTextureMemory,
    MaterialKind,
};
use crate::error::{GfxError, GfxResult};
use crate::resources::image::GfxImage;
use crate::sampler::GfxSamplerDesc;
use crate::vulkan::bindless_set::BindlessSet;
use crate::vulkan::core::VulkanCore;
use crate::vulkan::frame::{FrameSlot, OffscreenTarget};
use crate::vulkan::memory::{VulkanBufferMemory, VulkanTextureMemory};

/// 创建 [`VulkanBackend`] 所需的参数
#[derive(Debug, Clone)]
pub struct VulkanBackendDesc {
    pub app_name: String,
    pub frames_in_flight: usize,
    pub max_bindless_buffers: u32,
    pub max_bindless_images: u32,
    pub extent: [u32; 2],
    pub enable_validation: bool,
}
impl Default for VulkanBackendDesc {
    fn default() -> Self {
        Self {
            app_name: "vela".to_string(),
            frames_in_flight: 3,
            max_bindless_buffers: 16384,
            max_bindless_images: 4096,
            extent: [1280, 720],
            enable_validation: cfg!(debug_assertions),
        }
    }
}

struct VulkanFrames {
    slots: Vec<FrameSlot>,
    target: OffscreenTarget,
    pipelines: HashMap<MaterialKind, vk::Pipeline>,
    /// 已经报告过缺少 pipeline 的材质
    missing_pipelines: HashSet<MaterialKind>,
    recording_slot: Option<usize>,
}

pub struct VulkanBackend {
    core: Arc<VulkanCore>,
    bindless_set: BindlessSet,
    pipeline_layout: vk::PipelineLayout,
    frames: Mutex<VulkanFrames>,
}
// new & init
impl VulkanBackend {
    pub fn new(desc: &VulkanBackendDesc) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanBackend::new");

        let core = Arc::new(VulkanCore::new(&desc.app_name, desc.enable_validation)?);
        let device = core.device();

        let limits = core.limits();
        let max_buffers = desc.max_bindless_buffers.min(limits.max_descriptor_set_storage_buffers);
        if max_buffers < desc.max_bindless_buffers {
            log::warn!(
                "device supports only {} storage buffers per set, requested {}",
                max_buffers,
                desc.max_bindless_buffers
            );
        }
        let bindless_set = BindlessSet::new(device, max_buffers, desc.max_bindless_images)?;

        let push_constant_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
            .offset(0)
            .size(size_of::<DrawPushConstants>() as u32);
        let set_layouts = [bindless_set.layout()];
        let pipeline_layout = unsafe {
            device.create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default()
                    .set_layouts(&set_layouts)
                    .push_constant_ranges(std::slice::from_ref(&push_constant_range)),
                None,
            )?
        };

        let slots = (0..desc.frames_in_flight.max(1))
            .map(|_| FrameSlot::new(device, core.queue_family_index()))
            .collect::<GfxResult<Vec<_>>>()?;
        let target = OffscreenTarget::new(
            &core,
            vk::Extent2D {
                width: desc.extent[0],
                height: desc.extent[1],
            },
        )?;

        log::info!("vulkan backend ready: {} frames in flight", slots.len());
        Ok(Self {
            core,
            bindless_set,
            pipeline_layout,
            frames: Mutex::new(VulkanFrames {
                slots,
                target,
                pipelines: HashMap::new(),
                missing_pipelines: HashSet::new(),
                recording_slot: None,
            }),
        })
    }
}
impl Drop for VulkanBackend {
    fn drop(&mut self) {
        log::info!("destroying vulkan backend");
        let device = self.core.device();
        unsafe {
            let _ = device.device_wait_idle();
        }

        let mut frames = self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        unsafe {
            for (_, pipeline) in frames.pipelines.drain() {
                device.destroy_pipeline(pipeline, None);
            }
            device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
        for slot in &frames.slots {
            slot.destroy(device);
        }
        frames.target.destroy(&self.core);
        self.bindless_set.destroy(device);
    }
}
// getters
impl VulkanBackend {
    #[inline]
    pub fn core(&self) -> &Arc<VulkanCore> {
        &self.core
    }

    /// 应用创建 pipeline 时需要使用的 layout：set 0 为 bindless set，带一段 push constant
    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.lock_frames().target.extent()
    }
}
// pipelines
impl VulkanBackend {
    /// 为某种材质注册 pipeline，backend 负责销毁
    pub fn set_pipeline(&self, kind: MaterialKind, pipeline: vk::Pipeline) {
        let mut frames = self.lock_frames();
        if let Some(old) = frames.pipelines.insert(kind, pipeline) {
            let _guard = self.core.lock_device();
            unsafe {
                let _ = self.core.device().device_wait_idle();
                self.core.device().destroy_pipeline(old, None);
            }
        }
        frames.missing_pipelines.remove(&kind);
    }

    fn lock_frames(&self) -> MutexGuard<'_, VulkanFrames> {
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
impl GfxBackend for VulkanBackend {
    fn name(&self) -> &str {
        "vulkan"
    }

    fn create_buffer(&self, desc: &BufferDesc) -> GfxResult<Box<dyn GfxBufferMemory>> {
        Ok(Box::new(VulkanBufferMemory::new(self.core.clone(), desc)?))
    }

    fn copy_buffer(&self, src: &dyn GfxBufferMemory, dst: &mut dyn GfxBufferMemory, size: u64) -> GfxResult<()> {
        let src = vk::Buffer::from_raw(src.raw_handle());
        let dst = vk::Buffer::from_raw(dst.raw_handle());
        self.core.one_time_exec(
            |device, cmd| unsafe {
                device.cmd_copy_buffer(cmd, src, dst, &[vk::BufferCopy { size, ..Default::default() }]);
            },
            "copy-buffer",
        )
    }

    fn create_texture(&self, image: &GfxImage, sampler: &GfxSamplerDesc) -> GfxResult<Box<dyn GfxTextureMemory>> {
        Ok(Box::new(VulkanTextureMemory::new(self.core.clone(), image, sampler)?))
    }

    fn update_descriptor_sets(&self, writes: &[BindlessWrite]) -> GfxResult<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let _span = tracy_client::span!("VulkanBackend::update_descriptor_sets");
        let _guard = self.core.lock_device();
        self.bindless_set.write(self.core.device(), writes);
        Ok(())
    }

    fn begin_frame(&self, frame_id: u64, frame_slot: usize) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanBackend::begin_frame");
        let mut frames = self.lock_frames();
        if frames.recording_slot.is_some() {
            return Err(GfxError::GpuApi(format!("frame {frame_id} begun while another frame is recording")));
        }
        let slot_index = frame_slot % frames.slots.len();
        let slot = &frames.slots[slot_index];
        let device = self.core.device();

        unsafe {
            // 等待该槽位上一次提交完成
            device.wait_for_fences(std::slice::from_ref(&slot.fence), true, u64::MAX)?;
            device.reset_fences(std::slice::from_ref(&slot.fence))?;
            device.reset_command_pool(slot.command_pool, vk::CommandPoolResetFlags::empty())?;
            device.begin_command_buffer(
                slot.command_buffer,
                &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }
        let cmd = slot.command_buffer;
        frames.target.begin_rendering(device, cmd);
        unsafe {
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                0,
                &[self.bindless_set.handle()],
                &[],
            );
        }
        frames.recording_slot = Some(slot_index);
        log::trace!("begin frame {} in slot {}", frame_id, slot_index);
        Ok(())
    }

    fn record_draws(&self, draws: &[DrawCommand]) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanBackend::record_draws");
        let mut guard = self.lock_frames();
        let frames = &mut *guard;
        let slot_index =
            frames.recording_slot.ok_or_else(|| GfxError::GpuApi("record_draws outside of a frame".to_string()))?;
        let cmd = frames.slots[slot_index].command_buffer;
        let device = self.core.device();

        for draw in draws {
            let Some(&pipeline) = frames.pipelines.get(&draw.kind) else {
                if frames.missing_pipelines.insert(draw.kind) {
                    log::warn!("no pipeline registered for {:?}, draws skipped", draw.kind);
                }
                continue;
            };
            unsafe {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                device.cmd_bind_vertex_buffers(cmd, 0, &[vk::Buffer::from_raw(draw.vertex_buffer)], &[0]);
                device.cmd_push_constants(
                    cmd,
                    self.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                    0,
                    bytemuck::bytes_of(&draw.push_constants),
                );
                match draw.index_buffer {
                    Some(index_buffer) => {
                        device.cmd_bind_index_buffer(
                            cmd,
                            vk::Buffer::from_raw(index_buffer),
                            0,
                            vk::IndexType::UINT32,
                        );
                        device.cmd_draw_indexed(
                            cmd,
                            draw.index_count,
                            draw.instance_count,
                            draw.first_index,
                            draw.first_vertex as i32,
                            0,
                        );
                    }
                    None => device.cmd_draw(cmd, draw.vertex_count, draw.instance_count, draw.first_vertex, 0),
                }
            }
        }
        Ok(())
    }

    fn end_frame(&self) -> GfxResult<()> {
        let _span = tracy_client::span!("VulkanBackend::end_frame");
        let mut frames = self.lock_frames();
        let slot_index =
            frames.recording_slot.take().ok_or_else(|| GfxError::GpuApi("end_frame without begin_frame".to_string()))?;
        let slot = &frames.slots[slot_index];
        let device = self.core.device();

        unsafe {
            device.cmd_end_rendering(slot.command_buffer);
            device.end_command_buffer(slot.command_buffer)?;

            let command_buffers = [slot.command_buffer];
            let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
            let _guard = self.core.lock_device();
            device.queue_submit(self.core.queue(), std::slice::from_ref(&submit), slot.fence)?;
        }
        Ok(())
    }

    fn wait_idle(&self) -> GfxResult<()> {
        let _guard = self.core.lock_device();
        unsafe { self.core.device().device_wait_idle()? };
        Ok(())
    }
}
