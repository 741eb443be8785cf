use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Mutex, MutexGuard};

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxError, GfxResult};
use crate::vulkan::debug_messenger::DebugMsger;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan 的核心对象：instance、physical device、device、queue、vma
///
/// 所有访问 queue 或 command pool 的操作都需要先持有 `device_lock`。
pub struct VulkanCore {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_msger: Option<DebugMsger>,

    pdevice: vk::PhysicalDevice,
    pdevice_props: vk::PhysicalDeviceProperties,

    device: ash::Device,
    queue_family_index: u32,
    queue: vk::Queue,

    allocator: ManuallyDrop<vk_mem::Allocator>,

    one_time_pool: vk::CommandPool,
    device_lock: Mutex<()>,
}
// 所有可变状态都在 device_lock 之后，vma 本身是线程安全的
unsafe impl Send for VulkanCore {}
unsafe impl Sync for VulkanCore {}

// new & init
impl VulkanCore {
    pub fn new(app_name: &str, enable_validation: bool) -> GfxResult<Self> {
        let _span = tracy_client::span!("VulkanCore::new");

        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GfxError::Unsupported(format!("failed to load vulkan library: {e}")))?;

        let layers = if enable_validation { Self::available_layers(&entry, &[VALIDATION_LAYER]) } else { vec![] };
        let debug_utils_available = Self::has_instance_ext(&entry, ash::ext::debug_utils::NAME);
        let mut instance_exts = vec![];
        if debug_utils_available {
            instance_exts.push(ash::ext::debug_utils::NAME.as_ptr());
        }

        let app_name_c = CString::new(app_name).unwrap_or_else(|_| c"vela".to_owned());
        let app_info = vk::ApplicationInfo::default()
            .api_version(vk::API_VERSION_1_3) // 版本过低时，有些函数无法正确加载
            .application_name(&app_name_c)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"vela")
            .engine_version(vk::make_api_version(0, 1, 0, 0));
        let layer_ptrs = layers.iter().map(|l| l.as_ptr()).collect_vec();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&instance_exts)
            .enabled_layer_names(&layer_ptrs);
        let instance = unsafe { entry.create_instance(&instance_ci, None)? };
        log::info!("vulkan instance created, layers: {:?}", layers);

        let debug_msger = if debug_utils_available && !layers.is_empty() {
            DebugMsger::new(&entry, &instance)
        } else {
            None
        };

        let (pdevice, pdevice_props, queue_family_index) = Self::pick_physical_device(&instance)?;
        let device = Self::create_device(&instance, pdevice, queue_family_index)?;
        let queue = unsafe { device.get_device_queue(queue_family_index, 0) };

        let mut vma_ci = vk_mem::AllocatorCreateInfo::new(&instance, &device, pdevice);
        vma_ci.vulkan_api_version = vk::API_VERSION_1_3;
        let allocator = unsafe { vk_mem::Allocator::new(vma_ci)? };

        let one_time_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT),
                None,
            )?
        };

        Ok(Self {
            _entry: entry,
            instance,
            debug_msger,
            pdevice,
            pdevice_props,
            device,
            queue_family_index,
            queue,
            allocator: ManuallyDrop::new(allocator),
            one_time_pool,
            device_lock: Mutex::new(()),
        })
    }

    fn available_layers(entry: &ash::Entry, wanted: &[&'static CStr]) -> Vec<&'static CStr> {
        let props = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
        wanted
            .iter()
            .copied()
            .filter(|w| props.iter().any(|p| p.layer_name_as_c_str().is_ok_and(|name| name == *w)))
            .collect()
    }

    fn has_instance_ext(entry: &ash::Entry, ext: &CStr) -> bool {
        let props = unsafe { entry.enumerate_instance_extension_properties(None) }.unwrap_or_default();
        props.iter().any(|p| p.extension_name_as_c_str().is_ok_and(|name| name == ext))
    }

    /// 优先选择独立显卡，如果没有则选择第一个带 graphics queue 的显卡
    fn pick_physical_device(instance: &ash::Instance) -> GfxResult<(vk::PhysicalDevice, vk::PhysicalDeviceProperties, u32)> {
        let pdevices = unsafe { instance.enumerate_physical_devices()? };
        let candidates = pdevices
            .into_iter()
            .filter_map(|pdevice| {
                let props = unsafe { instance.get_physical_device_properties(pdevice) };
                if props.api_version < vk::API_VERSION_1_3 {
                    return None;
                }
                let queue_families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
                let family = queue_families
                    .iter()
                    .position(|q| q.queue_flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER))?;
                Some((pdevice, props, family as u32))
            })
            .collect_vec();

        let picked = candidates
            .into_iter()
            .find_or_first(|(_, props, _)| props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
            .ok_or_else(|| GfxError::Unsupported("no vulkan 1.3 device with a graphics queue".to_string()))?;

        let name = picked.1.device_name_as_c_str().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        log::info!("picked gpu: {}", name);
        Ok(picked)
    }

    fn create_device(instance: &ash::Instance, pdevice: vk::PhysicalDevice, queue_family_index: u32) -> GfxResult<ash::Device> {
        let priorities = [1.0];
        let queue_cis = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&priorities)];

        let basic_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default().dynamic_rendering(true);
        let mut sync2 = vk::PhysicalDeviceSynchronization2Features::default().synchronization2(true);
        let mut draw_params = vk::PhysicalDeviceShaderDrawParametersFeatures::default().shader_draw_parameters(true);
        let mut indexing = vk::PhysicalDeviceDescriptorIndexingFeatures::default()
            .descriptor_binding_partially_bound(true) // 即使一些 descriptor 是 invalid
            .runtime_descriptor_array(true)
            .descriptor_binding_storage_buffer_update_after_bind(true)
            .descriptor_binding_sampled_image_update_after_bind(true)
            .descriptor_binding_update_unused_while_pending(true)
            .shader_storage_buffer_array_non_uniform_indexing(true)
            .shader_sampled_image_array_non_uniform_indexing(true);

        let device_ci = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_cis)
            .enabled_features(&basic_features)
            .push_next(&mut dynamic_rendering)
            .push_next(&mut sync2)
            .push_next(&mut draw_params)
            .push_next(&mut indexing);

        Ok(unsafe { instance.create_device(pdevice, &device_ci, None)? })
    }
}
impl Drop for VulkanCore {
    fn drop(&mut self) {
        log::info!("destroying vulkan core");
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.one_time_pool, None);
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            if let Some(debug_msger) = &self.debug_msger {
                debug_msger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}
// getters
impl VulkanCore {
    #[inline]
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> &vk_mem::Allocator {
        &self.allocator
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.pdevice
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.pdevice_props.limits
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    #[inline]
    pub fn queue(&self) -> vk::Queue {
        self.queue
    }

    /// 获取设备访问锁
    pub fn lock_device(&self) -> MutexGuard<'_, ()> {
        self.device_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
// tools
impl VulkanCore {
    /// 录制并同步执行一次性的命令
    pub fn one_time_exec<F, R>(&self, func: F, name: &str) -> GfxResult<R>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer) -> R,
    {
        let _span = tracy_client::span!("VulkanCore::one_time_exec");
        let _guard = self.lock_device();

        let command_buffer = unsafe {
            self.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.one_time_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(1),
            )?[0]
        };

        let result = unsafe {
            self.device.begin_command_buffer(
                command_buffer,
                &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
            let result = func(&self.device, command_buffer);
            self.device.end_command_buffer(command_buffer)?;

            let command_buffers = [command_buffer];
            let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
            self.device.queue_submit(self.queue, std::slice::from_ref(&submit), vk::Fence::null())?;
            self.device.queue_wait_idle(self.queue)?;
            self.device.free_command_buffers(self.one_time_pool, &command_buffers);
            result
        };
        log::trace!("one time exec: {}", name);

        Ok(result)
    }
}
