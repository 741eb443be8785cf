use ash::vk;
use ash::vk::Handle;
use itertools::Itertools;

use crate::backend::BindlessWrite;
use crate::error::GfxResult;

pub const STORAGE_BUFFER_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;

/// 全局唯一的 bindless descriptor set
///
/// 使用 UPDATE_AFTER_BIND + PARTIALLY_BOUND，新注册的槽位可以在帧之间直接写入。
pub struct BindlessSet {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}
// new & init
impl BindlessSet {
    pub fn new(device: &ash::Device, max_buffers: u32, max_images: u32) -> GfxResult<Self> {
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(STORAGE_BUFFER_BINDING)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(max_buffers)
                .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS | vk::ShaderStageFlags::COMPUTE),
            vk::DescriptorSetLayoutBinding::default()
                .binding(TEXTURE_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(max_images)
                .stage_flags(vk::ShaderStageFlags::ALL_GRAPHICS | vk::ShaderStageFlags::COMPUTE),
        ];
        let binding_flags = [vk::DescriptorBindingFlags::PARTIALLY_BOUND
            | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
            | vk::DescriptorBindingFlags::UPDATE_UNUSED_WHILE_PENDING; 2];
        let mut binding_flags_ci = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

        let layout = unsafe {
            device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default()
                    .bindings(&bindings)
                    .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
                    .push_next(&mut binding_flags_ci),
                None,
            )?
        };

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: max_buffers,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: max_images,
            },
        ];
        let pool = unsafe {
            device.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .pool_sizes(&pool_sizes)
                    .max_sets(1)
                    .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND),
                None,
            )?
        };

        let layouts = [layout];
        let set = unsafe {
            device.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(&layouts),
            )?[0]
        };
        log::info!("bindless descriptor set created: {} buffers, {} images", max_buffers, max_images);

        Ok(Self { layout, pool, set })
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_descriptor_pool(self.pool, None);
            device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
// getters
impl BindlessSet {
    #[inline]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }
}
// tools
impl BindlessSet {
    /// 将一批写入转换为一次 `vkUpdateDescriptorSets` 调用
    ///
    /// 调用者需要持有设备访问锁
    pub fn write(&self, device: &ash::Device, writes: &[BindlessWrite]) {
        // info 数组需要在 update 调用之前保持有效
        let buffer_infos = writes
            .iter()
            .map(|w| match w {
                BindlessWrite::StorageBuffer { buffer, .. } => vk::DescriptorBufferInfo::default()
                    .buffer(vk::Buffer::from_raw(buffer.raw_handle))
                    .offset(0)
                    .range(vk::WHOLE_SIZE),
                BindlessWrite::Texture { .. } => vk::DescriptorBufferInfo::default(),
            })
            .collect_vec();
        let image_infos = writes
            .iter()
            .map(|w| match w {
                BindlessWrite::Texture { texture, .. } => vk::DescriptorImageInfo::default()
                    .image_view(vk::ImageView::from_raw(texture.view_handle))
                    .sampler(vk::Sampler::from_raw(texture.sampler_handle))
                    .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                BindlessWrite::StorageBuffer { .. } => vk::DescriptorImageInfo::default(),
            })
            .collect_vec();

        let vk_writes = writes
            .iter()
            .enumerate()
            .map(|(i, w)| match w {
                BindlessWrite::StorageBuffer { index, .. } => vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(STORAGE_BUFFER_BINDING)
                    .dst_array_element(*index)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .buffer_info(std::slice::from_ref(&buffer_infos[i])),
                BindlessWrite::Texture { index, .. } => vk::WriteDescriptorSet::default()
                    .dst_set(self.set)
                    .dst_binding(TEXTURE_BINDING)
                    .dst_array_element(*index)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(std::slice::from_ref(&image_infos[i])),
            })
            .collect_vec();

        unsafe { device.update_descriptor_sets(&vk_writes, &[]) };
    }
}
