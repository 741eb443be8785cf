use slotmap::SlotMap;
use vela_animation::animations::Animations;
use vela_animation::skeleton::Skeleton;
use vela_gfx::error::GfxResult;
use vela_gfx::resources::image::GfxTexture;
use vela_render_interface::instance_buffer::InstanceBuffer;
use vela_render_interface::per_frame_buffer::PerFrameBuffer;
use vela_render_interface::render_context::RenderContext;

use crate::material::Material;
use crate::model::Model;

slotmap::new_key_type! { pub struct ModelHandle; }
slotmap::new_key_type! { pub struct MaterialHandle; }
slotmap::new_key_type! { pub struct TextureHandle; }
slotmap::new_key_type! { pub struct RigHandle; }
slotmap::new_key_type! { pub struct InstanceBufferHandle; }

/// 场景持有的纹理及其 bindless 槽位
pub struct SceneTexture {
    pub texture: GfxTexture,
    pub bindless_index: u32,
}

/// 骨骼、动画以及着色器读取的关节矩阵缓冲
///
/// 关节矩阵缓冲每个帧槽位一份，host visible 且始终映射，大小为 `joints * size_of::<Mat4>()`。
/// 动画推进时 `version` 递增，各槽位在各自的帧里按需重新上传。
pub struct Rig {
    skeleton: Skeleton,
    animations: Animations,

    joint_buffers: PerFrameBuffer,
    version: u64,
}
// new & init
impl Rig {
    pub fn new(ctx: &RenderContext, mut skeleton: Skeleton, animations: Animations) -> GfxResult<Self> {
        let size = (skeleton.joint_count().max(1) * size_of::<glam::Mat4>()) as u64;
        let joint_buffers = PerFrameBuffer::new(ctx, size, format!("{}-joints", skeleton.name()))?;

        skeleton.update();
        let mut rig = Self {
            skeleton,
            animations,
            joint_buffers,
            version: 0,
        };
        // 新建的 buffer 还没有被任何帧读取，全部槽位直接写入绑定姿态
        for slot in 0..rig.joint_buffers.frame_count() {
            rig.upload_joint_matrices(ctx, 0, slot)?;
        }
        Ok(rig)
    }
}
// getters
impl Rig {
    #[inline]
    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    #[inline]
    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    #[inline]
    pub fn animations(&self) -> &Animations {
        &self.animations
    }

    #[inline]
    pub fn animations_mut(&mut self) -> &mut Animations {
        &mut self.animations
    }

    #[inline]
    pub fn joint_buffers(&self) -> &PerFrameBuffer {
        &self.joint_buffers
    }

    #[inline]
    pub fn joint_buffer_index(&self, frame_slot: usize) -> u32 {
        self.joint_buffers.bindless_index(frame_slot)
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }
}
// update
impl Rig {
    /// 推进当前动画，返回骨骼姿态是否在本帧变化
    pub fn update(&mut self, step: f32, frame_id: u64) -> bool {
        if !self.animations.update(step, &mut self.skeleton, frame_id) {
            return false;
        }
        self.version += 1;
        true
    }

    /// # Phase: Before Render
    ///
    /// 当前帧槽位的关节矩阵过期时重新上传，返回是否发生了上传
    pub fn upload_joint_matrices(&mut self, ctx: &RenderContext, frame_id: u64, frame_slot: usize) -> GfxResult<bool> {
        if self.joint_buffers.version(frame_slot) == Some(self.version) {
            return Ok(false);
        }
        let matrices = self.skeleton.final_joint_matrices();
        self.joint_buffers.write(ctx, frame_id, frame_slot, bytemuck::cast_slice(matrices), self.version)?;
        Ok(true)
    }
}

/// 场景中共享的资源，组件通过句柄引用
#[derive(Default)]
pub struct SceneResources {
    pub models: SlotMap<ModelHandle, Model>,
    pub materials: SlotMap<MaterialHandle, Material>,
    pub textures: SlotMap<TextureHandle, SceneTexture>,
    pub rigs: SlotMap<RigHandle, Rig>,
    pub instance_buffers: SlotMap<InstanceBufferHandle, InstanceBuffer>,
}
impl SceneResources {
    pub fn new() -> Self {
        Self::default()
    }
}
impl Drop for SceneResources {
    fn drop(&mut self) {
        log::info!(
            "Dropping SceneResources: {} models, {} materials, {} textures, {} rigs, {} instance buffers",
            self.models.len(),
            self.materials.len(),
            self.textures.len(),
            self.rigs.len(),
            self.instance_buffers.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use glam::{Mat4, Quat, Vec3};
    use vela_animation::skeleton::Joint;
    use vela_gfx::host::HostBackend;
    use vela_render_interface::pipeline_settings::RendererSettings;

    use super::*;

    #[test]
    fn test_rig_registers_and_uploads_joint_buffer() {
        let host = Arc::new(HostBackend::new());
        let ctx = RenderContext::new(host.clone(), RendererSettings::default()).unwrap();

        let joints = vec![
            Joint::new("root", Mat4::IDENTITY, Vec3::ZERO, Quat::IDENTITY, Vec3::ONE),
            Joint::new("child", Mat4::IDENTITY, Vec3::X, Quat::IDENTITY, Vec3::ONE),
        ];
        let mut joints = joints;
        joints[1].parent = Some(0);
        joints[0].children.push(1);
        let skeleton = Skeleton::new("rig", joints, HashMap::new());

        let mut rig = Rig::new(&ctx, skeleton, Animations::new()).unwrap();
        assert_eq!(rig.joint_buffers().frame_count(), 3);
        for slot in 0..3 {
            let buffer = rig.joint_buffers().buffer(slot);
            assert_eq!(buffer.size(), 128);
            assert_eq!(ctx.bindless_manager().buffer_index(buffer.id()), Some(rig.joint_buffer_index(slot)));

            let bytes = buffer.mapped_bytes().unwrap();
            let second: Mat4 = bytemuck::pod_read_unaligned(&bytes[64..128]);
            assert!(second.w_axis.truncate().abs_diff_eq(Vec3::X, 1e-6));
        }
        assert_ne!(rig.joint_buffer_index(0), rig.joint_buffer_index(1));

        // 姿态没有变化时不重新上传
        assert!(!rig.upload_joint_matrices(&ctx, 1, 1).unwrap());
    }
}
