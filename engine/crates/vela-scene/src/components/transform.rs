use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::ecs::Component;

/// 平移/旋转/缩放，以及缓存的局部矩阵与全局矩阵
///
/// 修改 TRS 后置脏标记；场景图在下一次 `update_transforms` 中重新计算全局矩阵并清除标记。
#[derive(Debug, Clone)]
pub struct Transform {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,

    local: Mat4,
    global: Mat4,

    dirty: bool,
    /// 最近一次重新计算全局矩阵所在的帧
    last_updated_frame: Option<u64>,
}
impl Component for Transform {}

impl Default for Transform {
    fn default() -> Self {
        Self::new(Vec3::ZERO, Quat::IDENTITY, Vec3::ONE)
    }
}

// new & init
impl Transform {
    pub fn new(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let local = Mat4::from_scale_rotation_translation(scale, rotation, translation);
        Self {
            translation,
            rotation,
            scale,
            local,
            global: local,
            dirty: true,
            last_updated_frame: None,
        }
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self::new(translation, rotation, scale)
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::IDENTITY, Vec3::ONE)
    }
}

// getters
impl Transform {
    #[inline]
    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    #[inline]
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    #[inline]
    pub fn local_matrix(&self) -> Mat4 {
        self.local
    }

    #[inline]
    pub fn global_matrix(&self) -> Mat4 {
        self.global
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn last_updated_frame(&self) -> Option<u64> {
        self.last_updated_frame
    }
}

// update
impl Transform {
    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.refresh_local();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation.normalize();
        self.refresh_local();
    }

    /// 欧拉角（弧度，XYZ 顺序）
    pub fn set_rotation_euler(&mut self, euler: Vec3) {
        self.set_rotation(Quat::from_euler(EulerRot::XYZ, euler.x, euler.y, euler.z));
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.refresh_local();
    }

    pub fn set_trs(&mut self, translation: Vec3, rotation: Quat, scale: Vec3) {
        self.translation = translation;
        self.rotation = rotation;
        self.scale = scale;
        self.refresh_local();
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// 由场景图调用：写入新的全局矩阵并清除脏标记
    pub fn set_global(&mut self, parent_global: Mat4, frame_id: u64) {
        self.global = parent_global * self.local;
        self.dirty = false;
        self.last_updated_frame = Some(frame_id);
    }

    fn refresh_local(&mut self) {
        self.local = Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation);
        self.dirty = true;
    }
}
