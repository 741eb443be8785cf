use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};

/// 骨骼中的单个关节
#[derive(Debug, Clone)]
pub struct Joint {
    pub name: String,
    pub inverse_bind_matrix: Mat4,

    /// `None` 表示根关节；加载后保证 `parent < self`
    pub parent: Option<usize>,
    pub children: Vec<usize>,

    /// 绑定姿势下的局部变换
    pub rest_translation: Vec3,
    pub rest_rotation: Quat,
    pub rest_scale: Vec3,

    /// 动画驱动的局部变换
    pub deformed_translation: Vec3,
    pub deformed_rotation: Quat,
    pub deformed_scale: Vec3,
}
impl Joint {
    pub fn new(name: impl Into<String>, inverse_bind_matrix: Mat4, translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            name: name.into(),
            inverse_bind_matrix,
            parent: None,
            children: Vec::new(),
            rest_translation: translation,
            rest_rotation: rotation,
            rest_scale: scale,
            deformed_translation: translation,
            deformed_rotation: rotation,
            deformed_scale: scale,
        }
    }

    #[inline]
    pub fn deformed_local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.deformed_scale, self.deformed_rotation, self.deformed_translation)
    }

    #[inline]
    pub fn reset_to_bind_pose(&mut self) {
        self.deformed_translation = self.rest_translation;
        self.deformed_rotation = self.rest_rotation;
        self.deformed_scale = self.rest_scale;
    }
}

/// 骨骼：扁平的关节数组与每帧上传给着色器的最终矩阵
#[derive(Debug, Clone)]
pub struct Skeleton {
    name: String,
    joints: Vec<Joint>,
    final_joint_matrices: Vec<Mat4>,

    /// glTF 节点索引 -> 关节索引
    node_to_joint: HashMap<usize, usize>,
}
// new & init
impl Skeleton {
    pub fn new(name: impl Into<String>, joints: Vec<Joint>, node_to_joint: HashMap<usize, usize>) -> Self {
        let mut skeleton = Self {
            name: name.into(),
            final_joint_matrices: vec![Mat4::IDENTITY; joints.len()],
            joints,
            node_to_joint,
        };
        debug_assert!(skeleton.is_topologically_ordered(), "joints must be ordered parents first");
        skeleton.update();
        skeleton
    }
}
// getters
impl Skeleton {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    #[inline]
    pub fn joints_mut(&mut self) -> &mut [Joint] {
        &mut self.joints
    }

    #[inline]
    pub fn joint_count(&self) -> usize {
        self.joints.len()
    }

    #[inline]
    pub fn final_joint_matrices(&self) -> &[Mat4] {
        &self.final_joint_matrices
    }

    #[inline]
    pub fn joint_index_by_node(&self, node_index: usize) -> Option<usize> {
        self.node_to_joint.get(&node_index).copied()
    }

    pub fn joint_index_by_name(&self, name: &str) -> Option<usize> {
        self.joints.iter().position(|j| j.name == name)
    }

    /// 每个有父节点的关节都排在父节点之后
    pub fn is_topologically_ordered(&self) -> bool {
        self.joints.iter().enumerate().all(|(i, j)| j.parent.is_none_or(|p| p < i))
    }
}
// update
impl Skeleton {
    /// 重新计算最终关节矩阵
    ///
    /// `final[i] = final[parent(i)] * local(i)`，关节已按父节点优先排列，单次遍历即可；
    /// 最后乘上逆绑定矩阵。
    pub fn update(&mut self) {
        let _span = tracy_client::span!("Skeleton::update");

        for (i, joint) in self.joints.iter().enumerate() {
            self.final_joint_matrices[i] = joint.deformed_local_matrix();
        }
        for (i, joint) in self.joints.iter().enumerate() {
            if let Some(parent) = joint.parent {
                self.final_joint_matrices[i] = self.final_joint_matrices[parent] * self.final_joint_matrices[i];
            }
        }
        for (i, joint) in self.joints.iter().enumerate() {
            self.final_joint_matrices[i] *= joint.inverse_bind_matrix;
        }
    }

    pub fn reset_to_bind_pose(&mut self) {
        self.joints.iter_mut().for_each(Joint::reset_to_bind_pose);
        self.update();
    }
}
