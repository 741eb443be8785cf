//! 场景中实体可以挂载的组件

mod transform;

pub use transform::Transform;

use glam::Vec3;

use crate::ecs::{Component, Entity};
use crate::resources::{InstanceBufferHandle, MaterialHandle, ModelHandle, RigHandle};

/// 引用模型中的一个 mesh，`instance_buffers[i]` 对应第 i 个 primitive 的实例缓冲
///
/// 只有规范实体（canonical entity）持有该组件，同一资产的其余实例只挂 `Transform`。
#[derive(Debug, Clone)]
pub struct MeshComponent {
    pub model: ModelHandle,
    pub mesh_index: usize,
    pub instance_buffers: Vec<InstanceBufferHandle>,
}
impl Component for MeshComponent {}

/// mesh 各个 primitive 使用的材质，与 `Mesh::primitives` 一一对应
#[derive(Debug, Clone, Default)]
pub struct MaterialComponent {
    pub materials: Vec<MaterialHandle>,
}
impl Component for MaterialComponent {}

/// 共享同一 mesh 的全部实例，第一个元素是规范实体本身
#[derive(Debug, Clone, Default)]
pub struct InstanceTag {
    pub instances: Vec<Entity>,
}
impl Component for InstanceTag {}

impl InstanceTag {
    pub fn new(canonical: Entity) -> Self {
        Self {
            instances: vec![canonical],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// 点光源，来自 KHR_lights_punctual
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    pub color: Vec3,
    pub intensity: f32,
    /// `None` 表示无限远衰减
    pub range: Option<f32>,
}
impl Component for PointLight {}

/// 持有骨骼与动画的实体
#[derive(Debug, Clone, Copy)]
pub struct SkeletalComponent {
    pub rig: RigHandle,
}
impl Component for SkeletalComponent {}

/// 没有任何贴图时用基础色着色
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDiffuse;
impl Component for DefaultDiffuse {}

/// 使用 PBR 参数但没有贴图
#[derive(Debug, Clone, Copy, Default)]
pub struct PbrNoMap;
impl Component for PbrNoMap {}

/// 刚体占位组件，物理模拟不在引擎核心内
#[derive(Debug, Clone, Copy)]
pub struct Rigidbody {
    pub mass: f32,
    pub velocity: Vec3,
}
impl Component for Rigidbody {}

impl Default for Rigidbody {
    fn default() -> Self {
        Self {
            mass: 1.0,
            velocity: Vec3::ZERO,
        }
    }
}

/// 资产加载时创建的分组节点
#[derive(Debug, Clone, Default)]
pub struct GroupTag {
    pub asset_name: String,
}
impl Component for GroupTag {}
