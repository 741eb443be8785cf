//! 场景层
//!
//! - `ecs`：实体与按类型密集存储的组件
//! - `components`：Transform、Mesh、Material、InstanceTag 等组件
//! - `dictionary`：短名/长名到实体的查找
//! - `scene_graph`：以下标寻址的节点树，每个节点引用一个实体
//! - `model` / `material` / `resources`：顶点、primitive、材质与共享的 GPU 资源

pub mod components;
pub mod dictionary;
pub mod ecs;
pub mod material;
pub mod model;
pub mod resources;
pub mod scene;
pub mod scene_graph;
