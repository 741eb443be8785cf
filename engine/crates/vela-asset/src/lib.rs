//! 资产导入
//!
//! - [`gltf_builder::GltfBuilder`]：把 glTF/GLB 文件构建为场景中的实体、模型、材质、骨骼与动画
//! - [`particles::ParticleSystem`]：读取粒子系统的 JSON 描述并创建粒子池

pub mod error;
pub mod gltf_builder;
pub mod particles;
