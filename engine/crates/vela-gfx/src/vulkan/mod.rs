//! 基于 ash + vk-mem 的离屏渲染后端
//!
//! - 单个 graphics queue，所有提交与 descriptor 更新都在设备访问锁内完成
//! - 一个 bindless descriptor set：binding 0 为 storage buffer 数组，binding 1 为 combined image sampler 数组
//! - 每个 frame in flight 拥有独立的 command pool / command buffer / fence
//! - 使用 dynamic rendering 绘制到离屏的 color + depth 目标

pub mod backend;
pub mod bindless_set;
pub mod core;
mod debug_messenger;
pub mod frame;
pub mod memory;

pub use backend::{VulkanBackend, VulkanBackendDesc};
