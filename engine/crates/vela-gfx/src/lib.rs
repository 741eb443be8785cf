//! Vela 图形层
//!
//! - `resources`：buffer / image 原语，通过 [`backend::GfxBackend`] 创建底层内存
//! - `host`：纯 CPU 的后端实现，记录 descriptor 写入和 draw 命令，供测试与离线检查使用
//! - `vulkan`：基于 ash + vk-mem 的后端实现（离屏渲染，dynamic rendering，bindless descriptor set）

pub mod backend;
pub mod error;
pub mod host;
pub mod resources;
pub mod sampler;
pub mod vulkan;
