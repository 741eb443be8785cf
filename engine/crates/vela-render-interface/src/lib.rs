//! 渲染接口层
//!
//! 位于 `vela-gfx` 与场景/渲染器之间：
//! - [`bindless_manager::BindlessManager`]：全局 bindless 槽位分配与批量 descriptor 更新
//! - [`instance_buffer::InstanceBuffer`]：每个 primitive 一份的实例数据缓冲
//! - [`per_frame_buffer::PerFrameBuffer`]：每个 frames in flight 槽位一份的 host visible buffer
//! - [`render_context::RenderContext`]：显式传递的渲染上下文（后端 + bindless + 设置）

pub mod bindless_manager;
pub mod frame_counter;
pub mod instance_buffer;
pub mod per_frame_buffer;
pub mod pipeline_settings;
pub mod render_context;
