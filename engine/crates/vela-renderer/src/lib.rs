//! 渲染循环
//!
//! [`renderer::Renderer`] 持有 [`vela_render_interface::render_context::RenderContext`] 与 [`vela_scene::scene::Scene`]，
//! 每帧按固定顺序执行：
//!
//! 1. 外部应用更新（输入 -> 应用状态）
//! 2. 更新变换
//! 3. 推进骨骼动画
//! 4. 填充实例缓冲
//! 5. 一次性提交 bindless descriptor 写入
//! 6. 生成 draw 列表，实例数等于 InstanceTag 的长度
//! 7. 提交

pub mod draw_list;
pub mod error;
pub mod outer_app;
pub mod renderer;
pub mod timer;
