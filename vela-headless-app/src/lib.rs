//! 两个无窗口应用共用的部分：命令行参数、配置加载以及加载 glTF 的 [`OuterApp`](vela_renderer::outer_app::OuterApp)

pub mod args;
pub mod gltf_app;
