//! 在离屏的 Vulkan 后端上渲染一个 glTF 文件
//!
//! 需要由应用通过 `VulkanBackend::set_pipeline` 注册各种材质的 pipeline，
//! 没有 pipeline 的 draw 会被跳过并给出一次警告。

use std::sync::Arc;

use vela_crate_tools::engine_config::EngineConfig;
use vela_crate_tools::init_log::{init_log_with_level, parse_level};
use vela_crate_tools::resource::VelaPath;
use vela_gfx::vulkan::{VulkanBackend, VulkanBackendDesc};
use vela_headless_app::args::AppArgs;
use vela_headless_app::gltf_app::GltfApp;
use vela_render_interface::pipeline_settings::RendererSettings;
use vela_renderer::renderer::Renderer;

fn main() -> anyhow::Result<()> {
    let _tracy = tracy_client::Client::start();
    let config = EngineConfig::load_or_default(VelaPath::config_path())?;
    init_log_with_level(parse_level(&config.log_level));
    let args = AppArgs::parse(std::env::args().skip(1))?;

    let backend = VulkanBackend::new(&VulkanBackendDesc {
        app_name: config.app_name.clone(),
        frames_in_flight: config.frames_in_flight,
        max_bindless_buffers: config.max_bindless_buffers,
        max_bindless_images: config.max_bindless_images,
        ..Default::default()
    })
    .inspect_err(|e| log::error!("[CRITICAL] failed to create the vulkan backend: {e}"))?;

    let mut renderer = Renderer::new(Arc::new(backend), RendererSettings::from_config(&config))?;
    let mut app = GltfApp::new(&args.file, args.instances, config.loader_threads);
    renderer.init_app(&mut app)?;

    for _ in 0..args.frames {
        let stats = renderer.render_frame(&mut app)?;
        log::info!(
            "frame {}: {} draws, {} instances, {:.2} ms",
            stats.frame_id,
            stats.draw.draws,
            stats.draw.instances,
            renderer.timer().delta_time_ms()
        );
    }
    Ok(())
}
