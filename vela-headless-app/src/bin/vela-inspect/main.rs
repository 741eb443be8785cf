//! 在 host 后端上加载一个 glTF 文件，输出节点树并运行几帧，打印 draw 统计

use std::sync::Arc;
use std::time::Duration;

use vela_crate_tools::engine_config::EngineConfig;
use vela_crate_tools::init_log::{init_log_with_level, parse_level};
use vela_crate_tools::resource::VelaPath;
use vela_gfx::host::HostBackend;
use vela_headless_app::args::AppArgs;
use vela_headless_app::gltf_app::GltfApp;
use vela_render_interface::pipeline_settings::RendererSettings;
use vela_renderer::renderer::Renderer;
use vela_scene::scene_graph::ROOT_NODE;

fn main() -> anyhow::Result<()> {
    let config = EngineConfig::load_or_default(VelaPath::config_path())?;
    init_log_with_level(parse_level(&config.log_level));
    let args = AppArgs::parse(std::env::args().skip(1))?;

    let host = Arc::new(HostBackend::new());
    let mut renderer = Renderer::new(host.clone(), RendererSettings::from_config(&config))?
        .with_fixed_step(Duration::from_secs_f32(1.0 / 60.0));

    let mut app = GltfApp::new(&args.file, args.instances, config.loader_threads);
    renderer.init_app(&mut app)?;

    println!("{}", renderer.scene().scene_graph.traverse_info(ROOT_NODE, 0));

    let stats = renderer.run(&mut app, args.frames)?;
    let scene = renderer.scene();
    let resources = &scene.resources;
    println!("entities:          {}", scene.registry.len());
    println!("scene nodes:       {}", scene.scene_graph.len());
    println!("canonical meshes:  {}", scene.canonical_entities().len());
    println!(
        "resources:         {} models, {} materials, {} textures, {} rigs, {} instance buffers",
        resources.models.len(),
        resources.materials.len(),
        resources.textures.len(),
        resources.rigs.len(),
        resources.instance_buffers.len()
    );
    println!("bindless buffers:  {}", renderer.ctx().bindless_manager().buffer_count());
    println!(
        "frame {}: {} draws, {} instances, {} skipped, {} descriptor updates",
        stats.frame_id,
        stats.draw.draws,
        stats.draw.instances,
        stats.draw.skipped,
        host.descriptor_update_calls()
    );
    Ok(())
}
