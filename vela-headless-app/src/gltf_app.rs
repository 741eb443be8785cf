use std::path::PathBuf;

use vela_asset::error::AssetError;
use vela_asset::gltf_builder::{GltfBuilder, LoadedAsset};
use vela_render_interface::render_context::RenderContext;
use vela_renderer::error::{RenderError, RenderResult};
use vela_renderer::outer_app::OuterApp;
use vela_scene::scene::Scene;

/// 加载一个 glTF 文件，并让它的第一个动画循环播放
pub struct GltfApp {
    file: PathBuf,
    instances: usize,
    loader_threads: usize,
    asset: Option<LoadedAsset>,
}
// new & init
impl GltfApp {
    pub fn new(file: impl Into<PathBuf>, instances: usize, loader_threads: usize) -> Self {
        Self {
            file: file.into(),
            instances,
            loader_threads,
            asset: None,
        }
    }
}
// getters
impl GltfApp {
    #[inline]
    pub fn asset(&self) -> Option<&LoadedAsset> {
        self.asset.as_ref()
    }
}

fn app_error(e: AssetError) -> RenderError {
    RenderError::App(e.to_string())
}

impl OuterApp for GltfApp {
    fn init(&mut self, ctx: &RenderContext, scene: &mut Scene) -> RenderResult<()> {
        let asset = GltfBuilder::new(ctx, &self.file)
            .with_loader_threads(self.loader_threads)
            .and_then(|builder| builder.load(scene, self.instances, None))
            .map_err(app_error)?;

        if let Some(rig) = asset.rig.and_then(|handle| scene.resources.rigs.get_mut(handle)) {
            let animations = rig.animations_mut();
            if animations.start_index(0, true) {
                log::info!("playing animation `{}`", animations.active().map_or("?", |a| a.name()));
            }
        }
        self.asset = Some(asset);
        Ok(())
    }
}
