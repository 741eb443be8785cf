use std::sync::{Arc, Mutex, MutexGuard};

use vela_gfx::backend::GfxBackend;
use vela_gfx::error::GfxResult;
use vela_gfx::resources::buffer::GfxBuffer;
use vela_gfx::resources::image::{GfxImage, GfxTexture};
use vela_gfx::sampler::GfxSamplerDesc;

use crate::bindless_manager::BindlessManager;
use crate::pipeline_settings::RendererSettings;

/// 渲染上下文
///
/// 在启动时创建，显式地传递给资源加载器与渲染器。
/// 销毁顺序：先释放所有引用它的场景资源，再释放上下文本身。
pub struct RenderContext {
    backend: Arc<dyn GfxBackend>,
    bindless_manager: BindlessManager,
    settings: RendererSettings,

    /// 占据 0 号 image 槽位
    atlas: GfxTexture,

    /// (buffer, 退役时的帧序号)，等 GPU 不再使用后销毁
    pending_destroy_buffers: Mutex<Vec<(GfxBuffer, u64)>>,
}
// new & init
impl RenderContext {
    pub fn new(backend: Arc<dyn GfxBackend>, settings: RendererSettings) -> GfxResult<Self> {
        let _span = tracy_client::span!("RenderContext::new");

        let bindless_manager =
            BindlessManager::new(backend.clone(), settings.max_bindless_buffers, settings.max_bindless_images);

        let atlas_image = GfxImage::solid_rgba8("texture-atlas", [255, 255, 255, 255]);
        let atlas = GfxTexture::new(backend.as_ref(), &atlas_image, GfxSamplerDesc::default())?;
        bindless_manager.set_atlas(&atlas);

        log::info!("render context created on `{}` backend", backend.name());
        Ok(Self {
            backend,
            bindless_manager,
            settings,
            atlas,
            pending_destroy_buffers: Mutex::new(Vec::new()),
        })
    }
}
// getters
impl RenderContext {
    #[inline]
    pub fn backend(&self) -> &dyn GfxBackend {
        self.backend.as_ref()
    }

    #[inline]
    pub fn backend_arc(&self) -> &Arc<dyn GfxBackend> {
        &self.backend
    }

    #[inline]
    pub fn bindless_manager(&self) -> &BindlessManager {
        &self.bindless_manager
    }

    #[inline]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[inline]
    pub fn atlas(&self) -> &GfxTexture {
        &self.atlas
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.settings.frames_in_flight.max(1)
    }

    /// 帧序号对应的 frames in flight 槽位，与 `FrameCounter::frame_slot` 一致
    #[inline]
    pub fn frame_slot(&self, frame_id: u64) -> usize {
        (frame_id % self.frames_in_flight() as u64) as usize
    }

    #[inline]
    pub fn pending_destroy_count(&self) -> usize {
        self.lock_pending_destroy().len()
    }
}
// destroy
impl RenderContext {
    /// 不再使用的 buffer 延迟到 `frames_in_flight` 帧之后销毁，此前提交的命令可能仍在读取它
    pub fn retire_buffer(&self, buffer: GfxBuffer, frame_id: u64) {
        log::debug!("retire buffer `{}` at frame {frame_id}", buffer.name());
        self.lock_pending_destroy().push((buffer, frame_id));
    }

    /// 销毁已过期的 buffer：退役帧 + frames in flight <= 当前帧
    ///
    /// 需要在当前帧的 fence 等待之后调用。返回销毁的数量。
    pub fn cleanup(&self, current_frame_id: u64) -> usize {
        let _span = tracy_client::span!("RenderContext::cleanup");
        let fif = self.frames_in_flight() as u64;

        let mut pending = self.lock_pending_destroy();
        let before = pending.len();
        pending.retain(|(_, frame_id)| frame_id + fif > current_frame_id);
        before - pending.len()
    }

    fn lock_pending_destroy(&self) -> MutexGuard<'_, Vec<(GfxBuffer, u64)>> {
        self.pending_destroy_buffers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
