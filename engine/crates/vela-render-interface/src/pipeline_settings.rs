use vela_crate_tools::engine_config::EngineConfig;

/// 渲染器运行期设置，由 [`EngineConfig`] 得到
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererSettings {
    pub frames_in_flight: usize,

    pub max_bindless_buffers: u32,
    /// 包含 0 号 atlas 槽位
    pub max_bindless_images: u32,

    pub instance_buffer_initial_capacity: usize,

    /// 进程级的法线贴图强度，作为材质的缺省值
    pub normal_map_intensity: f32,
}
impl Default for RendererSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
impl RendererSettings {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            frames_in_flight: config.frames_in_flight,
            max_bindless_buffers: config.max_bindless_buffers,
            max_bindless_images: config.max_bindless_images,
            instance_buffer_initial_capacity: config.instance_buffer_initial_capacity.max(1),
            normal_map_intensity: config.normal_map_intensity,
        }
    }
}
