use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 引擎配置，对应 `vela.toml`
///
/// 所有字段都有默认值，配置文件中缺失的键保持默认。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 应用名称（用于日志和 Vulkan ApplicationInfo）
    pub app_name: String,

    /// 同时在飞的帧数
    pub frames_in_flight: usize,

    /// bindless storage buffer 槽位数量
    pub max_bindless_buffers: u32,

    /// bindless 纹理槽位数量，0 号槽位保留给 atlas
    pub max_bindless_images: u32,

    /// 实例缓冲区的初始容量（实例个数）
    pub instance_buffer_initial_capacity: usize,

    /// 法线贴图强度，写入材质常量
    pub normal_map_intensity: f32,

    /// glTF 网格并行加载线程数，0 表示使用 rayon 默认值
    pub loader_threads: usize,

    /// 日志级别：error / warn / info / debug / trace
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "vela".to_string(),
            frames_in_flight: 3,
            max_bindless_buffers: 16384,
            max_bindless_images: 4096,
            instance_buffer_initial_capacity: 4,
            normal_map_intensity: 1.0,
            loader_threads: 0,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).with_context(|| format!("failed to read config: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content).with_context(|| format!("failed to parse config: {:?}", path.as_ref()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        anyhow::ensure!(config.frames_in_flight > 0, "frames_in_flight must be positive");
        anyhow::ensure!(config.instance_buffer_initial_capacity > 0, "instance_buffer_initial_capacity must be positive");
        Ok(config)
    }

    /// 文件存在时加载，否则使用默认配置
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            log::info!("config {:?} not found, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path.as_ref(), content).with_context(|| format!("failed to write config: {:?}", path.as_ref()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_keys_keep_defaults() {
        let config = EngineConfig::from_toml_str("app_name = \"demo\"\nmax_bindless_buffers = 64\n").unwrap();
        assert_eq!(config.app_name, "demo");
        assert_eq!(config.max_bindless_buffers, 64);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.instance_buffer_initial_capacity, 4);
    }

    #[test]
    fn test_reject_zero_frames() {
        assert!(EngineConfig::from_toml_str("frames_in_flight = 0").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vela.toml");
        let mut config = EngineConfig::default();
        config.normal_map_intensity = 0.5;
        config.save_to_file(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
        assert_eq!(EngineConfig::load_or_default(dir.path().join("none.toml")).unwrap(), EngineConfig::default());
    }
}
