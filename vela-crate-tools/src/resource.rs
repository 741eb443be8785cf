use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let model = VelaPath::assets_path("DamagedHelmet.glb");  // assets/DamagedHelmet.glb
/// let config = VelaPath::config_path();                    // vela.toml
/// ```
pub struct VelaPath {}
// 核心路径
impl VelaPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // vela-crate-tools 位于工作区根目录下
        let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest.parent().unwrap_or(manifest).to_path_buf()
    }

    pub fn target_path() -> PathBuf {
        Self::workspace_path().join("target")
    }
}
// 根目录下
impl VelaPath {
    pub fn engine_path() -> PathBuf {
        Self::workspace_path().join("engine")
    }

    /// 获取 `assets/` 目录下的文件路径
    pub fn assets_path(filename: &str) -> PathBuf {
        Self::workspace_path().join("assets").join(filename)
    }

    /// 默认的引擎配置文件 `vela.toml`
    pub fn config_path() -> PathBuf {
        Self::workspace_path().join("vela.toml")
    }
}
