use std::path::PathBuf;

use vela_gfx::error::GfxError;

/// 资产加载的错误
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON 错误、缺失字段、URI 无法解析、GLB 损坏等
    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("required extension `{0}` is not supported")]
    UnsupportedExtension(String),

    /// 数据能解析但含义不合法：accessor 类型不匹配、缺少逆绑定矩阵等
    #[error("{0}")]
    Semantic(String),

    #[error(transparent)]
    Gfx(#[from] GfxError),

    #[error("particle system: {0}")]
    Particle(String),
}

pub type AssetResult<T> = Result<T, AssetError>;

impl AssetError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn semantic(reason: impl Into<String>) -> Self {
        Self::Semantic(reason.into())
    }
}
