use ash::vk;

/// 图形层错误
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("gpu allocation failed: {0}")]
    GpuAlloc(String),

    #[error("gpu api call failed: {0}")]
    GpuApi(String),

    #[error("buffer `{0}` is not host visible")]
    NotHostVisible(String),

    #[error("buffer `{0}` is already mapped")]
    AlreadyMapped(String),

    #[error("buffer `{0}` is not mapped")]
    NotMapped(String),

    #[error("access of {len} bytes at offset {offset} exceeds buffer `{name}` of {capacity} bytes")]
    OutOfBounds {
        name: String,
        offset: u64,
        len: u64,
        capacity: u64,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl From<vk::Result> for GfxError {
    fn from(value: vk::Result) -> Self {
        match value {
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                Self::GpuAlloc(format!("{value:?}"))
            }
            _ => Self::GpuApi(format!("{value:?}")),
        }
    }
}

pub type GfxResult<T> = Result<T, GfxError>;
