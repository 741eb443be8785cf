use vela_gfx::error::GfxError;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Gfx(#[from] GfxError),

    /// 外部应用在 init / update 中报告的错误
    #[error("app: {0}")]
    App(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
