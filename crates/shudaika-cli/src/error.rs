use shudaika_api::animethemes::AnimeThemesError;
use shudaika_core::error::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("theme catalog: {0}")]
    Catalog(#[from] AnimeThemesError),

    #[error("HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    InvalidArgument(String),
}
