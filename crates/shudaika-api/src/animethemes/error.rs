use thiserror::Error;

/// Errors from the AnimeThemes API client.
#[derive(Debug, Error)]
pub enum AnimeThemesError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl AnimeThemesError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}
