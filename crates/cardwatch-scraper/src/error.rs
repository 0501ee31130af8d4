use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("navigation to {url} timed out")]
    Timeout { url: String },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("no document loaded; goto() must succeed before extraction")]
    NoDocument,

    #[error("engine is closed")]
    Closed,
}

impl ScrapeError {
    /// Wraps any browser-layer failure as [`ScrapeError::Browser`].
    pub(crate) fn browser(err: impl std::fmt::Display) -> Self {
        ScrapeError::Browser(err.to_string())
    }
}
