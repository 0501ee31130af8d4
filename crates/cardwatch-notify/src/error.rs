use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{channel} delivery to {channel_target} failed: {reason}")]
    Delivery {
        channel: &'static str,
        channel_target: String,
        reason: String,
    },
}
