use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection failure, timeout or a non-success HTTP status.
    #[error("transport error fetching {url}: {message}")]
    Transport { url: String, message: String },

    /// The payload is not a recognised image.
    #[error("invalid content from {url}: {reason}")]
    Content { url: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn transport(url: &str, message: impl Into<String>) -> Self {
        FetchError::Transport {
            url: url.to_string(),
            message: message.into(),
        }
    }

    pub fn content(url: &str, reason: impl Into<String>) -> Self {
        FetchError::Content {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Only transport failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }
}
