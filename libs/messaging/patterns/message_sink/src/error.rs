#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Publish failed: {error} (size: {size}B, destination: {destination})")]
    PublishFailed {
        error: String,
        size: usize,
        destination: String,
    },

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("Envelope too large: {size}B exceeds limit of {limit}B")]
    BodyTooLarge { size: usize, limit: usize },

    #[error("Handle closed")]
    Closed,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SinkError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        SinkError::ConnectionFailed(msg.into())
    }

    pub fn publish_failed(msg: impl Into<String>, size: usize, destination: impl Into<String>) -> Self {
        SinkError::PublishFailed {
            error: msg.into(),
            size,
            destination: destination.into(),
        }
    }

    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        SinkError::FetchFailed(msg.into())
    }

    pub fn body_too_large(size: usize, limit: usize) -> Self {
        SinkError::BodyTooLarge { size, limit }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SinkError::InvalidConfig(msg.into())
    }
}
