//! Codec errors
//!
//! Encoding failures are local bugs or exhausted pools; decoding and
//! validation failures describe data that came back from a backend and are
//! what receivers count as bad deliveries.

use thiserror::Error;
use types::PoolError;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Batch could not be serialized
    #[error("Encoding failed: {0}")]
    Encoding(String),

    /// Payload is empty, malformed or internally inconsistent
    #[error("Decoding failed: {reason} ({size} bytes)")]
    Decoding { reason: String, size: usize },

    /// Record content is outside its declared bounds
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Key pool lookup or key-class check failed
    #[error(transparent)]
    Pool(#[from] PoolError),
}

impl CodecError {
    pub fn decoding(reason: impl Into<String>, size: usize) -> Self {
        CodecError::Decoding {
            reason: reason.into(),
            size,
        }
    }

    /// True for failures caused by received content rather than local state
    pub fn is_content_error(&self) -> bool {
        matches!(
            self,
            CodecError::Decoding { .. }
                | CodecError::Validation(_)
                | CodecError::Pool(PoolError::Validation { .. })
        )
    }
}
