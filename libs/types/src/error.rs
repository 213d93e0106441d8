//! Error types for pool initialization, lookup and key validation

use thiserror::Error;

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors raised by the identity and key pools
#[derive(Debug, Error)]
pub enum PoolError {
    /// Caller supplied a count, class or list the pool cannot use
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Pool was read before any initialization call succeeded
    #[error("{pool} pool not initialized")]
    NotInitialized { pool: &'static str },

    /// Shard-adjusted index falls outside the pool
    #[error("No identity for index {index} (shard-adjusted {real_index}, pool size {count})")]
    IndexOutOfRange {
        index: usize,
        real_index: usize,
        count: usize,
    },

    /// Key does not satisfy its address class
    #[error("Validation failed for {key}: {rule}")]
    Validation { key: String, rule: String },

    /// Pool source file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// Create a validation error naming the violated rule
    pub fn validation(key: impl Into<String>, rule: impl Into<String>) -> Self {
        PoolError::Validation {
            key: key.into(),
            rule: rule.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        PoolError::InvalidArgument(msg.into())
    }
}
