//! Run error taxonomy
//!
//! Configuration and connection errors are fatal before any task starts.
//! Publish and fetch errors stop only the task that hit them. Validation and
//! stale-data errors describe a bad delivery; how they are handled depends on
//! the delivery protocol.

use crate::context::Role;
use crate::stats::StatsError;
use bench_config::ConfigError;
use codec::CodecError;
use message_sink::SinkError;
use thiserror::Error;
use types::PoolError;

pub type Result<T> = std::result::Result<T, BenchError>;

#[derive(Debug, Error)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Connection failed for {context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: SinkError,
    },

    #[error("Publish failed: {0}")]
    Publish(#[source] SinkError),

    #[error("Fetch failed: {0}")]
    Fetch(#[source] SinkError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Stale data for key {key}: batch ts {batch_ts} older than ticket ts {ticket_ts}")]
    StaleData {
        key: String,
        batch_ts: i64,
        ticket_ts: i64,
    },

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    /// Startup failed; the cause was reported through the ready handshake
    #[error("{role} {index} failed to start")]
    NotStarted { role: Role, index: usize },
}

impl BenchError {
    pub fn connection(context: impl Into<String>, source: SinkError) -> Self {
        BenchError::Connection {
            context: context.into(),
            source,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        BenchError::Validation(msg.into())
    }

    /// True when the error describes received content rather than a
    /// failing backend or local state
    pub fn is_content_error(&self) -> bool {
        match self {
            BenchError::Validation(_) | BenchError::StaleData { .. } => true,
            BenchError::Codec(e) => e.is_content_error(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_error_classification() {
        assert!(BenchError::validation("testId mismatch").is_content_error());
        assert!(BenchError::StaleData {
            key: "1.2.3.4".into(),
            batch_ts: 1,
            ticket_ts: 2
        }
        .is_content_error());
        assert!(BenchError::Codec(CodecError::decoding("bad json", 3)).is_content_error());

        assert!(!BenchError::Fetch(SinkError::Closed).is_content_error());
        assert!(!BenchError::Codec(CodecError::Encoding("x".into())).is_content_error());
    }
}
