//! # Loadbench Configuration
//!
//! Run configuration for the loadbench harness: participant fan-out, timing,
//! message shape, backend selection and lookup retry budget.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use bench_config::{BenchConfig, ConfigLoader};
//!
//! let config = ConfigLoader::new()
//!     .with_file("loadbench.toml")
//!     .set_override("timing.send_interval_ms", 500u64)
//!     .load()
//!     .unwrap();
//! assert!(config.timing.send_interval_ms == 500);
//! ```

pub mod bench_config;
pub mod defaults;
pub mod error;

pub use bench_config::{
    BackendConfig, BackendKind, BenchConfig, ConfigLoader, DeliveryMode, LookupConfig,
    MessagesConfig, ParticipantsConfig, TimingConfig,
};
pub use error::{ConfigError, Result};
