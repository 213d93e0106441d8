//! # Loadbench Service
//!
//! Drives concurrent sender and receiver participants against a message
//! backend for a fixed duration, verifies every delivery and aggregates
//! throughput, latency, retry and error counters per participant.
//!
//! ## Run lifecycle
//!
//! 1. Pools, codec and counters are built from [`bench_config::BenchConfig`]
//! 2. Receivers open their subscriptions and report ready, then senders do
//! 3. Outcomes are only counted once the warmup has passed
//! 4. At the deadline loops stop starting iterations and every task is joined
//!
//! ```rust,no_run
//! use bench_config::BenchConfig;
//! use bench_service::{backend::transport_for, Orchestrator};
//!
//! # async fn run() -> bench_service::Result<()> {
//! let config = BenchConfig::load(None)?;
//! let transport = transport_for(&config.backend);
//! let report = Orchestrator::new(config, transport).run().await?;
//! println!("sent {}", report.stats.total_sent());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod lookup;
pub mod orchestrator;
pub mod receiver;
pub mod sender;
pub mod stats;

pub use context::{Participant, Role, RunContext, Ticket};
pub use error::{BenchError, Result};
pub use lifecycle::{Deadline, Phase, TrackingGate};
pub use orchestrator::{Orchestrator, RunReport};
pub use stats::{ParticipantStats, StatsAggregator, StatsError, StatsSnapshot};
