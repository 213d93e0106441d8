//! Runtime state shared by every task of one run
//!
//! [`BenchConfig`] stays a plain value; everything built from it at run start
//! (pools, codec, counters, gate, deadline, transport) lives next to it in
//! [`RunContext`].

use crate::error::{BenchError, Result};
use crate::lifecycle::{Deadline, TrackingGate};
use crate::stats::StatsAggregator;
use bench_config::BenchConfig;
use codec::MessageCodec;
use message_sink::Transport;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{error, info};
use types::{IdentityPool, KeyPool, Shard};

/// Envelope attribute names
pub mod attributes {
    pub const TEST_ID: &str = "testId";
    pub const SENDER_INDEX: &str = "senderIdx";
    pub const TRACK: &str = "track";
    pub const CONTENT_TYPE: &str = "content-type";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// One simulated sender or receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub role: Role,
    /// Index within this shard
    pub index: usize,
    /// Index within the whole identity pool
    pub real_index: usize,
    pub identity: String,
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.role, self.real_index, self.identity)
    }
}

/// A published key waiting for its receiver to confirm it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub key: String,
    /// Wall-clock milliseconds captured before the batch was built
    pub timestamp_ms: i64,
    pub tracked: bool,
}

#[derive(Debug)]
pub struct RunContext {
    pub config: BenchConfig,
    pub identities: Arc<IdentityPool>,
    pub codec: Arc<MessageCodec>,
    pub stats: Arc<StatsAggregator>,
    pub gate: Arc<TrackingGate>,
    pub transport: Arc<dyn Transport>,
    pub started_at: Instant,
    pub deadline: Deadline,
}

impl RunContext {
    /// Build pools, codec and counters, and fix the run's deadline
    pub fn initialize(config: BenchConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let identities = Arc::new(IdentityPool::new());
        match &config.messages.identities_file {
            Some(path) => identities.init_from_file(path)?,
            None => identities.init_generated(config.identity_count())?,
        }

        let keys = Arc::new(KeyPool::new());
        match &config.messages.keys_file {
            Some(path) => keys.init_from_file(path)?,
            None => keys.init_generated(config.key_count(), config.messages.key_class)?,
        }

        info!(
            identities = identities.count(),
            keys = keys.count(),
            class = %keys.class().unwrap_or_default(),
            "Pools initialized"
        );

        let codec = Arc::new(MessageCodec::new(keys)?);
        let stats = Arc::new(StatsAggregator::new(identities.identities().to_vec()));

        let started_at = Instant::now();
        let deadline = Deadline::at(started_at + config.timing.total_run());

        Ok(Self {
            config,
            identities,
            codec,
            stats,
            gate: Arc::new(TrackingGate::new()),
            transport,
            started_at,
            deadline,
        })
    }

    /// Instant the warmup ends
    pub fn tracking_at(&self) -> Instant {
        self.started_at + self.config.timing.warmup_duration()
    }

    fn shard(&self, role: Role) -> Shard {
        let participants = &self.config.participants;
        let per_shard = match role {
            Role::Sender => participants.senders(),
            Role::Receiver => participants.receivers(),
        };
        Shard::new(participants.shard_index, per_shard)
    }

    /// Resolve local participant `index` of `role` to its pool slot
    pub fn participant(&self, role: Role, index: usize) -> Result<Participant> {
        let (real_index, identity) = self.identities.identity_at(index, self.shard(role))?;
        Ok(Participant {
            role,
            index,
            real_index,
            identity: identity.to_string(),
        })
    }

    /// Check the run-level attributes every delivered envelope carries and
    /// return the sender's pool index
    pub fn verify_envelope(&self, envelope: &message_sink::Envelope) -> Result<usize> {
        let test_id = envelope.str_attribute(attributes::TEST_ID);
        if test_id != Some(self.config.test_id.as_str()) {
            return Err(BenchError::validation(format!(
                "unexpected {} {:?}",
                attributes::TEST_ID,
                test_id
            )));
        }

        let content_type = envelope.str_attribute(attributes::CONTENT_TYPE);
        if content_type != Some(self.config.content_type.as_str()) {
            return Err(BenchError::validation(format!(
                "unexpected {} {:?}",
                attributes::CONTENT_TYPE,
                content_type
            )));
        }

        let sender = envelope
            .int_attribute(attributes::SENDER_INDEX)
            .ok_or_else(|| {
                BenchError::validation(format!("missing {}", attributes::SENDER_INDEX))
            })?;

        usize::try_from(sender)
            .ok()
            .filter(|&index| index < self.stats.participants())
            .ok_or_else(|| {
                BenchError::validation(format!("{} {} out of range", attributes::SENDER_INDEX, sender))
            })
    }
}

/// Report the outcome of a task's startup on its ready handshake
///
/// On failure the cause goes to the orchestrator through `ready` and the task
/// returns [`BenchError::NotStarted`]; if nobody is listening the cause is
/// returned instead.
pub(crate) fn report_ready<T>(
    ready: oneshot::Sender<Result<()>>,
    role: Role,
    index: usize,
    started: Result<T>,
) -> Result<T> {
    match started {
        Ok(value) => {
            let _ = ready.send(Ok(()));
            Ok(value)
        }
        Err(e) => {
            error!(%role, index, error = %e, "Task failed to start");
            match ready.send(Err(e)) {
                Err(Err(e)) => Err(e),
                _ => Err(BenchError::NotStarted { role, index }),
            }
        }
    }
}
