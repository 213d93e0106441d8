//! Per-participant counters shared by every sender and receiver task
//!
//! All updates are atomic adds on independent slots. Maximum fields use a
//! compare-and-swap loop, so under contention a maximum may briefly lag the
//! true value but is never reported higher than an observed sample.
//! Snapshots read the slots one by one and are approximate point-in-time
//! views, not consistent cuts.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatsError {
    #[error("participant {index} out of range ({count} participants)")]
    ParticipantOutOfRange { index: usize, count: usize },

    #[error("sender {index} out of range ({count} participants)")]
    SenderOutOfRange { index: usize, count: usize },
}

#[derive(Debug)]
struct StatsElement {
    sent: AtomicU64,
    rcvd: AtomicU64,
    rcvd_by_id: Vec<AtomicU64>,
    latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    retries: AtomicU64,
    max_retries: AtomicU64,
    errors: AtomicU64,
}

impl StatsElement {
    fn new(participants: usize) -> Self {
        Self {
            sent: AtomicU64::new(0),
            rcvd: AtomicU64::new(0),
            rcvd_by_id: (0..participants).map(|_| AtomicU64::new(0)).collect(),
            latency_ms: AtomicU64::new(0),
            max_latency_ms: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            max_retries: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
}

fn atomic_max(slot: &AtomicU64, value: u64) {
    let mut current = slot.load(Ordering::Relaxed);
    while value > current {
        match slot.compare_exchange_weak(current, value, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => break,
            Err(actual) => current = actual,
        }
    }
}

/// Counter matrix indexed by participant pool index
#[derive(Debug)]
pub struct StatsAggregator {
    identities: Vec<String>,
    elements: Vec<StatsElement>,
}

impl StatsAggregator {
    /// One element per identity; `rcvd_by_id` is indexed by the same positions
    pub fn new(identities: Vec<String>) -> Self {
        let count = identities.len();
        Self {
            elements: (0..count).map(|_| StatsElement::new(count)).collect(),
            identities,
        }
    }

    pub fn participants(&self) -> usize {
        self.elements.len()
    }

    fn element(&self, index: usize) -> Result<&StatsElement, StatsError> {
        self.elements
            .get(index)
            .ok_or(StatsError::ParticipantOutOfRange {
                index,
                count: self.elements.len(),
            })
    }

    pub fn record_sent(&self, index: usize, count: u64) -> Result<(), StatsError> {
        self.element(index)?.sent.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    /// Record `count` records from sender `from`, received `latency` after creation
    pub fn record_received(
        &self,
        index: usize,
        from: usize,
        count: u64,
        latency: Duration,
    ) -> Result<(), StatsError> {
        let element = self.element(index)?;
        let by_sender = element
            .rcvd_by_id
            .get(from)
            .ok_or(StatsError::SenderOutOfRange {
                index: from,
                count: self.elements.len(),
            })?;

        let latency_ms = latency.as_millis() as u64;
        element.rcvd.fetch_add(count, Ordering::Relaxed);
        by_sender.fetch_add(count, Ordering::Relaxed);
        element.latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        atomic_max(&element.max_latency_ms, latency_ms);
        Ok(())
    }

    /// Record the attempts a successful lookup needed
    pub fn record_retries(&self, index: usize, retries: u64) -> Result<(), StatsError> {
        let element = self.element(index)?;
        element.retries.fetch_add(retries, Ordering::Relaxed);
        atomic_max(&element.max_retries, retries);
        Ok(())
    }

    pub fn record_errors(&self, index: usize, count: u64) -> Result<(), StatsError> {
        self.element(index)?.errors.fetch_add(count, Ordering::Relaxed);
        Ok(())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let participants = self
            .elements
            .iter()
            .zip(&self.identities)
            .map(|(element, identity)| ParticipantStats {
                identity: identity.clone(),
                sent: element.sent.load(Ordering::Relaxed),
                rcvd: element.rcvd.load(Ordering::Relaxed),
                rcvd_by_id: element
                    .rcvd_by_id
                    .iter()
                    .map(|c| c.load(Ordering::Relaxed))
                    .collect(),
                latency_ms: element.latency_ms.load(Ordering::Relaxed),
                max_latency_ms: element.max_latency_ms.load(Ordering::Relaxed),
                retries: element.retries.load(Ordering::Relaxed),
                max_retries: element.max_retries.load(Ordering::Relaxed),
                errors: element.errors.load(Ordering::Relaxed),
            })
            .collect();

        StatsSnapshot { participants }
    }

    /// Spawn a task logging a snapshot every `interval` until `shutdown`
    /// turns true or its sender is dropped, then logging a final snapshot
    /// with the received-by-sender matrix
    pub fn start_dumper(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> StatsDumper {
        let stats = Arc::clone(self);
        let task_stats = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if *shutdown.borrow() {
                    break;
                }

                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        task_stats.snapshot().log_summary();
                    }
                }
            }

            let last = task_stats.snapshot();
            info!("📊 Final statistics");
            last.log_summary();
            last.log_matrix();
            last
        });

        StatsDumper { stats, handle }
    }
}

/// Handle to a running dumper task
#[derive(Debug)]
pub struct StatsDumper {
    stats: Arc<StatsAggregator>,
    handle: JoinHandle<StatsSnapshot>,
}

impl StatsDumper {
    /// Wait for the dumper's final snapshot; the shutdown signal must already be sent
    pub async fn stop(self) -> StatsSnapshot {
        match self.handle.await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!("Stats dumper failed: {}", e);
                self.stats.snapshot()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantStats {
    pub identity: String,
    pub sent: u64,
    pub rcvd: u64,
    pub rcvd_by_id: Vec<u64>,
    pub latency_ms: u64,
    pub max_latency_ms: u64,
    pub retries: u64,
    pub max_retries: u64,
    pub errors: u64,
}

impl ParticipantStats {
    /// Mean receive latency, zero before anything was received
    pub fn avg_latency_ms(&self) -> u64 {
        if self.rcvd == 0 {
            0
        } else {
            self.latency_ms / self.rcvd
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub participants: Vec<ParticipantStats>,
}

impl StatsSnapshot {
    pub fn total_sent(&self) -> u64 {
        self.participants.iter().map(|p| p.sent).sum()
    }

    pub fn total_received(&self) -> u64 {
        self.participants.iter().map(|p| p.rcvd).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.participants.iter().map(|p| p.errors).sum()
    }

    pub fn log_summary(&self) {
        for (index, p) in self.participants.iter().enumerate() {
            info!(
                participant = index,
                identity = %p.identity,
                sent = p.sent,
                rcvd = p.rcvd,
                avg_latency_ms = p.avg_latency_ms(),
                max_latency_ms = p.max_latency_ms,
                retries = p.retries,
                max_retries = p.max_retries,
                errors = p.errors,
                "stats"
            );
        }
        info!(
            sent = self.total_sent(),
            rcvd = self.total_received(),
            errors = self.total_errors(),
            "stats total"
        );
    }

    pub fn log_matrix(&self) {
        for (index, p) in self.participants.iter().enumerate() {
            info!(participant = index, rcvd_by_id = ?p.rcvd_by_id, "received by sender");
        }
    }
}
