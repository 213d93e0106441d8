//! Retry-based lookup for backends without read-after-write consistency
//!
//! Each sender hands a [`Ticket`] for every published key to the receiver
//! with the same participant index over a bounded queue. The receiver looks
//! the key up until it appears or the retry budget runs out. A full queue
//! blocks the sender, which throttles senders to the pace of their receivers.

use crate::context::{report_ready, Participant, Role, RunContext, Ticket};
use crate::error::{BenchError, Result};
use crate::receiver::open_subscriber;
use codec::current_timestamp_ms;
use message_sink::{Envelope, Subscriber};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Bounded per-participant ticket queues
pub fn ticket_queues(
    participants: usize,
    capacity: usize,
) -> (Vec<mpsc::Sender<Ticket>>, Vec<mpsc::Receiver<Ticket>>) {
    (0..participants)
        .map(|_| mpsc::channel(capacity.max(1)))
        .unzip()
}

/// Result of working one ticket
#[derive(Debug)]
pub enum LookupOutcome {
    /// Found and verified on attempt `attempts`
    Found {
        attempts: u32,
        from: usize,
        records: u64,
        latency: Duration,
    },
    /// Found, but the value failed verification or was stale
    Rejected(BenchError),
    /// Not visible within the retry budget
    Exhausted,
    /// The deadline arrived between attempts
    Abandoned,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupSummary {
    pub tickets: u64,
    pub found: u64,
    pub failed: u64,
}

/// Open the lookup handle, report readiness on `ready`, then work tickets
pub async fn run_lookup_receiver(
    ctx: Arc<RunContext>,
    index: usize,
    tickets: mpsc::Receiver<Ticket>,
    ready: oneshot::Sender<Result<()>>,
) -> Result<LookupSummary> {
    let (participant, subscriber) =
        report_ready(ready, Role::Receiver, index, open_subscriber(&ctx, index).await)?;

    info!(participant = participant.real_index, identity = %participant.identity, "🔎 Lookup receiver started");

    let receiver = LookupReceiver::new(ctx, participant, subscriber);
    receiver.run(tickets).await
}

pub struct LookupReceiver {
    ctx: Arc<RunContext>,
    participant: Participant,
    subscriber: Box<dyn Subscriber>,
}

impl LookupReceiver {
    pub fn new(ctx: Arc<RunContext>, participant: Participant, subscriber: Box<dyn Subscriber>) -> Self {
        Self {
            ctx,
            participant,
            subscriber,
        }
    }

    pub async fn run(self, mut tickets: mpsc::Receiver<Ticket>) -> Result<LookupSummary> {
        let deadline = self.ctx.deadline;
        let mut summary = LookupSummary::default();

        let result = loop {
            let ticket = tokio::select! {
                biased;
                _ = deadline.wait() => break Ok(()),
                ticket = tickets.recv() => match ticket {
                    Some(ticket) => ticket,
                    None => {
                        debug!(participant = self.participant.real_index, "Ticket queue closed");
                        break Ok(());
                    }
                },
            };

            summary.tickets += 1;
            match self.process_ticket(&ticket).await {
                Ok(LookupOutcome::Found { .. }) => summary.found += 1,
                Ok(LookupOutcome::Rejected(_)) | Ok(LookupOutcome::Exhausted) => summary.failed += 1,
                Ok(LookupOutcome::Abandoned) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.subscriber.close().await {
            warn!(participant = self.participant.real_index, "Subscriber close failed: {}", e);
        }

        match result {
            Ok(()) => {
                info!(
                    participant = self.participant.real_index,
                    tickets = summary.tickets,
                    found = summary.found,
                    failed = summary.failed,
                    "Lookup receiver finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(participant = self.participant.real_index, error = %e, "Lookup receiver stopped");
                Err(e)
            }
        }
    }

    /// Work one ticket and record its outcome if it was tracked
    ///
    /// Fetch failures end the task; bad or missing values only count as errors.
    pub async fn process_ticket(&self, ticket: &Ticket) -> Result<LookupOutcome> {
        let outcome = self.lookup(ticket).await?;
        let index = self.participant.real_index;

        match &outcome {
            LookupOutcome::Found {
                attempts,
                from,
                records,
                latency,
            } => {
                if ticket.tracked {
                    self.ctx.stats.record_retries(index, u64::from(*attempts))?;
                    self.ctx.stats.record_received(index, *from, *records, *latency)?;
                }
            }
            LookupOutcome::Rejected(e) => {
                warn!(participant = index, key = %ticket.key, error = %e, "Lookup rejected");
                if ticket.tracked {
                    self.ctx.stats.record_errors(index, 1)?;
                }
            }
            LookupOutcome::Exhausted => {
                warn!(participant = index, key = %ticket.key, "Lookup retries exhausted");
                if ticket.tracked {
                    self.ctx.stats.record_errors(index, 1)?;
                }
            }
            LookupOutcome::Abandoned => {
                debug!(participant = index, key = %ticket.key, "Lookup abandoned at deadline");
            }
        }

        Ok(outcome)
    }

    async fn lookup(&self, ticket: &Ticket) -> Result<LookupOutcome> {
        let max_retries = self.ctx.config.lookup.max_retries;
        let interval = self.ctx.config.timing.receive_interval();
        let deadline = self.ctx.deadline;

        for attempt in 1..=max_retries {
            let fetched = self
                .subscriber
                .fetch_key(&ticket.key)
                .await
                .map_err(BenchError::Fetch)?;

            if let Some(envelope) = fetched {
                return match self.verify(&envelope, ticket) {
                    Ok((from, records)) => Ok(LookupOutcome::Found {
                        attempts: attempt,
                        from,
                        records,
                        latency: latency_since(ticket.timestamp_ms),
                    }),
                    Err(e) if e.is_content_error() => Ok(LookupOutcome::Rejected(e)),
                    Err(e) => Err(e),
                };
            }

            if attempt < max_retries {
                if deadline.reached() {
                    return Ok(LookupOutcome::Abandoned);
                }
                deadline.sleep(interval).await;
            }
        }

        Ok(LookupOutcome::Exhausted)
    }

    fn verify(&self, envelope: &Envelope, ticket: &Ticket) -> Result<(usize, u64)> {
        let from = self.ctx.verify_envelope(envelope)?;
        let batch = self.ctx.codec.decode_validated(&envelope.body)?;

        if batch.timestamp_ms < ticket.timestamp_ms {
            return Err(BenchError::StaleData {
                key: ticket.key.clone(),
                batch_ts: batch.timestamp_ms,
                ticket_ts: ticket.timestamp_ms,
            });
        }

        Ok((from, batch.count as u64))
    }
}

fn latency_since(timestamp_ms: i64) -> Duration {
    Duration::from_millis(current_timestamp_ms().saturating_sub(timestamp_ms).max(0) as u64)
}
