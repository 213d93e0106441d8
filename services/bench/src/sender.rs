//! Sender task: publish one batch per interval until the deadline

use crate::context::{attributes, report_ready, Participant, Role, RunContext, Ticket};
use crate::error::{BenchError, Result};
use bench_config::DeliveryMode;
use codec::current_timestamp_ms;
use message_sink::{Envelope, Publisher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// What a sender did before it returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderSummary {
    pub batches: u64,
    pub tracked_batches: u64,
}

struct Sender {
    ctx: Arc<RunContext>,
    participant: Participant,
    publisher: Box<dyn Publisher>,
    tickets: Option<mpsc::Sender<Ticket>>,
}

/// Open the publisher, report readiness on `ready`, then run the send loop
///
/// An open failure is reported on `ready`; the task itself then returns
/// [`BenchError::NotStarted`].
pub async fn run_sender(
    ctx: Arc<RunContext>,
    index: usize,
    tickets: Option<mpsc::Sender<Ticket>>,
    ready: oneshot::Sender<Result<()>>,
) -> Result<SenderSummary> {
    let (participant, publisher) =
        report_ready(ready, Role::Sender, index, open(&ctx, index).await)?;

    info!(participant = participant.real_index, identity = %participant.identity, "📤 Sender started");

    let sender = Sender {
        ctx,
        participant,
        publisher,
        tickets,
    };
    sender.run().await
}

async fn open(ctx: &RunContext, index: usize) -> Result<(Participant, Box<dyn Publisher>)> {
    let participant = ctx.participant(Role::Sender, index)?;
    let publisher = ctx
        .transport
        .open_publisher(&ctx.config.backend.destination)
        .await
        .map_err(|e| BenchError::connection(participant.to_string(), e))?;
    Ok((participant, publisher))
}

impl Sender {
    async fn run(mut self) -> Result<SenderSummary> {
        let deadline = self.ctx.deadline;
        let interval = self.ctx.config.timing.send_interval();
        let mut summary = SenderSummary::default();

        let result = loop {
            if deadline.reached() {
                break Ok(());
            }

            let tracked = self.ctx.gate.is_tracking();
            let more = match self.send_once(tracked).await {
                Ok(more) => more,
                Err(e) => break Err(e),
            };

            summary.batches += 1;
            if tracked {
                summary.tracked_batches += 1;
            }
            if !more {
                break Ok(());
            }

            if deadline.reached() {
                break Ok(());
            }
            deadline.sleep(interval).await;
        };

        if let Err(e) = self.publisher.close().await {
            warn!(participant = self.participant.real_index, "Publisher close failed: {}", e);
        }

        match result {
            Ok(()) => {
                info!(
                    participant = self.participant.real_index,
                    batches = summary.batches,
                    tracked = summary.tracked_batches,
                    "Sender finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(participant = self.participant.real_index, error = %e, "Sender stopped");
                Err(e)
            }
        }
    }

    /// Publish one batch; `Ok(false)` when the batch went out but the deadline
    /// cut its ticket enqueue short
    async fn send_once(&mut self, tracked: bool) -> Result<bool> {
        let config = &self.ctx.config;

        match config.mode {
            DeliveryMode::Stream => {
                let body = self.ctx.codec.encode_batch(config.messages.per_send, None)?;
                let envelope = self
                    .envelope(body, tracked)
                    .with_partition_key(self.participant.identity.clone());
                self.publish(envelope, tracked, config.messages.per_send as u64)
                    .await?;
                Ok(true)
            }
            DeliveryMode::Lookup => {
                let timestamp_ms = current_timestamp_ms();
                let (body, key) = self.ctx.codec.encode_single_with_key(None)?;
                let envelope = self.envelope(body, tracked).with_partition_key(key.clone());
                self.publish(envelope, tracked, 1).await?;

                let ticket = Ticket {
                    key,
                    timestamp_ms,
                    tracked,
                };
                Ok(self.enqueue(ticket).await)
            }
        }
    }

    fn envelope(&self, body: Vec<u8>, tracked: bool) -> Envelope {
        let config = &self.ctx.config;
        Envelope::new_unchecked(body)
            .with_attribute(config.property_name.clone(), self.participant.identity.clone())
            .with_attribute(attributes::TEST_ID, config.test_id.clone())
            .with_attribute(attributes::SENDER_INDEX, self.participant.real_index as i64)
            .with_attribute(attributes::TRACK, if tracked { "true" } else { "false" })
            .with_attribute(attributes::CONTENT_TYPE, config.content_type.clone())
    }

    async fn publish(&self, envelope: Envelope, tracked: bool, records: u64) -> Result<()> {
        self.publisher
            .publish(envelope)
            .await
            .map_err(BenchError::Publish)?;

        if tracked {
            self.ctx.stats.record_sent(self.participant.real_index, records)?;
        }
        Ok(())
    }

    /// Hand a ticket to the matching receiver, waiting for queue space
    async fn enqueue(&mut self, ticket: Ticket) -> bool {
        let Some(tickets) = &self.tickets else {
            return true;
        };

        let deadline = self.ctx.deadline;
        let delivered = tokio::select! {
            biased;
            sent = tickets.send(ticket) => sent.is_ok(),
            _ = deadline.wait() => return false,
        };

        if !delivered {
            debug!(participant = self.participant.real_index, "Lookup receiver gone, no more tickets");
            self.tickets = None;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::ticket_queues;
    use bench_config::{BackendKind, BenchConfig};
    use message_sink::MemoryKeyValue;
    use tokio::sync::mpsc::error::TryRecvError;

    async fn lookup_context(test_duration_ms: u64) -> Arc<RunContext> {
        let mut config = BenchConfig::default();
        config.test_id = "backpressure".to_string();
        config.mode = DeliveryMode::Lookup;
        config.backend.kind = BackendKind::MemoryKv;
        config.participants.total_senders = 1;
        config.participants.total_receivers = 1;
        config.timing.warmup_duration_ms = 0;
        config.timing.test_duration_ms = test_duration_ms;
        config.timing.send_interval_ms = 1_000;

        let ctx = RunContext::initialize(config, Arc::new(MemoryKeyValue::new())).unwrap();
        ctx.transport.connect().await.unwrap();
        ctx.gate.open();
        Arc::new(ctx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_ticket_queue_blocks_until_deadline() {
        let ctx = lookup_context(3_000).await;
        let (mut queues, mut receivers) = ticket_queues(1, 1);
        let mut tickets = receivers.remove(0);

        let (ready_tx, ready_rx) = oneshot::channel();
        let handle = tokio::spawn(run_sender(ctx.clone(), 0, Some(queues.remove(0)), ready_tx));
        assert!(ready_rx.await.unwrap().is_ok());

        // Second publish at 1s finds the queue full and waits
        tokio::time::sleep(std::time::Duration::from_millis(1_500)).await;
        assert!(!handle.is_finished());
        assert_eq!(ctx.stats.snapshot().participants[0].sent, 2);

        let summary = handle.await.unwrap().unwrap();
        assert!(ctx.deadline.reached());
        assert_eq!(summary, SenderSummary { batches: 2, tracked_batches: 2 });

        // The queued ticket survives; the blocked one was never enqueued
        let first = tickets.try_recv().unwrap();
        assert!(first.tracked);
        assert!(matches!(tickets.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_ticket_queue_does_not_stop_sender() {
        let ctx = lookup_context(2_500).await;
        let (mut queues, receivers) = ticket_queues(1, 1);
        drop(receivers);

        let (ready_tx, _ready_rx) = oneshot::channel();
        let summary = run_sender(ctx.clone(), 0, Some(queues.remove(0)), ready_tx)
            .await
            .unwrap();

        assert_eq!(summary.batches, 3);
        assert_eq!(ctx.stats.snapshot().participants[0].sent, 3);
    }
}
