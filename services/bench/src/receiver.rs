//! Stream receiver task: pull batches from a subscription until the deadline

use crate::context::{attributes, report_ready, Participant, Role, RunContext};
use crate::error::{BenchError, Result};
use codec::MessageCodec;
use message_sink::{Envelope, Subscriber};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverSummary {
    pub envelopes: u64,
    pub recorded: u64,
    pub skipped: u64,
}

/// A verified delivery ready to be counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Delivery {
    from: usize,
    records: u64,
    latency: Duration,
}

pub(crate) async fn open_subscriber(
    ctx: &RunContext,
    index: usize,
) -> Result<(Participant, Box<dyn Subscriber>)> {
    let participant = ctx.participant(Role::Receiver, index)?;
    let group = ctx.config.consumer_group(participant.real_index);
    let subscriber = ctx
        .transport
        .open_subscriber(&ctx.config.backend.destination, &group)
        .await
        .map_err(|e| BenchError::connection(participant.to_string(), e))?;
    Ok((participant, subscriber))
}

/// Open the subscription, report readiness on `ready`, then run the receive loop
pub async fn run_receiver(
    ctx: Arc<RunContext>,
    index: usize,
    ready: oneshot::Sender<Result<()>>,
) -> Result<ReceiverSummary> {
    let (participant, subscriber) =
        report_ready(ready, Role::Receiver, index, open_subscriber(&ctx, index).await)?;

    info!(participant = participant.real_index, identity = %participant.identity, "📥 Receiver started");

    let receiver = StreamReceiver {
        ctx,
        participant,
        subscriber,
    };
    receiver.run().await
}

struct StreamReceiver {
    ctx: Arc<RunContext>,
    participant: Participant,
    subscriber: Box<dyn Subscriber>,
}

impl StreamReceiver {
    async fn run(self) -> Result<ReceiverSummary> {
        let deadline = self.ctx.deadline;
        let interval = self.ctx.config.timing.receive_interval();
        let mut summary = ReceiverSummary::default();

        let result = loop {
            if deadline.reached() {
                break Ok(());
            }

            if let Err(e) = self.receive_once(&mut summary).await {
                break Err(e);
            }

            if deadline.reached() {
                break Ok(());
            }
            deadline.sleep(interval).await;
        };

        if let Err(e) = self.subscriber.close().await {
            warn!(participant = self.participant.real_index, "Subscriber close failed: {}", e);
        }

        match result {
            Ok(()) => {
                info!(
                    participant = self.participant.real_index,
                    envelopes = summary.envelopes,
                    recorded = summary.recorded,
                    "Receiver finished"
                );
                Ok(summary)
            }
            Err(e) => {
                error!(participant = self.participant.real_index, error = %e, "Receiver stopped");
                Err(e)
            }
        }
    }

    async fn receive_once(&self, summary: &mut ReceiverSummary) -> Result<()> {
        let envelopes = self
            .subscriber
            .fetch_batch(self.ctx.config.messages.per_receive)
            .await
            .map_err(BenchError::Fetch)?;

        for envelope in envelopes {
            summary.envelopes += 1;
            match self.accept(&envelope)? {
                Some(delivery) => {
                    self.ctx.stats.record_received(
                        self.participant.real_index,
                        delivery.from,
                        delivery.records,
                        delivery.latency,
                    )?;
                    summary.recorded += 1;
                }
                None => summary.skipped += 1,
            }
        }

        Ok(())
    }

    /// Verify one envelope; `None` for our own or untracked traffic
    fn accept(&self, envelope: &Envelope) -> Result<Option<Delivery>> {
        let property = &self.ctx.config.property_name;
        let origin = envelope
            .str_attribute(property)
            .ok_or_else(|| BenchError::validation(format!("missing {}", property)))?;

        if origin == self.participant.identity {
            return Ok(None);
        }

        if envelope.str_attribute(attributes::TRACK) == Some("false") {
            debug!(participant = self.participant.real_index, "Discarding warmup envelope");
            return Ok(None);
        }

        let from = self.ctx.verify_envelope(envelope)?;
        let batch = self.ctx.codec.decode_validated(&envelope.body)?;

        Ok(Some(Delivery {
            from,
            records: batch.count as u64,
            latency: MessageCodec::batch_age(&batch),
        }))
    }
}
