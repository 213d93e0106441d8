//! Run lifecycle: initialize, start receivers then senders, gate statistics
//! behind the warmup, and join everything at the deadline

use crate::context::{Role, RunContext, Ticket};
use crate::error::{BenchError, Result};
use crate::lifecycle::{spawn_warmup, Phase, TrackingGate};
use crate::lookup::{run_lookup_receiver, ticket_queues};
use crate::receiver::run_receiver;
use crate::sender::run_sender;
use crate::stats::StatsSnapshot;
use bench_config::{BenchConfig, DeliveryMode};
use futures::future::join_all;
use message_sink::Transport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{error, info, warn};

type TaskHandle = JoinHandle<Result<()>>;

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub test_id: String,
    pub senders: usize,
    pub receivers: usize,
    /// Tasks that ended on an error before the deadline
    pub senders_failed: usize,
    pub receivers_failed: usize,
    pub tracking_started: bool,
    pub elapsed_ms: u64,
    pub stats: StatsSnapshot,
}

pub struct Orchestrator {
    config: BenchConfig,
    transport: Arc<dyn Transport>,
    gate: Arc<TrackingGate>,
}

impl Orchestrator {
    pub fn new(config: BenchConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            gate: Arc::new(TrackingGate::new()),
        }
    }

    /// Watch the run move through its phases
    pub fn phases(&self) -> watch::Receiver<Phase> {
        self.gate.subscribe()
    }

    pub async fn run(self) -> Result<RunReport> {
        self.config.validate()?;

        let mut ctx = RunContext::initialize(self.config, self.transport)?;
        ctx.gate = self.gate;
        let ctx = Arc::new(ctx);

        let participants = &ctx.config.participants;
        let senders = if participants.runs_senders() { participants.senders() } else { 0 };
        let receivers = if participants.runs_receivers() { participants.receivers() } else { 0 };

        info!(
            test_id = %ctx.config.test_id,
            transport = ctx.transport.name(),
            mode = ?ctx.config.mode,
            senders,
            receivers,
            shard = participants.shard_index,
            "🚀 Starting benchmark run"
        );

        ctx.transport
            .connect()
            .await
            .map_err(|e| BenchError::connection(format!("transport {}", ctx.transport.name()), e))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dumper = ctx
            .stats
            .start_dumper(ctx.config.timing.stats_dump_interval(), shutdown_rx);

        let warmup = if ctx.config.timing.warmup_duration().is_zero() {
            ctx.gate.open();
            None
        } else {
            ctx.gate.set_phase(Phase::Warmup);
            Some(spawn_warmup(ctx.gate.clone(), ctx.tracking_at(), ctx.deadline))
        };

        let (mut ticket_tx, ticket_rx) = match ctx.config.mode {
            DeliveryMode::Lookup => {
                let (tx, rx) = ticket_queues(receivers, ctx.config.lookup.queue_capacity());
                (tx, rx.into_iter().map(Some).collect())
            }
            DeliveryMode::Stream => (Vec::new(), Vec::new()),
        };

        let started = start_receivers(&ctx, receivers, ticket_rx).await;
        let receiver_handles = match started {
            Ok(handles) => handles,
            Err((e, handles)) => {
                abort_run(&ctx, handles, warmup, shutdown_tx, dumper).await;
                return Err(e);
            }
        };

        let queues: Vec<Option<mpsc::Sender<Ticket>>> = (0..senders)
            .map(|i| ticket_tx.get(i).cloned())
            .collect();
        ticket_tx.clear();

        let sender_handles = match start_senders(&ctx, queues).await {
            Ok(handles) => handles,
            Err((e, handles)) => {
                let all = receiver_handles.into_iter().chain(handles).collect();
                abort_run(&ctx, all, warmup, shutdown_tx, dumper).await;
                return Err(e);
            }
        };

        info!("All participants ready");

        let joined = futures::future::join(join_all(sender_handles), join_all(receiver_handles));
        tokio::pin!(joined);
        let (sender_results, receiver_results) = tokio::select! {
            results = &mut joined => results,
            _ = ctx.deadline.wait() => {
                ctx.gate.set_phase(Phase::Draining);
                joined.await
            }
        };

        if let Some(warmup) = warmup {
            warmup.abort();
        }
        ctx.gate.set_phase(Phase::Done);

        let _ = shutdown_tx.send(true);
        let stats = dumper.stop().await;

        if let Err(e) = ctx.transport.close().await {
            warn!("Transport close failed: {}", e);
        }

        let report = RunReport {
            test_id: ctx.config.test_id.clone(),
            senders,
            receivers,
            senders_failed: count_failures(Role::Sender, sender_results),
            receivers_failed: count_failures(Role::Receiver, receiver_results),
            tracking_started: ctx.gate.is_tracking(),
            elapsed_ms: elapsed_ms(ctx.started_at),
            stats,
        };

        info!(
            senders_failed = report.senders_failed,
            receivers_failed = report.receivers_failed,
            sent = report.stats.total_sent(),
            rcvd = report.stats.total_received(),
            errors = report.stats.total_errors(),
            "🏁 Benchmark run complete"
        );

        Ok(report)
    }
}

type StartResult = std::result::Result<Vec<TaskHandle>, (BenchError, Vec<TaskHandle>)>;

async fn start_receivers(
    ctx: &Arc<RunContext>,
    count: usize,
    mut tickets: Vec<Option<mpsc::Receiver<Ticket>>>,
) -> StartResult {
    let mut handles = Vec::with_capacity(count);
    let mut readies = Vec::with_capacity(count);

    for index in 0..count {
        let (ready_tx, ready_rx) = oneshot::channel();
        let ctx = ctx.clone();
        let queue = tickets.get_mut(index).and_then(Option::take);

        handles.push(tokio::spawn(async move {
            match queue {
                Some(queue) => run_lookup_receiver(ctx, index, queue, ready_tx).await.map(|_| ()),
                None => run_receiver(ctx, index, ready_tx).await.map(|_| ()),
            }
        }));
        readies.push(ready_rx);
    }

    match await_ready(Role::Receiver, readies).await {
        Ok(()) => Ok(handles),
        Err(e) => Err((e, handles)),
    }
}

async fn start_senders(
    ctx: &Arc<RunContext>,
    queues: Vec<Option<mpsc::Sender<Ticket>>>,
) -> StartResult {
    let mut handles = Vec::with_capacity(queues.len());
    let mut readies = Vec::with_capacity(queues.len());

    for (index, queue) in queues.into_iter().enumerate() {
        let (ready_tx, ready_rx) = oneshot::channel();
        let ctx = ctx.clone();

        handles.push(tokio::spawn(async move {
            run_sender(ctx, index, queue, ready_tx).await.map(|_| ())
        }));
        readies.push(ready_rx);
    }

    match await_ready(Role::Sender, readies).await {
        Ok(()) => Ok(handles),
        Err(e) => Err((e, handles)),
    }
}

/// Wait for every task of a role to report; the first failure wins
async fn await_ready(role: Role, readies: Vec<oneshot::Receiver<Result<()>>>) -> Result<()> {
    for (index, ready) in readies.into_iter().enumerate() {
        match ready.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(BenchError::NotStarted { role, index }),
        }
    }
    Ok(())
}

async fn abort_run(
    ctx: &RunContext,
    handles: Vec<TaskHandle>,
    warmup: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    dumper: crate::stats::StatsDumper,
) {
    error!("Startup failed, aborting run");

    for handle in &handles {
        handle.abort();
    }
    if let Some(warmup) = warmup {
        warmup.abort();
    }

    let _ = shutdown_tx.send(true);
    let _ = dumper.stop().await;
    let _ = ctx.transport.close().await;
    ctx.gate.set_phase(Phase::Done);
}

fn count_failures(
    role: Role,
    results: Vec<std::result::Result<Result<()>, tokio::task::JoinError>>,
) -> usize {
    results
        .into_iter()
        .enumerate()
        .filter(|(index, result)| match result {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                warn!(%role, index, error = %e, "Task ended early");
                true
            }
            Err(e) => {
                error!(%role, index, error = %e, "Task panicked");
                true
            }
        })
        .count()
}

fn elapsed_ms(started_at: Instant) -> u64 {
    let elapsed: Duration = Instant::now() - started_at;
    elapsed.as_millis() as u64
}
