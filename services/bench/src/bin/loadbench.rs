//! Load generator binary
//!
//! Usage:
//!   loadbench --config config/loadbench.toml
//!   loadbench --gateways 4 --duration-ms 60000 --warmup-ms 10000
//!   JOB_COMPLETION_INDEX=2 loadbench --config shard.toml --identities-file ids.txt

use anyhow::{Context, Result};
use bench_config::ConfigLoader;
use bench_service::{backend::transport_for, Orchestrator};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "loadbench")]
#[command(about = "Synthetic load generator for message backends")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run identifier; generated when neither flag nor config sets one
    #[arg(long)]
    test_id: Option<String>,

    /// Delivery mode (stream, lookup)
    #[arg(long)]
    mode: Option<String>,

    /// Backend kind (memory-topic, memory-kv)
    #[arg(long)]
    backend: Option<String>,

    #[arg(long)]
    senders: Option<u64>,

    #[arg(long)]
    receivers: Option<u64>,

    /// Symmetric participant count, replaces --senders and --receivers
    #[arg(long)]
    gateways: Option<u64>,

    #[arg(long)]
    sender_only: bool,

    #[arg(long)]
    receiver_only: bool,

    #[arg(long)]
    shard_index: Option<u64>,

    #[arg(long)]
    duration_ms: Option<u64>,

    #[arg(long)]
    warmup_ms: Option<u64>,

    #[arg(long)]
    send_interval_ms: Option<u64>,

    #[arg(long)]
    receive_interval_ms: Option<u64>,

    #[arg(long)]
    stats_interval_ms: Option<u64>,

    /// Records per published batch
    #[arg(long)]
    per_send: Option<u64>,

    /// Key class for generated keys (any, a, a-private, loopback)
    #[arg(long)]
    key_class: Option<String>,

    #[arg(long)]
    keys_file: Option<String>,

    #[arg(long)]
    identities_file: Option<String>,

    #[arg(long)]
    max_retries: Option<u64>,

    /// Write the final report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting loadbench {}", env!("CARGO_PKG_VERSION"));

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_file(path);
    }

    let mut config = loader
        .set_override_option("test_id", args.test_id.clone())
        .set_override_option("mode", args.mode.clone())
        .set_override_option("backend.kind", args.backend.clone())
        .set_override_option("participants.total_senders", args.senders)
        .set_override_option("participants.total_receivers", args.receivers)
        .set_override_option("participants.total_gateways", args.gateways)
        .set_override_option("participants.sender_only", args.sender_only.then_some(true))
        .set_override_option("participants.receiver_only", args.receiver_only.then_some(true))
        .set_override_option("participants.shard_index", args.shard_index)
        .set_override_option("timing.test_duration_ms", args.duration_ms)
        .set_override_option("timing.warmup_duration_ms", args.warmup_ms)
        .set_override_option("timing.send_interval_ms", args.send_interval_ms)
        .set_override_option("timing.receive_interval_ms", args.receive_interval_ms)
        .set_override_option("timing.stats_dump_interval_ms", args.stats_interval_ms)
        .set_override_option("messages.per_send", args.per_send)
        .set_override_option("messages.key_class", args.key_class.clone())
        .set_override_option("messages.keys_file", args.keys_file.clone())
        .set_override_option("messages.identities_file", args.identities_file.clone())
        .set_override_option("lookup.max_retries", args.max_retries)
        .load()
        .map_err(|e| {
            error!("Failed to load configuration: {}", e);
            e
        })?;

    if config.test_id.is_empty() {
        config.test_id = uuid::Uuid::new_v4().to_string();
        info!("Generated test id {}", config.test_id);
    }

    info!("Effective configuration:\n{}", config.to_toml()?);

    let transport = transport_for(&config.backend);
    let report = Orchestrator::new(config, transport)
        .run()
        .await
        .context("Benchmark run failed")?;

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(())
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log level")?;

    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(fmt::layer().json()).try_init()?;
    } else {
        registry.with(fmt::layer()).try_init()?;
    }

    Ok(())
}
