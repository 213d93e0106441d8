//! Benchmark run configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `LOADBENCH_<SECTION>__<FIELD>` environment variables, then explicit
//! overrides (normally command-line flags).

use crate::defaults;
use crate::error::{ConfigError, Result};
use config_crate::{Config, Environment, File, Value};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use types::AddressClass;

/// How receivers obtain what senders published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Receivers pull batches from a subscription
    #[default]
    Stream,
    /// Receivers look each published key up, retrying until it is visible
    Lookup,
}

/// Backend implementation to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    MemoryTopic,
    MemoryKv,
}

impl BackendKind {
    /// Delivery mode this backend supports
    pub fn delivery_mode(self) -> DeliveryMode {
        match self {
            BackendKind::MemoryTopic => DeliveryMode::Stream,
            BackendKind::MemoryKv => DeliveryMode::Lookup,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Run identifier carried on every envelope
    pub test_id: String,
    /// Attribute key holding the sender's identity
    pub property_name: String,
    pub content_type: String,
    pub mode: DeliveryMode,
    pub backend: BackendConfig,
    pub participants: ParticipantsConfig,
    pub timing: TimingConfig,
    pub messages: MessagesConfig,
    pub lookup: LookupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Connection string or host
    pub target: String,
    /// Topic or key space
    pub destination: String,
    pub consumer_group_prefix: String,
    /// Delay before a stored value becomes readable (memory-kv)
    pub visibility_delay_ms: u64,
    /// Envelopes retained per subscription (memory-topic)
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantsConfig {
    pub total_senders: usize,
    pub total_receivers: usize,
    /// Symmetric count replacing both totals when set
    pub total_gateways: Option<usize>,
    pub sender_only: bool,
    pub receiver_only: bool,
    pub shard_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub test_duration_ms: u64,
    pub warmup_duration_ms: u64,
    pub send_interval_ms: u64,
    pub receive_interval_ms: u64,
    pub stats_dump_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MessagesConfig {
    pub per_send: usize,
    pub per_receive: usize,
    pub key_class: AddressClass,
    pub key_count: Option<usize>,
    pub keys_file: Option<PathBuf>,
    pub identity_count: Option<usize>,
    pub identities_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub max_retries: u32,
    /// Pending tickets per participant; falls back to `max_retries`
    pub queue_capacity: Option<usize>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            test_id: String::new(),
            property_name: defaults::attributes::PROPERTY_NAME.to_string(),
            content_type: defaults::attributes::CONTENT_TYPE.to_string(),
            mode: DeliveryMode::default(),
            backend: BackendConfig::default(),
            participants: ParticipantsConfig::default(),
            timing: TimingConfig::default(),
            messages: MessagesConfig::default(),
            lookup: LookupConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            target: defaults::backend::TARGET.to_string(),
            destination: defaults::backend::DESTINATION.to_string(),
            consumer_group_prefix: defaults::backend::CONSUMER_GROUP_PREFIX.to_string(),
            visibility_delay_ms: 0,
            queue_capacity: defaults::backend::QUEUE_CAPACITY,
        }
    }
}

impl Default for ParticipantsConfig {
    fn default() -> Self {
        Self {
            total_senders: defaults::participants::TOTAL_SENDERS,
            total_receivers: defaults::participants::TOTAL_RECEIVERS,
            total_gateways: None,
            sender_only: false,
            receiver_only: false,
            shard_index: 0,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            test_duration_ms: defaults::timing::TEST_DURATION_MS,
            warmup_duration_ms: defaults::timing::WARMUP_DURATION_MS,
            send_interval_ms: defaults::timing::SEND_INTERVAL_MS,
            receive_interval_ms: defaults::timing::RECEIVE_INTERVAL_MS,
            stats_dump_interval_ms: defaults::timing::STATS_DUMP_INTERVAL_MS,
        }
    }
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            per_send: defaults::messages::PER_SEND,
            per_receive: defaults::messages::PER_RECEIVE,
            key_class: AddressClass::default(),
            key_count: None,
            keys_file: None,
            identity_count: None,
            identities_file: None,
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::lookup::MAX_RETRIES,
            queue_capacity: None,
        }
    }
}

impl ParticipantsConfig {
    /// Sender participants per shard
    pub fn senders(&self) -> usize {
        self.total_gateways.unwrap_or(self.total_senders)
    }

    /// Receiver participants per shard
    pub fn receivers(&self) -> usize {
        self.total_gateways.unwrap_or(self.total_receivers)
    }

    pub fn runs_senders(&self) -> bool {
        !self.receiver_only
    }

    pub fn runs_receivers(&self) -> bool {
        !self.sender_only
    }
}

impl TimingConfig {
    pub fn test_duration(&self) -> Duration {
        Duration::from_millis(self.test_duration_ms)
    }

    pub fn warmup_duration(&self) -> Duration {
        Duration::from_millis(self.warmup_duration_ms)
    }

    pub fn send_interval(&self) -> Duration {
        Duration::from_millis(self.send_interval_ms)
    }

    pub fn receive_interval(&self) -> Duration {
        Duration::from_millis(self.receive_interval_ms)
    }

    pub fn stats_dump_interval(&self) -> Duration {
        Duration::from_millis(self.stats_dump_interval_ms)
    }

    /// Warmup plus measured duration
    pub fn total_run(&self) -> Duration {
        self.warmup_duration() + self.test_duration()
    }
}

impl LookupConfig {
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
            .unwrap_or(self.max_retries as usize)
            .max(1)
    }
}

impl BenchConfig {
    /// Load with the default layering and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = path {
            loader = loader.with_file(path);
        }
        loader.load()
    }

    /// Number of identities to generate when no identities file is given
    pub fn identity_count(&self) -> usize {
        self.messages.identity_count.unwrap_or_else(|| {
            self.participants
                .senders()
                .max(self.participants.receivers())
        })
    }

    /// Number of keys to generate when no keys file is given
    pub fn key_count(&self) -> usize {
        self.messages
            .key_count
            .unwrap_or(defaults::messages::KEY_COUNT)
    }

    /// Subscription group for a receiver participant
    pub fn consumer_group(&self, real_index: usize) -> String {
        format!("{}{}", self.backend.consumer_group_prefix, real_index)
    }

    /// Effective configuration as TOML, for run logs
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Expand `~` and `$VAR` references in file paths and the backend target
    pub fn expand_env_vars(&mut self) -> Result<()> {
        self.backend.target = expand("backend.target", &self.backend.target)?;

        if let Some(path) = &self.messages.keys_file {
            let expanded = expand("messages.keys_file", &path.to_string_lossy())?;
            self.messages.keys_file = Some(PathBuf::from(expanded));
        }

        if let Some(path) = &self.messages.identities_file {
            let expanded = expand("messages.identities_file", &path.to_string_lossy())?;
            self.messages.identities_file = Some(PathBuf::from(expanded));
        }

        Ok(())
    }

    /// Reject combinations the harness cannot run
    pub fn validate(&self) -> Result<()> {
        let participants = &self.participants;
        if participants.sender_only && participants.receiver_only {
            return Err(ConfigError::invalid(
                "participants",
                "sender_only and receiver_only are mutually exclusive",
            ));
        }
        if participants.runs_senders() && participants.senders() == 0 {
            return Err(ConfigError::invalid(
                "participants.total_senders",
                "at least one sender is required",
            ));
        }
        if participants.runs_receivers() && participants.receivers() == 0 {
            return Err(ConfigError::invalid(
                "participants.total_receivers",
                "at least one receiver is required",
            ));
        }

        let timing = &self.timing;
        for (field, value) in [
            ("timing.send_interval_ms", timing.send_interval_ms),
            ("timing.receive_interval_ms", timing.receive_interval_ms),
            ("timing.stats_dump_interval_ms", timing.stats_dump_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "interval must be non-zero"));
            }
        }

        if self.messages.per_send == 0 {
            return Err(ConfigError::invalid("messages.per_send", "must be at least 1"));
        }
        if self.messages.per_receive == 0 {
            return Err(ConfigError::invalid("messages.per_receive", "must be at least 1"));
        }

        if self.messages.keys_file.is_some() && self.messages.key_count.is_some() {
            return Err(ConfigError::invalid(
                "messages.keys_file",
                "keys_file and key_count are mutually exclusive",
            ));
        }
        if self.messages.identities_file.is_some() && self.messages.identity_count.is_some() {
            return Err(ConfigError::invalid(
                "messages.identities_file",
                "identities_file and identity_count are mutually exclusive",
            ));
        }
        if participants.shard_index > 0 && self.messages.identities_file.is_none() {
            return Err(ConfigError::Missing("messages.identities_file"));
        }

        if self.mode == DeliveryMode::Lookup && self.lookup.max_retries == 0 {
            return Err(ConfigError::invalid("lookup.max_retries", "must be at least 1"));
        }

        if self.backend.kind.delivery_mode() != self.mode {
            return Err(ConfigError::invalid(
                "mode",
                format!(
                    "backend {:?} does not support {:?} delivery",
                    self.backend.kind, self.mode
                ),
            ));
        }

        Ok(())
    }
}

fn expand(field: &'static str, raw: &str) -> Result<String> {
    shellexpand::full(raw)
        .map(|s| s.into_owned())
        .map_err(|e| ConfigError::Expand {
            field,
            reason: e.to_string(),
        })
}

/// Builder for layered configuration loading
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
    shard_index_var: Option<String>,
    overrides: Vec<(String, Value)>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: defaults::ENV_PREFIX.to_string(),
            shard_index_var: Some(defaults::SHARD_INDEX_ENV.to_string()),
            overrides: Vec::new(),
        }
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Variable supplying the shard ordinal, `None` to ignore it
    pub fn with_shard_index_var(mut self, var: Option<&str>) -> Self {
        self.shard_index_var = var.map(str::to_string);
        self
    }

    /// Override a dotted key (`timing.send_interval_ms`) above every other layer
    pub fn set_override(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.overrides.push((key.to_string(), value.into()));
        self
    }

    pub fn set_override_option<T: Into<Value>>(self, key: &str, value: Option<T>) -> Self {
        match value {
            Some(value) => self.set_override(key, value),
            None => self,
        }
    }

    /// Merge all layers, expand paths and validate
    pub fn load(self) -> Result<BenchConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            info!("Loading benchmark config: {:?}", path);
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(var) = &self.shard_index_var {
            if let Ok(raw) = std::env::var(var) {
                let index: u64 = raw.trim().parse().map_err(|_| {
                    ConfigError::invalid(
                        "participants.shard_index",
                        format!("{}={:?} is not a shard ordinal", var, raw),
                    )
                })?;
                debug!("Shard index {} from {}", index, var);
                builder = builder.set_override("participants.shard_index", index)?;
            }
        }

        for (key, value) in self.overrides {
            builder = builder.set_override(key, value)?;
        }

        let mut config: BenchConfig = builder.build()?.try_deserialize()?;
        config.expand_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}
