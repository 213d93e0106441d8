//! Default values
//!
//! Defaults match what the harness has historically been run with, so a
//! config file only needs to name what differs.

/// Participant defaults
pub mod participants {
    pub const TOTAL_SENDERS: usize = 2;
    pub const TOTAL_RECEIVERS: usize = 2;
}

/// Timing defaults (milliseconds)
pub mod timing {
    pub const TEST_DURATION_MS: u64 = 5 * 60 * 1_000;
    pub const WARMUP_DURATION_MS: u64 = 60 * 1_000;
    pub const SEND_INTERVAL_MS: u64 = 5_000;
    pub const RECEIVE_INTERVAL_MS: u64 = 1_000;
    pub const STATS_DUMP_INTERVAL_MS: u64 = 30_000;
}

/// Message defaults
pub mod messages {
    pub const PER_SEND: usize = 1;
    pub const PER_RECEIVE: usize = 1;

    /// Generated key pool size when no key file is given
    pub const KEY_COUNT: usize = 64;
}

/// Envelope attribute defaults
pub mod attributes {
    pub const PROPERTY_NAME: &str = "senderid";
    pub const CONTENT_TYPE: &str = "application/json";
}

/// Backend defaults
pub mod backend {
    pub const TARGET: &str = "memory://local";
    pub const DESTINATION: &str = "loadbench";
    pub const CONSUMER_GROUP_PREFIX: &str = "loadbench-";

    /// Envelopes retained per in-memory subscription before the oldest drop
    pub const QUEUE_CAPACITY: usize = 10_000;
}

/// Lookup protocol defaults
pub mod lookup {
    pub const MAX_RETRIES: u32 = 10;
}

/// Environment variable prefix for overrides (`LOADBENCH_TIMING__SEND_INTERVAL_MS`)
pub const ENV_PREFIX: &str = "LOADBENCH";

/// Shard ordinal injected by indexed batch jobs
pub const SHARD_INDEX_ENV: &str = "JOB_COMPLETION_INDEX";
