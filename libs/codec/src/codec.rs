//! MessageCodec - builds, serializes and checks synthetic batches
//!
//! A codec is bound to one [`KeyPool`]; every record it produces references
//! a key from that pool and every record it validates must satisfy the pool's
//! address class. Batch timestamps never go backwards for one codec instance,
//! even if the wall clock does.

use crate::message::{
    current_timestamp_ms, Attributes, MessageBatch, MessageRecord, CURRENT_LIMIT, DELTA_LIMIT,
};
use crate::{validate_record, CodecError, Result};
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use types::{AddressClass, KeyPool, PoolError};

#[derive(Debug)]
pub struct MessageCodec {
    keys: Arc<KeyPool>,
    last_timestamp_ms: AtomicI64,
}

impl MessageCodec {
    /// Bind a codec to an initialized key pool
    pub fn new(keys: Arc<KeyPool>) -> Result<Self> {
        if !keys.is_initialized() {
            return Err(CodecError::Pool(PoolError::NotInitialized { pool: "key" }));
        }

        Ok(Self {
            keys,
            last_timestamp_ms: AtomicI64::new(0),
        })
    }

    pub fn keys(&self) -> &KeyPool {
        &self.keys
    }

    /// Class records are validated against
    pub fn class(&self) -> AddressClass {
        self.keys.class().unwrap_or_default()
    }

    /// Build a batch of `n` random records; `n == 0` yields an empty batch
    pub fn build_batch(&self, n: usize, attributes: Option<&Attributes>) -> Result<MessageBatch> {
        let mut rng = rand::thread_rng();
        let mut list = Vec::with_capacity(n);

        for _ in 0..n {
            let (current, delta) = random_counters(&mut rng);
            list.push(MessageRecord {
                current,
                delta,
                client_key: self.keys.random_key()?.to_string(),
                attributes: attributes.cloned(),
            });
        }

        Ok(MessageBatch {
            count: list.len(),
            list,
            timestamp_ms: self.next_timestamp_ms(),
        })
    }

    /// Build and serialize a batch of `n` records
    pub fn encode_batch(&self, n: usize, attributes: Option<&Attributes>) -> Result<Vec<u8>> {
        let batch = self.build_batch(n, attributes)?;
        serde_json::to_vec(&batch).map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Serialize a single-record batch and return the record's key with it
    pub fn encode_single_with_key(&self, attributes: Option<&Attributes>) -> Result<(Vec<u8>, String)> {
        let batch = self.build_batch(1, attributes)?;
        let key = batch
            .list
            .first()
            .map(|record| record.client_key.clone())
            .ok_or_else(|| CodecError::Encoding("single-record batch is empty".to_string()))?;

        let bytes = serde_json::to_vec(&batch).map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok((bytes, key))
    }

    /// Deserialize a batch, checking `count` against the record list
    pub fn decode_batch(&self, bytes: &[u8]) -> Result<MessageBatch> {
        if bytes.is_empty() {
            return Err(CodecError::decoding("invalid or empty message", 0));
        }

        let batch: MessageBatch = serde_json::from_slice(bytes).map_err(|e| {
            debug!(size = bytes.len(), error = %e, "Malformed batch");
            CodecError::decoding(e.to_string(), bytes.len())
        })?;

        if batch.count != batch.list.len() {
            debug!(count = batch.count, records = batch.list.len(), "Batch count mismatch");
            return Err(CodecError::decoding(
                format!("count {} does not match {} records", batch.count, batch.list.len()),
                bytes.len(),
            ));
        }

        Ok(batch)
    }

    /// Deserialize a batch and run `on_record` over each record in order
    ///
    /// The first callback error aborts decoding and is returned unchanged.
    pub fn decode_batch_with<F>(&self, bytes: &[u8], mut on_record: F) -> Result<MessageBatch>
    where
        F: FnMut(&MessageRecord) -> Result<()>,
    {
        let batch = self.decode_batch(bytes)?;
        for record in &batch.list {
            on_record(record)?;
        }
        Ok(batch)
    }

    /// Deserialize a batch and validate every record
    pub fn decode_validated(&self, bytes: &[u8]) -> Result<MessageBatch> {
        let class = self.class();
        self.decode_batch_with(bytes, |record| validate_record(record, class))
    }

    /// Validate one record against the bound pool's class
    pub fn validate_record(&self, record: &MessageRecord) -> Result<()> {
        validate_record(record, self.class())
    }

    /// Time since `batch` was created, clamped to zero under clock skew
    pub fn batch_age(batch: &MessageBatch) -> Duration {
        let age_ms = current_timestamp_ms().saturating_sub(batch.timestamp_ms);
        Duration::from_millis(age_ms.max(0) as u64)
    }

    fn next_timestamp_ms(&self) -> i64 {
        let now = current_timestamp_ms();
        let previous = self.last_timestamp_ms.fetch_max(now, Ordering::AcqRel);
        now.max(previous)
    }
}

/// Random value in [1, limit): a zero draw is replaced by `1 + rand(limit - 1)`,
/// so the result stays uniform over that range
fn random_counter<R: Rng + ?Sized>(rng: &mut R, limit: u32) -> u32 {
    if limit <= 1 {
        return limit;
    }

    let value = rng.gen_range(0..limit);
    if value == 0 {
        1 + rng.gen_range(0..limit - 1)
    } else {
        value
    }
}

fn random_counters<R: Rng + ?Sized>(rng: &mut R) -> (u32, u32) {
    (
        random_counter(rng, CURRENT_LIMIT),
        random_counter(rng, DELTA_LIMIT),
    )
}
