//! In-memory key/value store used as a message relay
//!
//! Publishing stores the envelope under its partition key, last write wins.
//! A write only becomes readable after the visibility delay; until then
//! readers keep seeing the previous value, which is how eventually
//! consistent stores behave.

use crate::{Envelope, Publisher, SinkError, Subscriber, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct Version {
    envelope: Envelope,
    visible_at: Instant,
}

#[derive(Debug)]
struct KvState {
    /// (destination, key) -> versions in write order
    entries: Mutex<HashMap<(String, String), Vec<Version>>>,
    visibility_delay: Duration,
    connected: AtomicBool,
}

impl KvState {
    fn put(&self, destination: &str, key: String, envelope: Envelope) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let versions = entries.entry((destination.to_string(), key)).or_default();

        // Versions before the newest visible one can never be read again
        if let Some(visible) = versions.iter().rposition(|v| v.visible_at <= now) {
            versions.drain(..visible);
        }

        versions.push(Version {
            envelope,
            visible_at: now + self.visibility_delay,
        });
    }

    fn get(&self, destination: &str, key: &str) -> Option<Envelope> {
        let now = Instant::now();
        let entries = self.entries.lock();
        entries
            .get(&(destination.to_string(), key.to_string()))
            .and_then(|versions| versions.iter().rev().find(|v| v.visible_at <= now))
            .map(|v| v.envelope.clone())
    }
}

#[derive(Debug)]
pub struct MemoryKeyValue {
    name: String,
    state: Arc<KvState>,
}

impl MemoryKeyValue {
    pub fn new() -> Self {
        Self::with_visibility_delay(Duration::ZERO)
    }

    pub fn with_visibility_delay(delay: Duration) -> Self {
        Self {
            name: "memory-kv".to_string(),
            state: Arc::new(KvState {
                entries: Mutex::new(HashMap::new()),
                visibility_delay: delay,
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Number of keys written so far in a destination
    pub fn key_count(&self, destination: &str) -> usize {
        self.state
            .entries
            .lock()
            .keys()
            .filter(|(dest, _)| dest == destination)
            .count()
    }

    fn ensure_connected(&self) -> Result<(), SinkError> {
        if self.state.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SinkError::connection_failed(format!("{} not connected", self.name)))
        }
    }
}

impl Default for MemoryKeyValue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryKeyValue {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    async fn connect(&self) -> Result<(), SinkError> {
        self.state.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn open_publisher(&self, destination: &str) -> Result<Box<dyn Publisher>, SinkError> {
        self.ensure_connected()?;
        debug!(transport = %self.name, destination, "Opened publisher");

        Ok(Box::new(KvPublisher {
            destination: destination.to_string(),
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_subscriber(
        &self,
        destination: &str,
        _group: &str,
    ) -> Result<Box<dyn Subscriber>, SinkError> {
        self.ensure_connected()?;
        debug!(transport = %self.name, destination, "Opened reader");

        Ok(Box::new(KvSubscriber {
            destination: destination.to_string(),
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.state.connected.store(false, Ordering::Release);
        Ok(())
    }
}

#[derive(Debug)]
struct KvPublisher {
    destination: String,
    state: Arc<KvState>,
    closed: AtomicBool,
}

#[async_trait]
impl Publisher for KvPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) || !self.state.connected.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let key = envelope.partition_key.clone().ok_or_else(|| {
            SinkError::publish_failed("partition key required", envelope.size(), &self.destination)
        })?;

        self.state.put(&self.destination, key, envelope);
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[derive(Debug)]
struct KvSubscriber {
    destination: String,
    state: Arc<KvState>,
    closed: AtomicBool,
}

#[async_trait]
impl Subscriber for KvSubscriber {
    async fn fetch_batch(&self, _max_count: usize) -> Result<Vec<Envelope>, SinkError> {
        Err(SinkError::Unsupported("fetch_batch"))
    }

    async fn fetch_key(&self, key: &str) -> Result<Option<Envelope>, SinkError> {
        if self.closed.load(Ordering::Acquire) || !self.state.connected.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        Ok(self.state.get(&self.destination, key))
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
