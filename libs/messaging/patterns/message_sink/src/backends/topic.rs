//! In-memory pub/sub topic
//!
//! Every subscription group opened on a destination receives its own copy of
//! each envelope published after the group was created. Subscribers sharing a
//! group compete for that group's queue. Each queue is bounded; when full the
//! oldest envelope is dropped.

use crate::{Envelope, Publisher, SinkError, Subscriber, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Envelopes retained per group when no capacity is given
pub const DEFAULT_GROUP_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct GroupQueue {
    envelopes: VecDeque<Envelope>,
    dropped: u64,
}

type SharedQueue = Arc<Mutex<GroupQueue>>;

#[derive(Debug)]
struct TopicState {
    /// destination -> group -> queue
    destinations: Mutex<HashMap<String, HashMap<String, SharedQueue>>>,
    capacity: usize,
    connected: AtomicBool,
}

impl TopicState {
    fn group_queue(&self, destination: &str, group: &str) -> SharedQueue {
        let mut destinations = self.destinations.lock();
        destinations
            .entry(destination.to_string())
            .or_default()
            .entry(group.to_string())
            .or_default()
            .clone()
    }

    fn existing_queue(&self, destination: &str, group: &str) -> Option<SharedQueue> {
        self.destinations
            .lock()
            .get(destination)
            .and_then(|groups| groups.get(group))
            .cloned()
    }
}

#[derive(Debug)]
pub struct MemoryTopic {
    name: String,
    state: Arc<TopicState>,
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_GROUP_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_name_and_capacity("memory-topic", capacity)
    }

    pub fn with_name_and_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(TopicState {
                destinations: Mutex::new(HashMap::new()),
                capacity,
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Envelopes waiting in a group's queue
    pub fn pending(&self, destination: &str, group: &str) -> usize {
        self.state
            .existing_queue(destination, group)
            .map(|queue| queue.lock().envelopes.len())
            .unwrap_or(0)
    }

    /// Envelopes dropped from a group's queue because it was full
    pub fn dropped(&self, destination: &str, group: &str) -> u64 {
        self.state
            .existing_queue(destination, group)
            .map(|queue| queue.lock().dropped)
            .unwrap_or(0)
    }

    fn ensure_connected(&self) -> Result<(), SinkError> {
        if self.state.connected.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(SinkError::connection_failed(format!("{} not connected", self.name)))
        }
    }
}

impl Default for MemoryTopic {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTopic {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    async fn connect(&self) -> Result<(), SinkError> {
        if self.state.capacity == 0 {
            return Err(SinkError::invalid_config(format!(
                "{}: group capacity must be at least 1",
                self.name
            )));
        }
        self.state.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn open_publisher(&self, destination: &str) -> Result<Box<dyn Publisher>, SinkError> {
        self.ensure_connected()?;
        debug!(transport = %self.name, destination, "Opened publisher");

        Ok(Box::new(TopicPublisher {
            destination: destination.to_string(),
            state: self.state.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn open_subscriber(
        &self,
        destination: &str,
        group: &str,
    ) -> Result<Box<dyn Subscriber>, SinkError> {
        self.ensure_connected()?;
        debug!(transport = %self.name, destination, group, "Opened subscriber");

        Ok(Box::new(TopicSubscriber {
            queue: self.state.group_queue(destination, group),
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
struct TopicPublisher {
    destination: String,
    state: Arc<TopicState>,
    closed: AtomicBool,
}

#[async_trait]
impl Publisher for TopicPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) || !self.state.connected.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        // Snapshot the groups so the destination map is not held while copying
        let queues: Vec<SharedQueue> = self
            .state
            .destinations
            .lock()
            .get(&self.destination)
            .map(|groups| groups.values().cloned().collect())
            .unwrap_or_default();

        for queue in queues {
            let mut queue = queue.lock();
            if queue.envelopes.len() >= self.state.capacity {
                queue.envelopes.pop_front();
                queue.dropped += 1;
                if queue.dropped == 1 {
                    warn!(destination = %self.destination, "Group queue full, dropping oldest envelopes");
                }
            }
            queue.envelopes.push_back(envelope.clone());
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[derive(Debug)]
struct TopicSubscriber {
    queue: SharedQueue,
    state: Arc<TopicState>,
    closed: AtomicBool,
}

#[async_trait]
impl Subscriber for TopicSubscriber {
    async fn fetch_batch(&self, max_count: usize) -> Result<Vec<Envelope>, SinkError> {
        if self.closed.load(Ordering::Acquire) || !self.state.connected.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }

        let mut queue = self.queue.lock();
        let take = max_count.min(queue.envelopes.len());
        Ok(queue.envelopes.drain(..take).collect())
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(body: &str) -> Envelope {
        Envelope::new_unchecked(body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_open_requires_connection() {
        let topic = MemoryTopic::new();
        assert!(matches!(
            topic.open_publisher("bench").await,
            Err(SinkError::ConnectionFailed(_))
        ));

        topic.connect().await.unwrap();
        assert!(topic.open_publisher("bench").await.is_ok());
    }

    #[tokio::test]
    async fn test_fan_out_across_groups() {
        let topic = MemoryTopic::new();
        topic.connect().await.unwrap();

        let first = topic.open_subscriber("bench", "g0").await.unwrap();
        let second = topic.open_subscriber("bench", "g1").await.unwrap();
        let publisher = topic.open_publisher("bench").await.unwrap();

        publisher.publish(envelope("a")).await.unwrap();
        publisher.publish(envelope("b")).await.unwrap();

        let got = first.fetch_batch(10).await.unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].body, b"a");
        assert_eq!(second.fetch_batch(10).await.unwrap().len(), 2);
        assert!(first.fetch_batch(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_competing_consumers_share_a_group() {
        let topic = MemoryTopic::new();
        topic.connect().await.unwrap();

        let a = topic.open_subscriber("bench", "shared").await.unwrap();
        let b = topic.open_subscriber("bench", "shared").await.unwrap();
        let publisher = topic.open_publisher("bench").await.unwrap();

        for body in ["1", "2", "3"] {
            publisher.publish(envelope(body)).await.unwrap();
        }

        let from_a = a.fetch_batch(2).await.unwrap();
        let from_b = b.fetch_batch(2).await.unwrap();
        assert_eq!(from_a.len(), 2);
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].body, b"3");
    }

    #[tokio::test]
    async fn test_zero_capacity_refuses_to_connect() {
        let topic = MemoryTopic::with_capacity(0);
        assert!(matches!(topic.connect().await, Err(SinkError::InvalidConfig(_))));
        assert!(!topic.is_connected());
    }

    #[tokio::test]
    async fn test_bounded_retention_drops_oldest() {
        let topic = MemoryTopic::with_capacity(2);
        topic.connect().await.unwrap();

        let subscriber = topic.open_subscriber("bench", "g").await.unwrap();
        let publisher = topic.open_publisher("bench").await.unwrap();
        for body in ["1", "2", "3"] {
            publisher.publish(envelope(body)).await.unwrap();
        }

        assert_eq!(topic.pending("bench", "g"), 2);
        assert_eq!(topic.dropped("bench", "g"), 1);

        let got = subscriber.fetch_batch(10).await.unwrap();
        assert_eq!(got[0].body, b"2");
        assert_eq!(got[1].body, b"3");
    }

    #[tokio::test]
    async fn test_closed_handles_fail() {
        let topic = MemoryTopic::new();
        topic.connect().await.unwrap();

        let publisher = topic.open_publisher("bench").await.unwrap();
        let subscriber = topic.open_subscriber("bench", "g").await.unwrap();

        publisher.close().await.unwrap();
        assert!(matches!(publisher.publish(envelope("x")).await, Err(SinkError::Closed)));

        topic.close().await.unwrap();
        assert!(matches!(subscriber.fetch_batch(1).await, Err(SinkError::Closed)));
        assert!(matches!(
            subscriber.fetch_key("k").await,
            Err(SinkError::Unsupported(_))
        ));
    }
}
