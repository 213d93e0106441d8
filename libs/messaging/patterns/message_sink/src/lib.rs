//! Transport contract between the load generator and a message backend
//!
//! A [`Transport`] is one connection to a backend. Sender tasks open a
//! [`Publisher`] on a destination; receiver tasks open a [`Subscriber`] on a
//! destination and subscription group. Backends that only support keyed
//! reads implement [`Subscriber::fetch_key`] instead of batch fetches.

pub mod backends;
pub mod envelope;
pub mod error;
pub mod test_utils;

use async_trait::async_trait;
use std::fmt::Debug;

pub use backends::{MemoryKeyValue, MemoryTopic};
pub use envelope::{AttributeValue, Envelope, DEFAULT_MAX_BODY_SIZE};
pub use error::SinkError;

/// A connection to a message backend
#[async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Backend name for logs
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    /// Establish the connection (no-op if already connected)
    async fn connect(&self) -> Result<(), SinkError>;

    async fn open_publisher(&self, destination: &str) -> Result<Box<dyn Publisher>, SinkError>;

    /// Open a receive handle; `group` selects the subscription or consumer
    /// group where the backend has one
    async fn open_subscriber(
        &self,
        destination: &str,
        group: &str,
    ) -> Result<Box<dyn Subscriber>, SinkError>;

    /// Close the connection; open handles fail afterwards
    async fn close(&self) -> Result<(), SinkError>;
}

/// Send side of a destination
#[async_trait]
pub trait Publisher: Send + Sync + Debug {
    /// Publish one envelope, returning once the backend acknowledged it
    async fn publish(&self, envelope: Envelope) -> Result<(), SinkError>;

    async fn close(&self) -> Result<(), SinkError>;
}

/// Receive side of a destination
#[async_trait]
pub trait Subscriber: Send + Sync + Debug {
    /// Up to `max_count` envelopes; empty when nothing is waiting
    async fn fetch_batch(&self, max_count: usize) -> Result<Vec<Envelope>, SinkError>;

    /// Current value stored under `key`, `None` if not (yet) visible
    async fn fetch_key(&self, _key: &str) -> Result<Option<Envelope>, SinkError> {
        Err(SinkError::Unsupported("fetch_key"))
    }

    async fn close(&self) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_transport_as_trait_object() {
        let transports: Vec<Arc<dyn Transport>> = vec![
            Arc::new(MemoryTopic::new()),
            Arc::new(MemoryKeyValue::new()),
        ];

        for transport in transports {
            assert!(!transport.is_connected());
            transport.connect().await.unwrap();
            assert!(transport.is_connected());

            let publisher = transport.open_publisher("bench").await.unwrap();
            let subscriber = transport.open_subscriber("bench", "g").await.unwrap();
            publisher
                .publish(Envelope::new_unchecked(b"{}".to_vec()).with_partition_key("k"))
                .await
                .unwrap();

            publisher.close().await.unwrap();
            subscriber.close().await.unwrap();
            transport.close().await.unwrap();
            assert!(!transport.is_connected());
        }
    }

    #[tokio::test]
    async fn test_envelope_survives_topic_round_trip() {
        let topic = MemoryTopic::new();
        topic.connect().await.unwrap();

        let subscriber = topic.open_subscriber("bench", "g").await.unwrap();
        let publisher = topic.open_publisher("bench").await.unwrap();

        let sent = Envelope::new(b"payload".to_vec())
            .unwrap()
            .with_attribute("testId", "run-1")
            .with_attribute("senderIdx", 4i64)
            .with_partition_key("sender-4");
        publisher.publish(sent.clone()).await.unwrap();

        let received = subscriber.fetch_batch(1).await.unwrap();
        assert_eq!(received, vec![sent]);
    }
}
