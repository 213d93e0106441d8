use crate::backends::MemoryTopic;
use crate::{Envelope, Publisher, SinkError, Subscriber, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Where a [`FailingTransport`] injects its failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    Connect,
    OpenPublisher,
    OpenSubscriber,
    /// Publishers succeed this many times, then fail every call
    PublishAfter(usize),
}

/// A transport that fails at one configured point and otherwise behaves
/// like a [`MemoryTopic`]
#[derive(Debug)]
pub struct FailingTransport {
    inner: MemoryTopic,
    fail_point: FailPoint,
    error_message: String,
}

impl FailingTransport {
    pub fn new(fail_point: FailPoint) -> Self {
        Self::with_message(fail_point, "Simulated failure")
    }

    pub fn with_message(fail_point: FailPoint, error_message: impl Into<String>) -> Self {
        Self {
            inner: MemoryTopic::with_name_and_capacity("failing-transport", 1000),
            fail_point,
            error_message: error_message.into(),
        }
    }
}

#[async_trait]
impl Transport for FailingTransport {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn connect(&self) -> Result<(), SinkError> {
        if self.fail_point == FailPoint::Connect {
            return Err(SinkError::connection_failed(&self.error_message));
        }
        self.inner.connect().await
    }

    async fn open_publisher(&self, destination: &str) -> Result<Box<dyn Publisher>, SinkError> {
        match self.fail_point {
            FailPoint::OpenPublisher => Err(SinkError::connection_failed(&self.error_message)),
            FailPoint::PublishAfter(successes) => {
                let inner = self.inner.open_publisher(destination).await?;
                Ok(Box::new(FailingPublisher::wrap(inner, successes)))
            }
            _ => self.inner.open_publisher(destination).await,
        }
    }

    async fn open_subscriber(
        &self,
        destination: &str,
        group: &str,
    ) -> Result<Box<dyn Subscriber>, SinkError> {
        if self.fail_point == FailPoint::OpenSubscriber {
            return Err(SinkError::connection_failed(&self.error_message));
        }
        self.inner.open_subscriber(destination, group).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        self.inner.close().await
    }
}

/// A publisher that forwards the first `successes` envelopes, then fails
#[derive(Debug)]
pub struct FailingPublisher {
    inner: Option<Box<dyn Publisher>>,
    successes: usize,
    attempts: AtomicUsize,
}

impl FailingPublisher {
    /// Fails every publish
    pub fn new() -> Self {
        Self {
            inner: None,
            successes: 0,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn wrap(inner: Box<dyn Publisher>, successes: usize) -> Self {
        Self {
            inner: Some(inner),
            successes,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Default for FailingPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish(&self, envelope: Envelope) -> Result<(), SinkError> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        match &self.inner {
            Some(inner) if attempt < self.successes => inner.publish(envelope).await,
            _ => Err(SinkError::publish_failed(
                "Simulated failure",
                envelope.size(),
                "failing",
            )),
        }
    }

    async fn close(&self) -> Result<(), SinkError> {
        match &self.inner {
            Some(inner) => inner.close().await,
            None => Ok(()),
        }
    }
}

/// A key lookup subscriber that replays scripted responses in order,
/// then reports every key as missing
#[derive(Debug, Default)]
pub struct ScriptedSubscriber {
    responses: Mutex<VecDeque<Result<Option<Envelope>, SinkError>>>,
    lookups: Mutex<Vec<String>>,
}

impl ScriptedSubscriber {
    pub fn new(responses: impl IntoIterator<Item = Result<Option<Envelope>, SinkError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            lookups: Mutex::new(Vec::new()),
        }
    }

    /// Keys looked up so far, in call order
    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

#[async_trait]
impl Subscriber for ScriptedSubscriber {
    async fn fetch_batch(&self, _max_count: usize) -> Result<Vec<Envelope>, SinkError> {
        Err(SinkError::Unsupported("fetch_batch"))
    }

    async fn fetch_key(&self, key: &str) -> Result<Option<Envelope>, SinkError> {
        self.lookups.lock().push(key.to_string());
        self.responses.lock().pop_front().unwrap_or(Ok(None))
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
