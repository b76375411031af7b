//! Shared message channel between control plane replicas
//!
//! Every replica publishes its events on a fixed topic and subscribes to the
//! same topic to observe the writes of its peers. The trait hides the
//! transport; the in-process implementation backs tests and single-host
//! deployments with a broadcast channel.

use async_trait::async_trait;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors raised by a message bus implementation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusError {
    /// The underlying transport rejected the message
    #[error("message bus failure: {0}")]
    Backend(String),
}

/// Stream of raw payloads from a subscription
pub type BusStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Transport used to fan events out across replicas
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload on a topic
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// Subscribe to a topic; the stream ends when the bus shuts down
    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError>;
}

const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast-channel bus for replicas sharing one process
pub struct InProcessBus {
    capacity: usize,
    channels: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InProcessBus {
    /// Create a bus with the default per-topic capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with an explicit per-topic capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    fn channel(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BusError> {
        // A send with no subscribers is not a failure; the payload is
        // simply dropped, like any pub/sub medium.
        let _ = self.channel(topic).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<BusStream, BusError> {
        let receiver = self.channel(topic).subscribe();
        let stream = futures::stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => return Some((payload, receiver)),
                    // A lagged subscriber skips what it missed and goes on;
                    // delivery is at-least-once, not gap-free.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Box::pin(stream))
    }
}
