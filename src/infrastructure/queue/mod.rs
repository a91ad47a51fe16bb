//! Queue port.
//!
//! Delivery is at-least-once at the broker and nothing here deduplicates, so
//! consumers must tolerate seeing the same payload twice.

pub mod kafka;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use kafka::{KafkaConsumer, KafkaPublisher};

/// Broker acknowledgement for a published payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

/// One result of a poll.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    Message(QueueMessage),
    /// Transient broker condition; the client reconnects on its own.
    BrokerError(String),
    /// Anything else the broker reports. Logged and skipped.
    Other(String),
}

#[async_trait]
pub trait JobPublisher: Send + Sync {
    /// Resolves once the broker acknowledged the payload.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<Delivery>;

    fn client_id(&self) -> &str;
}

#[async_trait]
pub trait JobConsumer: Send + Sync {
    /// Waits at most `timeout` for the next event; `None` when nothing arrived.
    async fn poll(&mut self, timeout: Duration) -> Option<QueueEvent>;

    /// Marks `message` as consumed. A no-op when the client commits on delivery.
    async fn commit(&mut self, message: &QueueMessage) -> Result<()>;

    /// Leaves the consumer group. No poll may follow.
    fn close(&mut self);
}
