use crate::error::{AppError, Result};
use crate::infrastructure::queue::{
    Delivery, JobConsumer, JobPublisher, QueueEvent, QueueMessage,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct State {
    events: VecDeque<QueueEvent>,
    next_offsets: Vec<i64>,
    next_partition: usize,
    published: Vec<Delivery>,
    committed: Vec<(i32, i64)>,
    publish_failure: Option<String>,
    polls: usize,
    closed: bool,
}

/// Single-topic in-memory broker.
///
/// Publishing spreads messages round-robin over the partitions and wakes a
/// waiting consumer.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    topic: String,
    client_id: String,
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
}

impl MemoryQueue {
    pub fn new(topic: &str, partitions: usize) -> Self {
        let state = State {
            next_offsets: vec![0; partitions.max(1)],
            ..State::default()
        };
        Self {
            topic: topic.to_string(),
            client_id: "memory".to_string(),
            state: Arc::new(Mutex::new(state)),
            notify: Arc::new(Notify::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, event: QueueEvent) {
        self.lock().events.push_back(event);
        self.notify.notify_one();
    }

    /// Consumer sharing this queue's state. Every consumer drains the same
    /// event list.
    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            queue: self.clone(),
        }
    }

    /// Enqueues `payload` as-is on partition 0, bypassing the publisher.
    pub fn push_raw(&self, payload: &[u8]) -> Delivery {
        let delivery = {
            let mut state = self.lock();
            let offset = state.next_offsets[0];
            state.next_offsets[0] += 1;
            Delivery {
                topic: self.topic.clone(),
                partition: 0,
                offset,
            }
        };
        self.push(QueueEvent::Message(QueueMessage {
            topic: delivery.topic.clone(),
            partition: delivery.partition,
            offset: delivery.offset,
            payload: payload.to_vec(),
        }));
        delivery
    }

    pub fn push_broker_error(&self, reason: &str) {
        self.push(QueueEvent::BrokerError(reason.to_string()));
    }

    pub fn push_other(&self, description: &str) {
        self.push(QueueEvent::Other(description.to_string()));
    }

    /// Makes every following publish fail with `reason`.
    pub fn fail_publishes(&self, reason: &str) {
        self.lock().publish_failure = Some(reason.to_string());
    }

    pub fn published(&self) -> Vec<Delivery> {
        self.lock().published.clone()
    }

    pub fn pending(&self) -> usize {
        self.lock().events.len()
    }

    pub fn poll_count(&self) -> usize {
        self.lock().polls
    }

    pub fn committed(&self) -> Vec<(i32, i64)> {
        self.lock().committed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[async_trait]
impl JobPublisher for MemoryQueue {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<Delivery> {
        let message = {
            let mut state = self.lock();
            if let Some(reason) = &state.publish_failure {
                return Err(AppError::Transport(format!("Delivery failed: {reason}")));
            }

            let partition = state.next_partition % state.next_offsets.len();
            state.next_partition += 1;
            let offset = state.next_offsets[partition];
            state.next_offsets[partition] += 1;

            let message = QueueMessage {
                topic: topic.to_string(),
                partition: partition as i32,
                offset,
                payload: payload.to_vec(),
            };
            state.published.push(Delivery {
                topic: message.topic.clone(),
                partition: message.partition,
                offset,
            });
            message
        };

        let delivery = Delivery {
            topic: message.topic.clone(),
            partition: message.partition,
            offset: message.offset,
        };
        self.push(QueueEvent::Message(message));
        Ok(delivery)
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Consuming side of a [`MemoryQueue`].
#[derive(Debug)]
pub struct MemoryConsumer {
    queue: MemoryQueue,
}

#[async_trait]
impl JobConsumer for MemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Option<QueueEvent> {
        {
            let mut state = self.queue.lock();
            state.polls += 1;
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
        }

        // A push between the check above and this wait leaves a permit behind,
        // so the wakeup is not lost.
        tokio::time::timeout(timeout, self.queue.notify.notified())
            .await
            .ok()?;
        self.queue.lock().events.pop_front()
    }

    async fn commit(&mut self, message: &QueueMessage) -> Result<()> {
        self.queue
            .lock()
            .committed
            .push((message.partition, message.offset));
        Ok(())
    }

    fn close(&mut self) {
        self.queue.lock().closed = true;
    }
}
