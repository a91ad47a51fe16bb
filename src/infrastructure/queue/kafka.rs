use super::{Delivery, JobConsumer, JobPublisher, QueueEvent, QueueMessage};
use crate::config::settings::KafkaConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{info, warn};

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes jobs and waits for the broker acknowledgement of each one.
pub struct KafkaPublisher {
    producer: FutureProducer,
    client_id: String,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("client.id", &config.client_id)
            .set("acks", &config.acks)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| AppError::Transport(format!("Failed to create Kafka producer: {e}")))?;

        info!(
            brokers = %config.bootstrap_servers,
            client_id = %config.client_id,
            "Kafka producer initialized"
        );

        Ok(Self {
            producer,
            client_id: config.client_id.clone(),
        })
    }
}

#[async_trait]
impl JobPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<Delivery> {
        // No key: the broker picks the partition.
        let record = FutureRecord::<(), [u8]>::to(topic).payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, DELIVERY_TIMEOUT)
            .await
            .map_err(|(err, _)| AppError::Transport(format!("Delivery failed: {err}")))?;

        info!(topic, partition, offset, "Delivered message");

        Ok(Delivery {
            topic: topic.to_string(),
            partition,
            offset,
        })
    }

    fn client_id(&self) -> &str {
        &self.client_id
    }
}

/// Group consumer for the job topic.
///
/// With `enable.auto.commit` the offset is committed on delivery, before the
/// job ran, so a crash mid-job loses that job. Disabling it makes the worker
/// commit after each job instead.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    auto_commit: bool,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.bootstrap_servers)
            .set("group.id", &config.group_id)
            .set("client.id", &config.client_id)
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", config.enable_auto_commit.to_string())
            .set("allow.auto.create.topics", "false")
            .create()
            .map_err(|e| AppError::Transport(format!("Failed to create Kafka consumer: {e}")))?;

        consumer
            .subscribe(&[&config.topic])
            .map_err(|e| AppError::Transport(format!("Failed to subscribe to topic: {e}")))?;

        info!(
            brokers = %config.bootstrap_servers,
            topic = %config.topic,
            group_id = %config.group_id,
            auto_commit = config.enable_auto_commit,
            "Kafka consumer initialized"
        );

        Ok(Self {
            consumer,
            auto_commit: config.enable_auto_commit,
        })
    }
}

#[async_trait]
impl JobConsumer for KafkaConsumer {
    async fn poll(&mut self, timeout: Duration) -> Option<QueueEvent> {
        let received = tokio::time::timeout(timeout, self.consumer.recv()).await.ok()?;

        Some(match received {
            Ok(msg) => QueueEvent::Message(QueueMessage {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
                payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            }),
            Err(KafkaError::PartitionEOF(partition)) => {
                QueueEvent::Other(format!("reached end of partition {partition}"))
            }
            Err(e) => QueueEvent::BrokerError(e.to_string()),
        })
    }

    async fn commit(&mut self, message: &QueueMessage) -> Result<()> {
        if self.auto_commit {
            return Ok(());
        }

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(
                &message.topic,
                message.partition,
                Offset::Offset(message.offset + 1),
            )
            .map_err(|e| AppError::Transport(format!("Invalid commit offset: {e}")))?;

        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| AppError::Transport(format!("Failed to commit offset: {e}")))
    }

    fn close(&mut self) {
        info!("Closing consumer");
        if !self.auto_commit {
            if let Err(e) = self.consumer.commit_consumer_state(CommitMode::Sync) {
                // Nothing consumed yet is reported as an error too.
                warn!(error = %e, "Final offset commit skipped");
            }
        }
        self.consumer.unsubscribe();
    }
}
