use crate::error::AppError;
use crate::infrastructure::metrics::MetricsSink;
use crate::infrastructure::queue::{JobConsumer, QueueEvent, QueueMessage};
use crate::modules::image::events::Job;
use crate::modules::transcode::TranscodePipeline;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Polling,
    Processing,
    Draining,
    Stopped,
}

/// Jobs handled over the worker's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub processed: u64,
    pub failed: u64,
}

/// Polls the job topic and runs one job at a time through the pipeline.
///
/// Cancellation is only looked at between polls. A job that was already
/// received always runs to completion, then the consumer is closed.
pub struct ConverterWorker {
    consumer: Box<dyn JobConsumer>,
    pipeline: TranscodePipeline,
    metrics: Arc<dyn MetricsSink>,
    poll_timeout: Duration,
    state: WorkerState,
    in_flight: Option<QueueMessage>,
    summary: WorkerSummary,
}

impl ConverterWorker {
    pub fn new(
        consumer: Box<dyn JobConsumer>,
        pipeline: TranscodePipeline,
        metrics: Arc<dyn MetricsSink>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            consumer,
            pipeline,
            metrics,
            poll_timeout,
            state: WorkerState::Polling,
            in_flight: None,
            summary: WorkerSummary::default(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Runs until `cancel` fires and the current job, if any, is done.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerSummary {
        info!(poll_timeout_ms = self.poll_timeout.as_millis() as u64, "Converter worker started");

        while self.state != WorkerState::Stopped {
            let before = self.state;
            self.step(&cancel).await;
            if before != self.state {
                debug!(from = ?before, to = ?self.state, "Worker state changed");
            }
        }

        self.consumer.close();
        info!(
            processed = self.summary.processed,
            failed = self.summary.failed,
            "Converter worker stopped"
        );
        self.summary
    }

    async fn step(&mut self, cancel: &CancellationToken) {
        match self.state {
            WorkerState::Polling => {
                if cancel.is_cancelled() {
                    info!("Shutdown requested, draining");
                    self.state = WorkerState::Draining;
                    return;
                }

                match self.consumer.poll(self.poll_timeout).await {
                    Some(QueueEvent::Message(message)) => {
                        self.in_flight = Some(message);
                        self.state = WorkerState::Processing;
                    }
                    Some(QueueEvent::BrokerError(reason)) => {
                        warn!(%reason, "Broker error");
                    }
                    Some(QueueEvent::Other(event)) => {
                        debug!(%event, "Ignored consumer event");
                    }
                    None => {}
                }
            }
            WorkerState::Processing => {
                if let Some(message) = self.in_flight.take() {
                    self.dispatch(message).await;
                }
                self.state = WorkerState::Polling;
            }
            WorkerState::Draining => {
                if let Some(message) = self.in_flight.take() {
                    self.dispatch(message).await;
                }
                self.state = WorkerState::Stopped;
            }
            WorkerState::Stopped => {}
        }
    }

    async fn dispatch(&mut self, message: QueueMessage) {
        let partition = message.partition;
        info!(partition, offset = message.offset, "Received job");

        match handle(&self.pipeline, &message).await {
            Ok((job, content_type, bytes)) => {
                self.summary.processed += 1;
                self.metrics.job_succeeded(partition);
                self.metrics.processed_bytes(&content_type, bytes);
                info!(
                    partition,
                    offset = message.offset,
                    key = %job.filename_processed,
                    bytes,
                    "Job completed"
                );
            }
            Err(e) => {
                self.summary.failed += 1;
                self.metrics.job_failed(partition, e.kind());
                error!(
                    partition,
                    offset = message.offset,
                    kind = e.kind(),
                    error = %e,
                    "Job failed"
                );
            }
        }

        // Failed jobs are committed too; there is no retry.
        if let Err(e) = self.consumer.commit(&message).await {
            warn!(partition, offset = message.offset, error = %e, "Offset commit failed");
        }
    }

}

async fn handle(
    pipeline: &TranscodePipeline,
    message: &QueueMessage,
) -> Result<(Job, String, u64), AppError> {
    let job = Job::from_payload(&message.payload)?;
    let done = pipeline.process_one(&job).await?;
    Ok((job, done.content_type, done.upload.size))
}
