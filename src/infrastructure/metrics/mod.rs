pub mod prometheus;

pub use self::prometheus::PrometheusMetrics;

use std::time::Duration;

/// Counters recorded by the ingestion handlers and the converter worker.
///
/// Implementations must tolerate concurrent increments from any task.
pub trait MetricsSink: Send + Sync {
    fn raw_image_uploaded(&self);

    fn job_enqueued(&self, partition: i32, client_id: &str);

    fn image_retrieved(&self, bucket: &str);

    fn job_succeeded(&self, partition: i32);

    fn job_failed(&self, partition: i32, reason: &str);

    fn processed_bytes(&self, content_type: &str, bytes: u64);

    /// One served HTTP request. `path` is the route template, never the raw URI.
    fn http_request(&self, method: &str, path: &str, status: u16, elapsed: Duration);
}
