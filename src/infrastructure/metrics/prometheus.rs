use super::MetricsSink;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Prometheus-backed [`MetricsSink`] owning its registry.
///
/// Built once per process and shared behind an `Arc`.
pub struct PrometheusMetrics {
    registry: Registry,
    uploaded_raw_images: IntCounter,
    uploaded_to_queue: IntCounterVec,
    retrieved_images: IntCounterVec,
    processed_success: IntCounterVec,
    processed_failure: IntCounterVec,
    processed_success_bytes: IntCounterVec,
    http_requests: IntCounterVec,
    http_request_duration: HistogramVec,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let uploaded_raw_images = IntCounter::new(
            "colossus_backend_uploaded_raw_images",
            "Count successfully uploaded raw images",
        )?;
        let uploaded_to_queue = IntCounterVec::new(
            Opts::new(
                "colossus_backend_uploaded_raw_images_to_kafka",
                "Count successfully uploaded raw images links to Kafka",
            ),
            &["partition", "client_id"],
        )?;
        let retrieved_images = IntCounterVec::new(
            Opts::new(
                "colossus_backend_retrieved_images",
                "Count successfully retrieved images from S3",
            ),
            &["s3_bucket_name"],
        )?;
        let processed_success = IntCounterVec::new(
            Opts::new(
                "colossus_converter_processed_images_success",
                "Count successfully processed raw images",
            ),
            &["partition"],
        )?;
        let processed_failure = IntCounterVec::new(
            Opts::new(
                "colossus_converter_processed_images_failure",
                "Count fails due processing raw images",
            ),
            &["partition", "reason"],
        )?;
        let processed_success_bytes = IntCounterVec::new(
            Opts::new(
                "colossus_converter_processed_images_success_bytes",
                "Total bytes successfully processed of raw images",
            ),
            &["mime_type"],
        )?;

        let http_requests = IntCounterVec::new(
            Opts::new(
                "colossus_backend_http_requests_total",
                "HTTP requests handled by the ingestion API",
            ),
            &["method", "path", "status"],
        )?;
        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "colossus_backend_http_request_duration_seconds",
                "HTTP request latencies of the ingestion API",
            )
            .buckets(vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0,
            ]),
            &["method", "path", "status"],
        )?;

        registry.register(Box::new(uploaded_raw_images.clone()))?;
        registry.register(Box::new(uploaded_to_queue.clone()))?;
        registry.register(Box::new(retrieved_images.clone()))?;
        registry.register(Box::new(processed_success.clone()))?;
        registry.register(Box::new(processed_failure.clone()))?;
        registry.register(Box::new(processed_success_bytes.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            registry,
            uploaded_raw_images,
            uploaded_to_queue,
            retrieved_images,
            processed_success,
            processed_failure,
            processed_success_bytes,
            http_requests,
            http_request_duration,
        })
    }

    /// Text exposition format for the `/metrics` endpoint.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    pub fn uploaded_raw_images(&self) -> u64 {
        self.uploaded_raw_images.get()
    }

    pub fn uploaded_to_queue(&self, partition: i32, client_id: &str) -> u64 {
        self.uploaded_to_queue
            .with_label_values(&[&partition.to_string(), client_id])
            .get()
    }

    pub fn retrieved_images(&self, bucket: &str) -> u64 {
        self.retrieved_images.with_label_values(&[bucket]).get()
    }

    pub fn processed_success(&self, partition: i32) -> u64 {
        self.processed_success
            .with_label_values(&[&partition.to_string()])
            .get()
    }

    pub fn processed_failure(&self, partition: i32, reason: &str) -> u64 {
        self.processed_failure
            .with_label_values(&[&partition.to_string(), reason])
            .get()
    }

    pub fn processed_success_bytes(&self, content_type: &str) -> u64 {
        self.processed_success_bytes
            .with_label_values(&[content_type])
            .get()
    }

    pub fn http_requests(&self, method: &str, path: &str, status: u16) -> u64 {
        self.http_requests
            .with_label_values(&[method, path, &status.to_string()])
            .get()
    }
}

impl MetricsSink for PrometheusMetrics {
    fn raw_image_uploaded(&self) {
        self.uploaded_raw_images.inc();
    }

    fn job_enqueued(&self, partition: i32, client_id: &str) {
        self.uploaded_to_queue
            .with_label_values(&[&partition.to_string(), client_id])
            .inc();
    }

    fn image_retrieved(&self, bucket: &str) {
        self.retrieved_images.with_label_values(&[bucket]).inc();
    }

    fn job_succeeded(&self, partition: i32) {
        self.processed_success
            .with_label_values(&[&partition.to_string()])
            .inc();
    }

    fn job_failed(&self, partition: i32, reason: &str) {
        self.processed_failure
            .with_label_values(&[&partition.to_string(), reason])
            .inc();
    }

    fn processed_bytes(&self, content_type: &str, bytes: u64) {
        self.processed_success_bytes
            .with_label_values(&[content_type])
            .inc_by(bytes);
    }

    fn http_request(&self, method: &str, path: &str, status: u16, elapsed: Duration) {
        let status = status.to_string();
        let labels = [method, path, status.as_str()];
        self.http_requests.with_label_values(&labels).inc();
        self.http_request_duration
            .with_label_values(&labels)
            .observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_labelled_per_partition() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.job_succeeded(0);
        metrics.job_succeeded(0);
        metrics.job_succeeded(3);
        metrics.job_failed(3, "decode");

        assert_eq!(metrics.processed_success(0), 2);
        assert_eq!(metrics.processed_success(3), 1);
        assert_eq!(metrics.processed_failure(3, "decode"), 1);
        assert_eq!(metrics.processed_failure(0, "decode"), 0);
    }

    #[test]
    fn render_exposes_registered_counters() {
        let metrics = PrometheusMetrics::new().unwrap();
        metrics.raw_image_uploaded();
        metrics.processed_bytes("image/png", 512);

        let text = metrics.render().unwrap();

        assert!(text.contains("colossus_backend_uploaded_raw_images 1"));
        assert!(text.contains("colossus_converter_processed_images_success_bytes{mime_type=\"image/png\"} 512"));
    }

    #[test]
    fn http_requests_are_counted_and_timed() {
        let metrics = PrometheusMetrics::new().unwrap();

        metrics.http_request("GET", "/healthz", 200, Duration::from_millis(3));
        metrics.http_request("GET", "/healthz", 200, Duration::from_millis(4));

        assert_eq!(metrics.http_requests("GET", "/healthz", 200), 2);
        let text = metrics.render().unwrap();
        assert!(text.contains(
            "colossus_backend_http_request_duration_seconds_count{method=\"GET\",path=\"/healthz\",status=\"200\"} 2"
        ));
    }

    #[test]
    fn separate_instances_do_not_share_state() {
        let first = PrometheusMetrics::new().unwrap();
        let second = PrometheusMetrics::new().unwrap();

        first.raw_image_uploaded();

        assert_eq!(first.uploaded_raw_images(), 1);
        assert_eq!(second.uploaded_raw_images(), 0);
    }
}
