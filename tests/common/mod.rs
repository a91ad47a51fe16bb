//! In-process ingestion API and converter wired to the in-memory store and
//! queue.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use colossus::app::{create_app, create_system_app};
use colossus::config::settings::AppConfig;
use colossus::infrastructure::metrics::PrometheusMetrics;
use colossus::modules::transcode::TranscodePipeline;
use colossus::state::AppState;
use colossus::testing::{MemoryObjectStore, MemoryQueue};
use colossus::workers::ConverterWorker;

pub use colossus::testing::fixtures;

pub const POLL_TIMEOUT: Duration = Duration::from_millis(20);
const BOUNDARY: &str = "colossus-test-boundary";

pub struct TestFixture {
    pub router: Router,
    pub system_router: Router,
    pub config: AppConfig,
    pub store: Arc<MemoryObjectStore>,
    pub queue: Arc<MemoryQueue>,
    pub metrics: Arc<PrometheusMetrics>,
}

#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// One multipart form part.
pub struct Part {
    pub name: &'static str,
    pub file_name: Option<&'static str>,
    pub content_type: Option<&'static str>,
    pub data: Vec<u8>,
}

impl Part {
    pub fn file(file_name: &'static str, content_type: &'static str, data: Vec<u8>) -> Self {
        Self {
            name: "file",
            file_name: Some(file_name),
            content_type: Some(content_type),
            data,
        }
    }

    pub fn text(name: &'static str, value: &str) -> Self {
        Self {
            name,
            file_name: None,
            content_type: None,
            data: value.as_bytes().to_vec(),
        }
    }
}

impl TestFixture {
    pub fn new() -> Self {
        let config = AppConfig::default();
        let store = Arc::new(MemoryObjectStore::new());
        let queue = Arc::new(MemoryQueue::new(&config.kafka.topic, 3));
        let metrics = Arc::new(PrometheusMetrics::new().expect("metrics registry"));

        let state = AppState::new(
            config.clone(),
            store.clone(),
            queue.clone(),
            metrics.clone(),
        );

        Self {
            router: create_app(state),
            system_router: create_system_app(metrics.clone()),
            config,
            store,
            queue,
            metrics,
        }
    }

    pub fn raw_bucket(&self) -> &str {
        &self.config.storage.raw_bucket
    }

    pub fn processed_bucket(&self) -> &str {
        &self.config.storage.processed_bucket
    }

    /// Converter reading from this fixture's queue and store.
    pub fn worker(&self) -> ConverterWorker {
        let pipeline = TranscodePipeline::new(
            self.store.clone(),
            self.raw_bucket(),
            self.processed_bucket(),
        );
        ConverterWorker::new(
            Box::new(self.queue.consumer()),
            pipeline,
            self.metrics.clone(),
            POLL_TIMEOUT,
        )
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        send(&self.router, request).await
    }

    pub async fn get_system(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        send(&self.system_router, request).await
    }

    pub async fn upload(&self, parts: Vec<Part>) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri("/upload-image")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(&parts)))
            .unwrap();
        send(&self.router, request).await
    }
}

async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to send request");

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("Failed to collect body")
        .to_bytes();

    TestResponse {
        status,
        headers,
        body,
    }
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        let disposition = match part.file_name {
            Some(file_name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\n",
                part.name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name),
        };
        body.extend_from_slice(disposition.as_bytes());
        if let Some(content_type) = part.content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
