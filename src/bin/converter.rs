use anyhow::Context;
use colossus::app;
use colossus::common::{shutdown::shutdown_signal, telemetry};
use colossus::config::settings::AppConfig;
use colossus::infrastructure::metrics::PrometheusMetrics;
use colossus::infrastructure::queue::KafkaConsumer;
use colossus::infrastructure::storage::{self, S3Storage};
use colossus::modules::transcode::TranscodePipeline;
use colossus::workers::ConverterWorker;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const METRICS_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();

    info!("Starting converter...");

    let config = AppConfig::new().context("Missing storage credentials in environment")?;

    let store = Arc::new(S3Storage::new(&config.storage));
    storage::ensure_buckets(store.as_ref(), &config.storage)
        .await
        .context("Failed to prepare buckets")?;

    let metrics = Arc::new(PrometheusMetrics::new().context("Failed to register metrics")?);
    let consumer = KafkaConsumer::new(&config.kafka)?;
    let pipeline = TranscodePipeline::new(
        store,
        &config.storage.raw_bucket,
        &config.storage.processed_bucket,
    );
    let worker = ConverterWorker::new(
        Box::new(consumer),
        pipeline,
        metrics.clone(),
        config.worker.poll_timeout,
    );

    let system_addr = SocketAddr::from(([0, 0, 0, 0], config.system_port));
    let system_listener = tokio::net::TcpListener::bind(system_addr)
        .await
        .with_context(|| format!("Failed to bind {system_addr}"))?;
    info!("Metrics on http://{system_addr}/metrics");

    // The metrics endpoint outlives the worker so the last counters can be scraped.
    let metrics_stop = CancellationToken::new();
    let metrics_server = tokio::spawn(
        axum::serve(system_listener, app::create_system_app(metrics))
            .with_graceful_shutdown(metrics_stop.clone().cancelled_owned())
            .into_future(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let summary = worker.run(shutdown).await;
    info!(
        processed = summary.processed,
        failed = summary.failed,
        "Worker finished, stopping metrics server"
    );

    metrics_stop.cancel();
    match tokio::time::timeout(METRICS_GRACE, metrics_server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "Metrics server failed"),
        Ok(Err(e)) => warn!(error = %e, "Metrics server task failed"),
        Err(_) => warn!("Metrics server did not stop within {METRICS_GRACE:?}"),
    }

    info!("Converter stopped");
    Ok(())
}
