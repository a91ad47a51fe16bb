use anyhow::Context;
use colossus::app;
use colossus::common::{shutdown::shutdown_signal, telemetry};
use colossus::config::settings::AppConfig;
use colossus::infrastructure::metrics::PrometheusMetrics;
use colossus::infrastructure::queue::KafkaPublisher;
use colossus::infrastructure::storage::{self, S3Storage};
use colossus::state::AppState;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    telemetry::init();

    info!("Starting ingestion service...");

    let config = AppConfig::new().context("Missing storage credentials in environment")?;

    let store = Arc::new(S3Storage::new(&config.storage));
    storage::ensure_buckets(store.as_ref(), &config.storage)
        .await
        .context("Failed to prepare buckets")?;

    let queue = Arc::new(KafkaPublisher::new(&config.kafka)?);
    let metrics = Arc::new(PrometheusMetrics::new().context("Failed to register metrics")?);

    let state = AppState::new(config.clone(), store, queue, metrics.clone());
    let api = app::create_app(state);
    let system = app::create_system_app(metrics);

    let api_addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let system_addr = SocketAddr::from(([0, 0, 0, 0], config.system_port));
    let api_listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("Failed to bind {api_addr}"))?;
    let system_listener = tokio::net::TcpListener::bind(system_addr)
        .await
        .with_context(|| format!("Failed to bind {system_addr}"))?;

    info!("API running on http://{api_addr}");
    info!("Metrics on http://{system_addr}/metrics");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    let api_server = axum::serve(api_listener, api)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();
    let system_server = axum::serve(system_listener, system)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .into_future();

    let (api_result, system_result) = tokio::join!(api_server, system_server);
    api_result.context("API server failed")?;
    system_result.context("Metrics server failed")?;

    info!("Ingestion service stopped");
    Ok(())
}
