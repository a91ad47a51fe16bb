use crate::infrastructure::metrics::PrometheusMetrics;
use crate::state::AppState;
use axum::{Router, middleware};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Ingestion API.
pub fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::metrics::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Metrics and liveness for either binary.
pub fn create_system_app(metrics: Arc<PrometheusMetrics>) -> Router {
    crate::routes::system_routes()
        .layer(TraceLayer::new_for_http())
        .with_state(metrics)
}
