use crate::config::settings::AppConfig;
use crate::infrastructure::metrics::MetricsSink;
use crate::infrastructure::queue::JobPublisher;
use crate::infrastructure::storage::ObjectStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub queue: Arc<dyn JobPublisher>,
    pub metrics: Arc<dyn MetricsSink>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        queue: Arc<dyn JobPublisher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            storage,
            queue,
            metrics,
        }
    }
}
