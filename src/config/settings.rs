use crate::config::env::{self, EnvKey};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub system_port: u16,
    pub storage: StorageConfig,
    pub kafka: KafkaConfig,
    pub worker: WorkerConfig,
}

/// S3 / MinIO connection and the two buckets images move between.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub raw_bucket: String,
    pub processed_bucket: String,
}

#[derive(Clone, Debug)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub client_id: String,
    pub topic: String,
    pub group_id: String,
    pub session_timeout_ms: u32,
    pub auto_offset_reset: String,
    pub acks: String,
    /// When false the worker commits each offset after the job finished.
    pub enable_auto_commit: bool,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub poll_timeout: Duration,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            system_port: env::get_parsed(EnvKey::SystemPort, 9100),
            storage: StorageConfig::from_env()?,
            kafka: KafkaConfig::from_env(),
            worker: WorkerConfig::from_env(),
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 3000,
            system_port: 9100,
            storage: StorageConfig::default(),
            kafka: KafkaConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl StorageConfig {
    fn from_env() -> Result<Self, std::env::VarError> {
        Ok(Self {
            endpoint: env::get(EnvKey::MinioUrl)?,
            access_key: env::get(EnvKey::MinioAccessKey)?,
            secret_key: env::get(EnvKey::MinioSecretKey)?,
            region: env::get_or(EnvKey::S3Region, "us-east-1"),
            raw_bucket: env::get_or(EnvKey::BucketRaw, "raw-images"),
            processed_bucket: env::get_or(EnvKey::BucketProcessed, "processed-images"),
        })
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9000".to_string(),
            access_key: String::new(),
            secret_key: String::new(),
            region: "us-east-1".to_string(),
            raw_bucket: "raw-images".to_string(),
            processed_bucket: "processed-images".to_string(),
        }
    }
}

impl KafkaConfig {
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bootstrap_servers: env::get_or(
                EnvKey::KafkaBootstrapServers,
                &defaults.bootstrap_servers,
            ),
            client_id: env::get_or(EnvKey::KafkaClientId, &defaults.client_id),
            topic: env::get_or(EnvKey::KafkaTopic, &defaults.topic),
            group_id: env::get_or(EnvKey::KafkaGroupId, &defaults.group_id),
            session_timeout_ms: env::get_parsed(
                EnvKey::KafkaSessionTimeoutMs,
                defaults.session_timeout_ms,
            ),
            auto_offset_reset: env::get_or(
                EnvKey::KafkaAutoOffsetReset,
                &defaults.auto_offset_reset,
            ),
            acks: env::get_or(EnvKey::KafkaAcks, &defaults.acks),
            enable_auto_commit: env::get_flag(
                EnvKey::KafkaEnableAutoCommit,
                defaults.enable_auto_commit,
            ),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            client_id: "colossus".to_string(),
            topic: "images".to_string(),
            group_id: "converter".to_string(),
            session_timeout_ms: 6000,
            auto_offset_reset: "earliest".to_string(),
            acks: "all".to_string(),
            enable_auto_commit: true,
        }
    }
}

impl WorkerConfig {
    fn from_env() -> Self {
        Self {
            poll_timeout: Duration::from_millis(env::get_parsed(
                EnvKey::WorkerPollTimeoutMs,
                100,
            )),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(100),
        }
    }
}
