use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    SystemPort,
    MinioUrl,
    MinioAccessKey,
    MinioSecretKey,
    S3Region,
    BucketRaw,
    BucketProcessed,
    KafkaBootstrapServers,
    KafkaClientId,
    KafkaTopic,
    KafkaGroupId,
    KafkaSessionTimeoutMs,
    KafkaAutoOffsetReset,
    KafkaAcks,
    KafkaEnableAutoCommit,
    WorkerPollTimeoutMs,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::SystemPort => "SYSTEM_PORT",
            EnvKey::MinioUrl => "MINIO_ENDPOINT",
            EnvKey::MinioAccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::MinioSecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::S3Region => "S3_REGION",
            EnvKey::BucketRaw => "MINIO_BUCKET_RAW",
            EnvKey::BucketProcessed => "MINIO_BUCKET_PROCESSED",
            EnvKey::KafkaBootstrapServers => "KAFKA_BOOTSTRAP_SERVERS",
            EnvKey::KafkaClientId => "KAFKA_CLIENT_ID",
            EnvKey::KafkaTopic => "KAFKA_TOPIC",
            EnvKey::KafkaGroupId => "KAFKA_GROUP_ID",
            EnvKey::KafkaSessionTimeoutMs => "KAFKA_SESSION_TIMEOUT_MS",
            EnvKey::KafkaAutoOffsetReset => "KAFKA_AUTO_OFFSET_RESET",
            EnvKey::KafkaAcks => "KAFKA_ACKS",
            EnvKey::KafkaEnableAutoCommit => "KAFKA_ENABLE_AUTO_COMMIT",
            EnvKey::WorkerPollTimeoutMs => "WORKER_POLL_TIMEOUT_MS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

pub fn get_flag(key: EnvKey, default: bool) -> bool {
    get(key)
        .ok()
        .and_then(|val| parse_flag(&val))
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
