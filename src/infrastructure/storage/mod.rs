//! Object storage port.
//!
//! Raw uploads and processed images both live behind [`ObjectStore`]. Bodies
//! move as [`ByteStream`]s in both directions so neither side has to hold a
//! whole object in memory.

pub mod s3;

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;

pub use s3::S3Storage;

/// Fallible stream of object bytes.
pub type ByteStream<'a> = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + 'a>>;

/// An object opened for reading.
pub struct StoredObject {
    pub stream: ByteStream<'static>,
    pub content_type: String,
    /// Absent when the store did not report a length.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadInfo {
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens `bucket/key`. Missing objects are reported as `AppError::NotFound`.
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject>;

    /// Writes `stream` to `bucket/key`. `size` is a hint; `None` means the
    /// length is only known once the stream ends. An `Err` item in the stream
    /// aborts the upload and nothing becomes visible.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        stream: ByteStream<'_>,
        size: Option<u64>,
        content_type: &str,
    ) -> Result<UploadInfo>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    /// Creates the bucket unless this account already owns it.
    async fn ensure_bucket(&self, bucket: &str, location: &str) -> Result<()>;
}

/// Creates the raw and processed buckets if they are missing.
pub async fn ensure_buckets(
    store: &dyn ObjectStore,
    config: &crate::config::settings::StorageConfig,
) -> Result<()> {
    for bucket in [&config.raw_bucket, &config.processed_bucket] {
        store.ensure_bucket(bucket, &config.region).await?;
    }
    Ok(())
}
