use crate::error::{AppError, Result};
use crate::infrastructure::storage::{ByteStream, UploadInfo};
use async_trait::async_trait;
use aws_sdk_s3::types::CompletedPart;
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tracing::{debug, error};

// Every part except the last must be at least 5 MiB.
pub const MIN_PART_SIZE: usize = 6 * 1024 * 1024;

/// The S3 multipart calls the uploader is built on.
#[async_trait]
pub trait MultipartSink: Send + Sync {
    /// Returns the upload id.
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String>;

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart>;

    /// Returns the object's ETag, if the store reported one.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<Option<String>>;

    async fn abort_multipart_upload(&self, bucket: &str, key: &str, upload_id: &str)
    -> Result<()>;
}

/// Streams a body of unknown length into S3 one part at a time, so at most
/// one part is buffered regardless of the object size.
pub struct MultipartUploader<'a, S: MultipartSink + ?Sized> {
    storage: &'a S,
    bucket: String,
    key: String,
    upload_id: String,
    parts: Vec<CompletedPart>,
    part_number: i32,
    buffer: BytesMut,
    total: u64,
}

impl<'a, S: MultipartSink + ?Sized> MultipartUploader<'a, S> {
    pub async fn new(
        storage: &'a S,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<Self> {
        let upload_id = storage
            .create_multipart_upload(bucket, key, content_type)
            .await?;

        Ok(Self {
            storage,
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            parts: Vec::new(),
            part_number: 1,
            buffer: BytesMut::with_capacity(MIN_PART_SIZE),
            total: 0,
        })
    }

    pub async fn write_chunk(&mut self, chunk: Bytes) -> Result<()> {
        self.total += chunk.len() as u64;
        self.buffer.extend_from_slice(&chunk);

        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }

        Ok(())
    }

    async fn flush_part(&mut self) -> Result<()> {
        let body = self.buffer.split().freeze();
        self.buffer.reserve(MIN_PART_SIZE);

        let part = self
            .storage
            .upload_part(
                &self.bucket,
                &self.key,
                &self.upload_id,
                self.part_number,
                body,
            )
            .await?;

        debug!(key = %self.key, part = self.part_number, "Uploaded part");
        self.parts.push(part);
        self.part_number += 1;

        Ok(())
    }

    /// Completes the upload. A failed completion aborts it, so no parts are
    /// left behind.
    pub async fn finish(mut self) -> Result<UploadInfo> {
        let etag = match self.complete().await {
            Ok(etag) => etag,
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to complete multipart upload");
                self.abort().await;
                return Err(e);
            }
        };

        Ok(UploadInfo {
            bucket: self.bucket,
            key: self.key,
            size: self.total,
            etag,
        })
    }

    async fn complete(&mut self) -> Result<Option<String>> {
        // An empty object still needs one (empty) part to complete.
        if !self.buffer.is_empty() || self.parts.is_empty() {
            self.flush_part().await?;
        }

        self.storage
            .complete_multipart_upload(
                &self.bucket,
                &self.key,
                &self.upload_id,
                std::mem::take(&mut self.parts),
            )
            .await
    }

    /// Drops every uploaded part. Failures are logged; the caller is already
    /// reporting a more relevant error.
    pub async fn abort(&self) {
        if let Err(e) = self
            .storage
            .abort_multipart_upload(&self.bucket, &self.key, &self.upload_id)
            .await
        {
            error!(key = %self.key, error = %e, "Failed to abort multipart upload");
        }
    }
}

pub async fn upload_stream<S: MultipartSink + ?Sized>(
    storage: &S,
    bucket: &str,
    key: &str,
    mut stream: ByteStream<'_>,
    content_type: &str,
) -> Result<UploadInfo> {
    let mut uploader = MultipartUploader::new(storage, bucket, key, content_type).await?;

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                error!(key, error = %e, "Source stream error");
                uploader.abort().await;
                return Err(AppError::Transport(format!("source stream interrupted: {e}")));
            }
        };

        if let Err(e) = uploader.write_chunk(chunk).await {
            error!(key, error = %e, "Upload error");
            uploader.abort().await;
            return Err(e);
        }
    }

    uploader.finish().await
}
