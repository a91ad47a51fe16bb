use super::{ByteStream, ObjectStore, StoredObject, UploadInfo};
use crate::common::upload::{MIN_PART_SIZE, MultipartSink, upload_stream};
use crate::config::settings::StorageConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::Builder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream as S3Body;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::{Client, config::BehaviorVersion, config::Credentials, config::Region};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

#[derive(Clone)]
pub struct S3Storage {
    pub client: Client,
}

fn transport(action: &str, err: impl std::error::Error) -> AppError {
    AppError::Transport(format!("{action}: {}", DisplayErrorContext(err)))
}

impl S3Storage {
    pub fn new(config: &StorageConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "static",
        );

        let s3_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true) // Required for MinIO
            .build();

        info!(endpoint = %config.endpoint, "✅ S3 (MinIO) client configured");

        Self {
            client: Client::from_conf(s3_config),
        }
    }

    /// Single-request upload for bodies known to fit in one part.
    async fn put_small(
        &self,
        bucket: &str,
        key: &str,
        mut stream: ByteStream<'_>,
        content_type: &str,
    ) -> Result<UploadInfo> {
        let mut body = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| AppError::Transport(format!("source stream interrupted: {e}")))?;
            body.extend_from_slice(&chunk);
        }

        let size = body.len() as u64;
        let result = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .content_length(size as i64)
            .body(S3Body::from(body.freeze()))
            .send()
            .await
            .map_err(|e| transport(&format!("failed to upload {bucket}/{key}"), e))?;

        Ok(UploadInfo {
            bucket: bucket.to_string(),
            key: key.to_string(),
            size,
            etag: result.e_tag,
        })
    }
}

#[async_trait]
impl MultipartSink for S3Storage {
    async fn create_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        content_type: &str,
    ) -> Result<String> {
        let result = self
            .client
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| transport("failed to initiate multipart upload", e))?;

        result
            .upload_id
            .ok_or_else(|| AppError::Transport(format!("no upload id returned for {bucket}/{key}")))
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> Result<CompletedPart> {
        let result = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(S3Body::from(body))
            .send()
            .await
            .map_err(|e| transport(&format!("failed to upload part {part_number}"), e))?;

        let e_tag = result.e_tag.ok_or_else(|| {
            AppError::Transport(format!("part {part_number} of {bucket}/{key} has no ETag"))
        })?;

        Ok(CompletedPart::builder()
            .e_tag(e_tag)
            .part_number(part_number)
            .build())
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<Option<String>> {
        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let result = self
            .client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
            .map_err(|e| transport("failed to complete multipart upload", e))?;

        Ok(result.e_tag)
    }

    async fn abort_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| transport("failed to abort multipart upload", e))?;

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn get(&self, bucket: &str, key: &str) -> Result<StoredObject> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|se| se.is_no_such_key()) {
                    AppError::not_found(bucket, key)
                } else {
                    transport(&format!("failed to fetch {bucket}/{key}"), e)
                }
            })?;

        let content_type = resp
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let size = resp.content_length().and_then(|len| u64::try_from(len).ok());
        let reader = resp.body.into_async_read();

        Ok(StoredObject {
            stream: Box::pin(ReaderStream::new(reader)),
            content_type,
            size,
        })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        stream: ByteStream<'_>,
        size: Option<u64>,
        content_type: &str,
    ) -> Result<UploadInfo> {
        let info = match size {
            Some(len) if len <= MIN_PART_SIZE as u64 => {
                self.put_small(bucket, key, stream, content_type).await?
            }
            _ => upload_stream(self, bucket, key, stream, content_type).await?,
        };

        info!(bucket, key, size = info.size, "Successfully uploaded object");
        Ok(info)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| transport(&format!("failed to delete {bucket}/{key}"), e))?;

        Ok(())
    }

    async fn ensure_bucket(&self, bucket: &str, location: &str) -> Result<()> {
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 is the implicit default and must not be sent as a constraint.
        if !location.is_empty() && location != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(location))
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(bucket, "Successfully created bucket");
                Ok(())
            }
            Err(create_err) => match self.client.head_bucket().bucket(bucket).send().await {
                Ok(_) => {
                    info!(bucket, "We already own bucket");
                    Ok(())
                }
                Err(head_err) => {
                    warn!(bucket, error = %DisplayErrorContext(head_err), "Bucket lookup failed");
                    Err(transport(&format!("failed to create bucket {bucket}"), create_err))
                }
            },
        }
    }
}
