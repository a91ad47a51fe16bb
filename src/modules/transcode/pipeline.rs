use super::bridge;
use super::codec::Codec;
use super::engine::TranscodeReport;
use crate::error::Result;
use crate::infrastructure::storage::{ObjectStore, UploadInfo};
use crate::modules::image::events::Job;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a job whose processed object is valid.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub content_type: String,
    pub report: TranscodeReport,
    pub upload: UploadInfo,
}

/// Raw object in, processed object out.
#[derive(Clone)]
pub struct TranscodePipeline {
    store: Arc<dyn ObjectStore>,
    raw_bucket: String,
    processed_bucket: String,
}

impl TranscodePipeline {
    pub fn new(store: Arc<dyn ObjectStore>, raw_bucket: &str, processed_bucket: &str) -> Self {
        Self {
            store,
            raw_bucket: raw_bucket.to_string(),
            processed_bucket: processed_bucket.to_string(),
        }
    }

    /// Transcodes one job, streaming the encoder output straight into the
    /// processed bucket.
    ///
    /// Succeeds only when both the transcode and the upload did. If the upload
    /// finished but the transcode then failed, the object it wrote is removed
    /// again.
    pub async fn process_one(&self, job: &Job) -> Result<ProcessedImage> {
        let raw = self.store.get(&self.raw_bucket, &job.filename_raw).await?;
        let codec = Codec::lookup(&raw.content_type)?;
        let k = job.scale_factor();

        let (encoded, producer) = bridge::spawn_producer(raw.stream, codec, k);
        let (upload, transcode) = tokio::join!(
            self.store.put(
                &self.processed_bucket,
                &job.filename_processed,
                encoded,
                None,
                &raw.content_type,
            ),
            producer.finish(),
        );

        match bridge::combine(transcode, upload) {
            Ok((report, upload)) => {
                info!(
                    key = %upload.key,
                    size = upload.size,
                    k,
                    width = report.output.0,
                    height = report.output.1,
                    "Processed image uploaded"
                );
                Ok(ProcessedImage {
                    content_type: raw.content_type,
                    report,
                    upload,
                })
            }
            Err(failure) => {
                if let Some(stale) = failure.uploaded {
                    self.discard(&stale).await;
                }
                Err(failure.error)
            }
        }
    }

    async fn discard(&self, stale: &UploadInfo) {
        match self.store.delete(&stale.bucket, &stale.key).await {
            Ok(()) => info!(bucket = %stale.bucket, key = %stale.key, "Removed invalid processed object"),
            Err(e) => warn!(
                bucket = %stale.bucket,
                key = %stale.key,
                error = %e,
                "Failed to remove invalid processed object"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::encode_image;
    use crate::testing::{MemoryObjectStore, PutBehavior};
    use image::{GenericImageView, ImageFormat};

    const RAW: &str = "raw";
    const PROCESSED: &str = "processed";

    fn job(name: &str, ext: &str, k: i64) -> Job {
        Job::new(format!("{name}-raw.{ext}"), format!("{name}-processed.{ext}"), k)
    }

    fn setup(store: &Arc<MemoryObjectStore>) -> TranscodePipeline {
        TranscodePipeline::new(store.clone(), RAW, PROCESSED)
    }

    #[tokio::test]
    async fn processes_stored_raw_image() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(RAW, "a-raw.png", "image/png", encode_image(40, 30, ImageFormat::Png));

        let done = setup(&store).process_one(&job("a", "png", 0)).await.unwrap();

        assert_eq!(done.report.output, (20, 15));
        let (content_type, bytes) = store.object(PROCESSED, "a-processed.png").unwrap();
        assert_eq!(content_type, "image/png");
        assert_eq!(done.upload.size, bytes.len() as u64);
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!(img.dimensions(), (20, 15));
    }

    #[tokio::test]
    async fn missing_raw_object_is_not_found() {
        let store = Arc::new(MemoryObjectStore::new());

        let err = setup(&store).process_one(&job("gone", "png", 2)).await.unwrap_err();

        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn unsupported_format_uploads_nothing() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(RAW, "a-raw.webp", "image/webp", vec![1, 2, 3]);

        let err = setup(&store).process_one(&job("a", "webp", 2)).await.unwrap_err();

        assert_eq!(err.kind(), "unsupported_format");
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn decode_failure_leaves_no_processed_object() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(RAW, "a-raw.jpg", "image/jpeg", b"not a jpeg".to_vec());

        let err = setup(&store).process_one(&job("a", "jpg", 2)).await.unwrap_err();

        assert_eq!(err.kind(), "decode");
        assert!(store.object(PROCESSED, "a-processed.jpg").is_none());
    }

    #[tokio::test]
    async fn upload_failure_is_reported() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(RAW, "a-raw.png", "image/png", encode_image(16, 16, ImageFormat::Png));
        store.set_put_behavior(PutBehavior::Fail("disk full".into()));

        let err = setup(&store).process_one(&job("a", "png", 2)).await.unwrap_err();

        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("disk full"));
        assert!(store.object(PROCESSED, "a-processed.png").is_none());
    }

    #[tokio::test]
    async fn storage_outage_during_large_encode_counts_as_transport() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert(RAW, "a-raw.bmp", "image/bmp", encode_image(640, 640, ImageFormat::Bmp));
        store.set_put_behavior(PutBehavior::Fail("s3 unreachable".into()));

        let err = setup(&store).process_one(&job("a", "bmp", 2)).await.unwrap_err();

        assert_eq!(err.kind(), "transport");
        assert!(err.to_string().contains("s3 unreachable"));
        assert_eq!(store.delete_count(), 0);
    }

    #[tokio::test]
    async fn producer_failure_after_upload_success_invalidates_object() {
        let store = Arc::new(MemoryObjectStore::new());
        // 320x320 BMP at 24 bits per pixel encodes to several chunks.
        store.insert(RAW, "a-raw.bmp", "image/bmp", encode_image(640, 640, ImageFormat::Bmp));
        store.set_put_behavior(PutBehavior::AcceptFirstChunk);

        let err = setup(&store).process_one(&job("a", "bmp", 2)).await.unwrap_err();

        assert!(matches!(err, crate::error::AppError::BridgeClosed), "got {err:?}");
        assert!(store.object(PROCESSED, "a-processed.bmp").is_none());
        assert_eq!(store.delete_count(), 1);
    }
}
