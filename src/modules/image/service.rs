use super::dto::UploadResponse;
use super::events::{self, Job};
use crate::error::{AppError, Result};
use crate::infrastructure::storage::{ByteStream, StoredObject, UploadInfo};
use crate::modules::transcode::engine::DEFAULT_SCALE;
use crate::state::AppState;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use futures_util::TryStreamExt;
use time::format_description::well_known::Rfc3339;
use tracing::{info, warn};

/// Which bucket a retrieval reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Raw,
    Processed,
}

impl ImageKind {
    pub fn parse(kind: &str) -> Result<Self> {
        match kind {
            "raw" => Ok(Self::Raw),
            "processed" => Ok(Self::Processed),
            other => Err(AppError::Validation(format!("'{other}' is not a valid type"))),
        }
    }

    pub fn bucket(self, state: &AppState) -> &str {
        match self {
            Self::Raw => &state.config.storage.raw_bucket,
            Self::Processed => &state.config.storage.processed_bucket,
        }
    }
}

pub struct ImageService;

impl ImageService {
    /// Stores the `file` part in the raw bucket and queues its transcode.
    ///
    /// The job is published only after every part was read, so `k` may come
    /// before or after the file. A form rejected after the file was stored
    /// removes the raw object again.
    pub async fn upload(state: &AppState, mut multipart: Multipart) -> Result<UploadResponse> {
        let mut stored: Option<(UploadInfo, String)> = None;
        let mut k: Option<i64> = None;

        let read = async {
            while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
                let name = field.name().unwrap_or_default().to_string();
                match name.as_str() {
                    "file" if stored.is_none() => stored = Some(Self::store_raw(state, field).await?),
                    "k" => k = Some(parse_k(&field.text().await.map_err(invalid_form)?)?),
                    _ => {}
                }
            }
            Ok::<_, AppError>(())
        }
        .await;

        if let Err(e) = read {
            if let Some((upload, _)) = &stored {
                Self::discard_raw(state, upload).await;
            }
            return Err(e);
        }

        let (upload, filename_processed) =
            stored.ok_or_else(|| AppError::Validation("missing multipart field 'file'".into()))?;
        let job = Job::new(upload.key, filename_processed, k.unwrap_or(i64::from(DEFAULT_SCALE)));

        Self::enqueue(state, job, upload.size).await
    }

    async fn discard_raw(state: &AppState, upload: &UploadInfo) {
        match state.storage.delete(&upload.bucket, &upload.key).await {
            Ok(()) => info!(key = %upload.key, "Removed raw image of rejected upload"),
            Err(e) => warn!(key = %upload.key, error = %e, "Failed to remove raw image"),
        }
    }

    async fn store_raw(state: &AppState, field: Field<'_>) -> Result<(UploadInfo, String)> {
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = image_content_type(field.content_type(), &file_name)?;
        let (filename_raw, filename_processed) = events::name_pair(&file_name);

        let body: ByteStream<'_> = Box::pin(field.map_err(std::io::Error::other));
        let upload = state
            .storage
            .put(
                &state.config.storage.raw_bucket,
                &filename_raw,
                body,
                None,
                &content_type,
            )
            .await?;

        state.metrics.raw_image_uploaded();
        info!(key = %upload.key, size = upload.size, %content_type, "Stored raw image");

        Ok((upload, filename_processed))
    }

    async fn enqueue(state: &AppState, job: Job, size: u64) -> Result<UploadResponse> {
        let queued_at = job
            .queued_at
            .format(&Rfc3339)
            .map_err(|e| AppError::Internal(format!("Failed to format timestamp: {e}")))?;

        let delivery = state
            .queue
            .publish(&state.config.kafka.topic, &job.to_payload()?)
            .await?;
        state
            .metrics
            .job_enqueued(delivery.partition, state.queue.client_id());

        Ok(UploadResponse {
            message: job.message,
            filename_raw: job.filename_raw,
            filename_processed: job.filename_processed,
            queued_at,
            k: job.k,
            size,
            partition: delivery.partition,
            offset: delivery.offset,
        })
    }

    pub async fn retrieve(state: &AppState, kind: ImageKind, file: &str) -> Result<StoredObject> {
        let bucket = kind.bucket(state);
        let object = state.storage.get(bucket, file).await?;
        state.metrics.image_retrieved(bucket);
        Ok(object)
    }
}

fn invalid_form(err: MultipartError) -> AppError {
    AppError::Validation(format!("malformed multipart body: {}", err.body_text()))
}

fn parse_k(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("'{text}' is not a valid k")))
}

/// Declared part type, or one guessed from the file name. Anything outside
/// `image/*` is refused.
fn image_content_type(declared: Option<&str>, file_name: &str) -> Result<String> {
    let parsed = match declared {
        Some(value) => value.parse::<mime::Mime>().ok(),
        None => mime_guess::from_path(file_name).first(),
    };

    match parsed {
        Some(m) if m.type_() == mime::IMAGE => Ok(m.essence_str().to_string()),
        _ => Err(AppError::Validation(format!(
            "'{}' is not an image",
            declared.unwrap_or(file_name)
        ))),
    }
}
