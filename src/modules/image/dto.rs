use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub filename_raw: String,
    pub filename_processed: String,
    /// RFC 3339, UTC.
    pub queued_at: String,
    pub k: i64,
    /// Raw object size in bytes.
    pub size: u64,
    pub partition: i32,
    pub offset: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub message: String,
}

// Documentation only; the handler reads the multipart stream itself.
#[allow(dead_code)]
#[derive(ToSchema)]
pub struct UploadImageForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    /// Downscale divisor. Values below 2 fall back to 2.
    pub k: Option<i64>,
}
