use crate::error::Result;
use crate::modules::transcode::engine::DEFAULT_SCALE;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub const UPLOADED_MESSAGE: &str = "file uploaded successfully";

/// Transcode request published for every raw upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub filename_processed: String,
    pub filename_raw: String,
    #[serde(default)]
    pub message: String,
    #[serde(with = "time::serde::rfc3339")]
    pub queued_at: OffsetDateTime,
    #[serde(default)]
    pub k: i64,
}

impl Job {
    /// Job for a freshly stored raw image, queued now.
    pub fn new(filename_raw: String, filename_processed: String, k: i64) -> Self {
        // Whole seconds, like the RFC 3339 stamp in the upload response.
        let now = OffsetDateTime::now_utc();
        Self {
            filename_processed,
            filename_raw,
            message: UPLOADED_MESSAGE.to_string(),
            queued_at: now.replace_nanosecond(0).unwrap_or(now),
            k,
        }
    }

    /// Downscale divisor; anything below 2 means "use the default".
    pub fn scale_factor(&self) -> u32 {
        if self.k > 1 {
            u32::try_from(self.k).unwrap_or(u32::MAX)
        } else {
            DEFAULT_SCALE
        }
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Raw and processed object names for an upload, sharing one id and the
/// original extension.
pub fn name_pair(original_filename: &str) -> (String, String) {
    let id = Uuid::new_v4();
    let ext = extension(original_filename);
    (format!("{id}-raw{ext}"), format!("{id}-processed{ext}"))
}

/// Extension including its dot, or empty.
fn extension(filename: &str) -> &str {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    match base.rfind('.') {
        Some(idx) if idx > 0 => &base[idx..],
        _ => "",
    }
}
