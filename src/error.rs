use crate::common::response::ApiError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Every failure the ingestion service and the converter can report.
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed ingestion request.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Content type outside the codec registry.
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Object store or broker unreachable, or a stream broke mid-transfer.
    #[error("transport error: {0}")]
    Transport(String),

    /// Job payload could not be parsed.
    #[error("malformed job payload: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("failed to decode image: {0}")]
    Decode(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// The upload stopped reading before the encoder was done.
    #[error("upload stopped reading the encoded image")]
    BridgeClosed,

    /// Both halves of the streaming bridge failed. The transcode error is
    /// primary unless it only reports the upload hanging up.
    #[error("{}", pipeline_message(.transcode, .upload))]
    Pipeline {
        transcode: Box<AppError>,
        upload: Box<AppError>,
    },
}

impl AppError {
    /// Stable label used for logs and the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::UnsupportedFormat(_) => "unsupported_format",
            Self::NotFound { .. } => "not_found",
            Self::Transport(_) => "transport",
            Self::Schema(_) => "schema",
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Internal(_) => "internal",
            Self::BridgeClosed => "transport",
            Self::Pipeline { transcode, upload } => match **transcode {
                Self::BridgeClosed => upload.kind(),
                _ => transcode.kind(),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::UnsupportedFormat(_) | Self::Schema(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Transport(_) | Self::BridgeClosed => StatusCode::BAD_GATEWAY,
            Self::Decode(_) | Self::Encode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) | Self::Pipeline { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

fn pipeline_message(transcode: &AppError, upload: &AppError) -> String {
    match transcode {
        AppError::BridgeClosed => format!("{upload} (transcode stopped: {transcode})"),
        _ => format!("{transcode} (upload also failed: {upload})"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError(self.to_string(), self.status_code()).into_response()
    }
}
