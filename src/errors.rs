use crate::services::{
    process::ProcessError, prober::ProbeError, store::StoreError, video_repo::RepoError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// Terminal failure of one ingestion request.
///
/// Each variant names the stage that failed; none of them is retried inside
/// the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },

    #[error("unsupported content type `{declared}`, expected `{accepted}`")]
    UnsupportedFormat { declared: String, accepted: String },

    #[error("could not stage upload: {0}")]
    StagingIo(#[source] io::Error),

    #[error("could not normalize video for fast start: {0}")]
    NormalizationFailed(#[source] ProcessError),

    #[error("could not probe video geometry: {0}")]
    ProbeFailed(#[source] ProbeError),

    #[error("video geometry unavailable: {0}")]
    ProbeDataMissing(&'static str),

    #[error("random source unavailable: {0}")]
    RandomSourceUnavailable(#[source] rand::Error),

    #[error("failed to upload video to the content store: {0}")]
    UploadFailed(#[source] StoreError),

    #[error("failed to update video record: {0}")]
    ReconciliationFailed(#[source] RepoError),
}

impl PipelineError {
    /// Stable machine-readable code.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::StagingIo(_) => "staging_io_error",
            Self::NormalizationFailed(_) => "normalization_failed",
            Self::ProbeFailed(_) => "probe_failed",
            Self::ProbeDataMissing(_) => "probe_data_missing",
            Self::RandomSourceUnavailable(_) => "random_source_unavailable",
            Self::UploadFailed(_) => "upload_failed",
            Self::ReconciliationFailed(_) => "reconciliation_failed",
        }
    }

    /// `true` when the uploaded file itself is at fault rather than the
    /// service.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::PayloadTooLarge { .. }
            | Self::UnsupportedFormat { .. }
            | Self::ProbeDataMissing(_) => true,
            // ffmpeg rejecting the input is the file's fault, a missing
            // binary or timeout is ours
            Self::NormalizationFailed(err) => matches!(err, ProcessError::Status { .. }),
            _ => false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::ProbeDataMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NormalizationFailed(_) if self.is_client_error() => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, kind: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::new(err.status(), err.kind(), err.to_string())
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(id) => AppError::not_found(format!("video `{}` not found", id)),
            other => AppError::internal(other.to_string()),
        }
    }
}
