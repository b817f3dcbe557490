//! HTTP handler for video uploads.
//! Streams the request body straight into the ingestion pipeline; nothing is
//! buffered in memory.

use crate::{
    errors::{AppError, PipelineError},
    models::{upload::UploadRequest, video::VideoRecordView},
    state::AppState,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, header},
};
use futures::StreamExt;
use std::io;
use uuid::Uuid;

/// Header carrying the principal authenticated by the upstream gateway.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Reject bodies whose declared length already exceeds the bound, before any
/// byte is read.
fn check_declared_length(headers: &HeaderMap, limit: u64) -> Result<(), PipelineError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    match declared {
        Some(len) if len > limit => Err(PipelineError::PayloadTooLarge { limit }),
        _ => Ok(()),
    }
}

fn requester(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .ok_or_else(|| AppError::unauthorized("missing authenticated user"))?;
    raw.to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| AppError::bad_request("invalid user id"))
}

/// `POST /api/videos/{video_id}/upload` — ingest the raw request body as the
/// video's content.
pub async fn upload_video(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<VideoRecordView>, AppError> {
    let user_id = requester(&headers)?;

    let video = state
        .pipeline
        .repo()
        .get_video(video_id)
        .await?
        .ok_or_else(|| AppError::not_found("could not find metadata for video"))?;
    if video.user_id != user_id {
        return Err(AppError::forbidden("you do not own this video"));
    }

    check_declared_length(&headers, state.pipeline.config().max_upload_bytes)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    tracing::info!(%video_id, %user_id, "uploading video");
    let request = UploadRequest::new(video_id, user_id, content_type, stream);
    let view = state.pipeline.upload_video(request).await?;

    Ok(Json(view))
}
