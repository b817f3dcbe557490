//! Defines the HTTP surface of the ingestion service.
//!
//! - `GET  /healthz` — liveness
//! - `GET  /readyz` — readiness (SQLite + staging directory)
//! - `POST /api/videos/{video_id}/upload` — ingest a video body for an existing record

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        video_handlers::upload_video,
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Framework body limit for the upload route. One byte above the configured
/// bound so the stager still reports the exact `PayloadTooLarge` limit.
fn upload_body_limit(max_upload_bytes: u64) -> usize {
    usize::try_from(max_upload_bytes.saturating_add(1)).unwrap_or(usize::MAX)
}

/// Build the router. The upload route's body limit is raised to the
/// configured upload bound; the stager enforces the exact byte count.
pub fn routes(max_upload_bytes: u64) -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/api/videos/{video_id}/upload",
            post(upload_video).layer(DefaultBodyLimit::max(upload_body_limit(max_upload_bytes))),
        )
}

#[cfg(test)]
mod tests {
    use super::upload_body_limit;

    #[test]
    fn upload_limit_sits_just_above_the_configured_bound() {
        assert_eq!(upload_body_limit(64), 65);
        assert_eq!(upload_body_limit(1 << 30), (1 << 30) + 1);
        assert_eq!(upload_body_limit(u64::MAX), usize::MAX);
    }
}
