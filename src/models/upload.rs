//! Inbound upload request handed to the pipeline.

use bytes::Bytes;
use futures::Stream;
use std::io;
use uuid::Uuid;

/// A single video upload.
///
/// Ownership of `video_id` by `user_id` has already been checked by the
/// caller; the pipeline only carries the ids for logging.
pub struct UploadRequest<S> {
    pub video_id: Uuid,
    pub user_id: Uuid,
    /// Raw `Content-Type` as declared by the client, parameters included.
    pub content_type: Option<String>,
    pub body: S,
}

impl<S> UploadRequest<S>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    pub fn new(video_id: Uuid, user_id: Uuid, content_type: Option<String>, body: S) -> Self {
        Self {
            video_id,
            user_id,
            content_type,
            body,
        }
    }
}
