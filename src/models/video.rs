//! Video metadata record, owned by the metadata store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row of the `videos` table.
///
/// The ingestion pipeline only ever writes `video_url` (and bumps
/// `updated_at`); all other fields are managed elsewhere.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct VideoRecord {
    pub id: Uuid,

    /// Principal that owns the video.
    pub user_id: Uuid,

    pub title: String,

    pub description: Option<String>,

    pub thumbnail_url: Option<String>,

    /// Storage locator, `"{bucket},{key}"` once an upload succeeded.
    pub video_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn new(user_id: Uuid, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            description: None,
            thumbnail_url: None,
            video_url: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// JSON representation returned to API callers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VideoRecordView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<VideoRecord> for VideoRecordView {
    fn from(record: VideoRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            title: record.title,
            description: record.description,
            thumbnail_url: record.thumbnail_url,
            video_url: record.video_url,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
