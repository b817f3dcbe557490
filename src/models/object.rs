//! Represents an artifact persisted in the content store.

use serde::{Deserialize, Serialize};

/// Result of a successful whole-object put.
///
/// The struct only describes the stored payload; the bytes themselves live in
/// whichever `ContentStore` backend accepted them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// Store namespace the object was written into.
    pub bucket: String,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type) recorded alongside the object.
    pub content_type: String,

    /// Size in bytes.
    pub size_bytes: u64,

    /// MD5 checksum when the backend computes one.
    pub etag: Option<String>,
}

impl StoredObject {
    /// Locator persisted on the video record: `"{bucket},{key}"`.
    pub fn locator(&self) -> String {
        format!("{},{}", self.bucket, self.key)
    }
}
