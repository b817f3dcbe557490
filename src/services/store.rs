//! src/services/store.rs
//!
//! Content store backends. Both implement whole-object puts: the artifact is
//! either fully stored under its key or not at all.
//!
//! - `FileStore` keeps payloads on local disk sharded beneath
//!   `base_path/{bucket}/{shard}/{shard}/{key}`.
//! - `S3Store` hands the payload to an S3-compatible service.

use crate::models::object::StoredObject;
use async_trait::async_trait;
use futures::StreamExt;
use md5::Context;
use object_store::{
    Attribute, Attributes, ObjectStore, aws::AmazonS3Builder, buffered::BufWriter,
    path::Path as ObjectPath,
};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid object key `{0}`")]
    InvalidObjectKey(String),
    #[error("bucket `{0}` is not served by this store")]
    UnknownBucket(String),
    #[error("object store error: {0}")]
    Remote(#[from] object_store::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const MAX_OBJECT_KEY_LEN: usize = 1024;

/// Destination for normalized artifacts.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store the full contents of `body` under `bucket`/`key`.
    ///
    /// No retries happen here; a failed put leaves nothing visible under `key`.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: File,
        content_type: &str,
    ) -> StoreResult<StoredObject>;
}

/// Reject keys that could escape the bucket directory.
fn ensure_key_safe(key: &str) -> StoreResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_OBJECT_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(StoreError::InvalidObjectKey(key.to_string()));
    }
    Ok(())
}

/// Local-disk content store.
#[derive(Clone, Debug)]
pub struct FileStore {
    base_path: PathBuf,
}

impl FileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Two-level shard directories from MD5(bucket/key), keeping directory
    /// fan-out bounded.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// `base_path/bucket/{shard}/{shard}/{key}`. Parents may not exist yet.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.base_path.join(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    fn metadata_path(object_path: &Path) -> PathBuf {
        let mut name = object_path.as_os_str().to_os_string();
        name.push(".meta.json");
        PathBuf::from(name)
    }

    /// Stream `body` into `tmp_path`, returning size and MD5.
    async fn write_tmp(tmp_path: &Path, body: File) -> io::Result<(u64, String)> {
        let mut file = File::create(tmp_path).await?;
        let mut size_bytes: u64 = 0;
        let mut digest = Context::new();

        let mut stream = ReaderStream::new(body);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as u64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok((size_bytes, format!("{:x}", digest.compute())))
    }
}

#[async_trait]
impl ContentStore for FileStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: File,
        content_type: &str,
    ) -> StoreResult<StoredObject> {
        ensure_key_safe(key)?;

        let file_path = self.object_path(bucket, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::other("object path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let (size_bytes, etag) = match Self::write_tmp(&tmp_path, body).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StoreError::Io(err));
            }
        };

        let object = StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            etag: Some(etag),
        };

        let sidecar = serde_json::to_vec(&object).map_err(io::Error::from);
        let written = match sidecar {
            Ok(bytes) => fs::write(Self::metadata_path(&file_path), bytes).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StoreError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            let _ = fs::remove_file(Self::metadata_path(&file_path)).await;
            return Err(StoreError::Io(err));
        }

        debug!("stored object at {}", file_path.display());
        Ok(object)
    }
}

/// S3-compatible content store bound to a single bucket.
#[derive(Debug)]
pub struct S3Store {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl S3Store {
    /// Credentials come from the usual `AWS_*` environment variables.
    pub fn new(bucket: &str, region: &str, endpoint: Option<&str>) -> StoreResult<Self> {
        let mut builder = AmazonS3Builder::from_env()
            .with_region(region)
            .with_bucket_name(bucket);

        if let Some(endpoint) = endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        Ok(Self::from_store(Arc::new(builder.build()?), bucket))
    }

    /// Wrap an already-configured object store serving `bucket`.
    pub fn from_store(store: Arc<dyn ObjectStore>, bucket: &str) -> Self {
        Self {
            store,
            bucket: bucket.to_string(),
        }
    }

    /// Stream `body` through a buffered writer. Small artifacts go out as a
    /// single PUT, larger ones as a multipart upload that is aborted on error.
    async fn stream_body(
        &self,
        location: ObjectPath,
        body: File,
        content_type: &str,
    ) -> io::Result<(u64, String)> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let mut writer =
            BufWriter::new(Arc::clone(&self.store), location).with_attributes(attributes);

        let mut hasher = Context::new();
        let mut size_bytes = 0u64;
        let mut stream = ReaderStream::new(body);

        let written = async {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                hasher.consume(&chunk);
                size_bytes += chunk.len() as u64;
                writer.write_all(&chunk).await?;
            }
            writer.shutdown().await
        }
        .await;

        if let Err(err) = written {
            if let Err(abort_err) = writer.abort().await {
                error!(error = %abort_err, "failed to abort S3 upload");
            }
            return Err(err);
        }

        Ok((size_bytes, format!("{:x}", hasher.compute())))
    }
}

#[async_trait]
impl ContentStore for S3Store {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: File,
        content_type: &str,
    ) -> StoreResult<StoredObject> {
        ensure_key_safe(key)?;
        if bucket != self.bucket {
            return Err(StoreError::UnknownBucket(bucket.to_string()));
        }

        let start = Instant::now();
        let (size_bytes, etag) = self
            .stream_body(ObjectPath::from(key), body, content_type)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 upload failed"
                );
                StoreError::Io(e)
            })?;

        info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            etag: Some(etag),
        })
    }
}
