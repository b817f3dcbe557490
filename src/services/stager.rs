//! Stream staging: materialize an incoming body as a local temporary file.

use crate::services::tmp_file::TmpFile;
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{io, path::Path};
use thiserror::Error;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::debug;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("upload exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: u64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A fully written, fsynced copy of the uploaded bytes.
#[derive(Debug)]
pub struct StagedArtifact {
    pub file: TmpFile,
    pub size_bytes: u64,
}

/// Copy `stream` into a new file under `tmp_dir`, failing once more than
/// `max_bytes` have been received.
///
/// The file is removed on every error path; on success ownership passes to the
/// returned `StagedArtifact`.
pub async fn stage_stream<S>(
    tmp_dir: &Path,
    max_bytes: u64,
    stream: S,
) -> Result<StagedArtifact, StageError>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let tmp = TmpFile::in_dir(tmp_dir, ".mp4");
    let mut file = File::create(&*tmp).await?;

    let mut size_bytes: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as u64;
        if size_bytes > max_bytes {
            debug!(size_bytes, max_bytes, "staged upload over limit");
            return Err(StageError::PayloadTooLarge { limit: max_bytes });
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;

    debug!("staged {} bytes at {}", size_bytes, tmp.display());
    Ok(StagedArtifact {
        file: tmp,
        size_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::{StageError, stage_stream};
    use bytes::Bytes;
    use futures::stream;
    use std::io;

    fn chunks(parts: &[&'static [u8]]) -> impl futures::Stream<Item = io::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn writes_all_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage_stream(dir.path(), 1024, chunks(&[b"hello ", b"world"]))
            .await
            .unwrap();

        assert_eq!(staged.size_bytes, 11);
        assert_eq!(std::fs::read(&*staged.file).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn exact_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let staged = stage_stream(dir.path(), 4, chunks(&[b"ab", b"cd"]))
            .await
            .unwrap();
        assert_eq!(staged.size_bytes, 4);
    }

    #[tokio::test]
    async fn over_limit_fails_and_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = stage_stream(dir.path(), 4, chunks(&[b"ab", b"cde"]))
            .await
            .unwrap_err();

        assert!(matches!(err, StageError::PayloadTooLarge { limit: 4 }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn stream_error_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ]);
        let err = stage_stream(dir.path(), 1024, body).await.unwrap_err();

        assert!(matches!(err, StageError::Io(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
