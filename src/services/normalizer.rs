//! Container normalization: relocate the MP4 `moov` index to the front of the
//! file so playback can start before the download completes.

use crate::services::{
    process::{self, ProcessError},
    tmp_file::TmpFile,
};
use async_trait::async_trait;
use std::{ffi::OsStr, path::Path, time::Duration};
use tracing::debug;

/// Suffix appended to the staged path to name the normalized artifact.
pub const PROCESSING_SUFFIX: &str = ".processing";

/// Rewrites a video container without re-encoding.
#[async_trait]
pub trait MediaRewriter: Send + Sync {
    /// Write a fast-start copy of `input` to `output`. `input` is not modified.
    async fn fast_start(&self, input: &Path, output: &Path) -> Result<(), ProcessError>;
}

/// `MediaRewriter` backed by the `ffmpeg` binary.
#[derive(Clone, Debug)]
pub struct FfmpegRewriter {
    binary: String,
    timeout: Duration,
}

impl FfmpegRewriter {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaRewriter for FfmpegRewriter {
    async fn fast_start(&self, input: &Path, output: &Path) -> Result<(), ProcessError> {
        let args = [
            OsStr::new("-y"),
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-c"),
            OsStr::new("copy"),
            OsStr::new("-movflags"),
            OsStr::new("faststart"),
            OsStr::new("-f"),
            OsStr::new("mp4"),
            output.as_os_str(),
        ];
        process::run(&self.binary, &args, self.timeout).await?;
        Ok(())
    }
}

/// Produce the normalized sibling of `staged` at `{staged}.processing`.
///
/// The output path is owned by a `TmpFile` before the tool starts, so a
/// half-written file left by a failed run is removed as well.
pub async fn normalize(
    rewriter: &dyn MediaRewriter,
    staged: &TmpFile,
) -> Result<TmpFile, ProcessError> {
    let output = TmpFile::at(staged.with_suffix(PROCESSING_SUFFIX));
    rewriter.fast_start(staged, &output).await?;
    debug!("normalized {} -> {}", staged.display(), output.display());
    Ok(output)
}
