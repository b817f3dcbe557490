//! Geometry probing: read a video's dimensions and classify its aspect ratio.

use crate::{
    models::aspect::AspectCategory,
    services::process::{self, ProcessError},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::{ffi::OsStr, path::Path, time::Duration};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error("unreadable probe output: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("probe output missing data: {0}")]
    DataMissing(&'static str),
}

/// Pixel dimensions of the first video stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoGeometry {
    pub width: u32,
    pub height: u32,
}

impl VideoGeometry {
    pub fn category(self) -> AspectCategory {
        AspectCategory::classify(self.width, self.height)
    }
}

/// Inspects a media file without modifying it.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    async fn geometry(&self, path: &Path) -> Result<VideoGeometry, ProbeError>;
}

/// `MediaInspector` backed by the `ffprobe` binary.
#[derive(Clone, Debug)]
pub struct FfprobeInspector {
    binary: String,
    timeout: Duration,
}

impl FfprobeInspector {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl MediaInspector for FfprobeInspector {
    async fn geometry(&self, path: &Path) -> Result<VideoGeometry, ProbeError> {
        let args = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_streams"),
            path.as_os_str(),
        ];
        let output = process::run(&self.binary, &args, self.timeout).await?;
        parse_geometry(&output)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl FfprobeStream {
    fn is_video(&self) -> bool {
        match self.codec_type.as_deref() {
            Some(kind) => kind == "video",
            None => true,
        }
    }

    fn has_dimensions(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}

/// Parse `ffprobe -show_streams -print_format json` output.
///
/// The first video stream carrying both dimensions wins; audio streams and
/// video streams without geometry (cover art, data tracks) are skipped.
fn parse_geometry(output: &[u8]) -> Result<VideoGeometry, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(output)?;
    if parsed.streams.is_empty() {
        return Err(ProbeError::DataMissing("no streams reported"));
    }

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.is_video() && s.has_dimensions());

    let (width, height) = match stream.map(|s| (s.width, s.height)) {
        Some((Some(w), Some(h))) if w > 0 && h > 0 => (w, h),
        Some(_) => return Err(ProbeError::DataMissing("zero width or height")),
        None if parsed.streams.iter().any(FfprobeStream::is_video) => {
            return Err(ProbeError::DataMissing("width or height absent"));
        }
        None => return Err(ProbeError::DataMissing("no video stream")),
    };

    debug!(width, height, "probed video geometry");
    Ok(VideoGeometry { width, height })
}

/// Probe `path` and classify it.
pub async fn probe_category(
    inspector: &dyn MediaInspector,
    path: &Path,
) -> Result<AspectCategory, ProbeError> {
    let geometry = inspector.geometry(path).await?;
    let category = geometry.category();
    debug!(
        width = geometry.width,
        height = geometry.height,
        %category,
        "classified aspect ratio"
    );
    Ok(category)
}
