//! src/services/pipeline.rs
//!
//! Ingestion orchestrator. One request runs these states in order:
//!
//! `Received -> Staged -> Validated -> Normalized -> Probed -> KeyDerived ->
//! Uploaded -> Reconciled -> Done`
//!
//! and any failure ends the run with a `PipelineError`. Each stage consumes the
//! previous stage's output by value, and local artifacts live in `TmpFile`
//! guards held by those values, so whatever was created so far is removed on
//! every exit path, including the request future being dropped mid-flight.

use crate::{
    config::PipelineConfig,
    errors::PipelineError,
    models::{
        aspect::AspectCategory, object::StoredObject, upload::UploadRequest,
        video::VideoRecordView,
    },
    services::{
        keys,
        normalizer::{self, MediaRewriter},
        prober::{self, MediaInspector, ProbeError},
        stager::{self, StageError, StagedArtifact},
        store::ContentStore,
        tmp_file::TmpFile,
        video_repo::{RepoError, VideoRepository},
    },
};
use bytes::Bytes;
use futures::Stream;
use std::{fmt, io, sync::Arc};
use tokio::fs::File;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

/// Position of a request in the ingestion state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Staged,
    Validated,
    Normalized,
    Probed,
    KeyDerived,
    Uploaded,
    Reconciled,
    Done,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Tracks the last state reached so failures can be reported against it.
struct Progress {
    state: PipelineState,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: PipelineState::Received,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "pipeline transition");
        self.state = next;
    }
}

/// The normalized artifact, ready to be keyed and uploaded.
struct Normalized {
    file: TmpFile,
}

struct Probed {
    file: TmpFile,
    category: AspectCategory,
}

struct Keyed {
    file: TmpFile,
    key: String,
}

struct Uploaded {
    file: TmpFile,
    object: StoredObject,
}

/// Runs uploads end to end. Cheap to clone; collaborators are shared.
#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    rewriter: Arc<dyn MediaRewriter>,
    inspector: Arc<dyn MediaInspector>,
    store: Arc<dyn ContentStore>,
    repo: Arc<dyn VideoRepository>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        rewriter: Arc<dyn MediaRewriter>,
        inspector: Arc<dyn MediaInspector>,
        store: Arc<dyn ContentStore>,
        repo: Arc<dyn VideoRepository>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            rewriter,
            inspector,
            store,
            repo,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn repo(&self) -> &Arc<dyn VideoRepository> {
        &self.repo
    }

    /// Ingest one upload and return the updated video record.
    ///
    /// The caller has already verified that `request.user_id` owns
    /// `request.video_id`.
    pub async fn upload_video<S>(
        &self,
        request: UploadRequest<S>,
    ) -> Result<VideoRecordView, PipelineError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let span = info_span!(
            "upload_video",
            video_id = %request.video_id,
            user_id = %request.user_id
        );
        async move {
            let mut progress = Progress::new();
            match self.run(&mut progress, request).await {
                Ok(view) => {
                    progress.advance(PipelineState::Done);
                    info!(video_url = ?view.video_url, "video ingested");
                    Ok(view)
                }
                Err(err) => {
                    if err.is_client_error() {
                        warn!(
                            state = %progress.state,
                            kind = err.kind(),
                            error = %err,
                            "upload rejected"
                        );
                    } else {
                        error!(
                            state = %progress.state,
                            kind = err.kind(),
                            error = %err,
                            "upload failed"
                        );
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run<S>(
        &self,
        progress: &mut Progress,
        request: UploadRequest<S>,
    ) -> Result<VideoRecordView, PipelineError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let UploadRequest {
            video_id,
            content_type,
            body,
            ..
        } = request;

        let staged = self.stage(body).await?;
        progress.advance(PipelineState::Staged);

        let content_type = self.validate(content_type.as_deref())?;
        progress.advance(PipelineState::Validated);

        let normalized = self.normalize(staged).await?;
        progress.advance(PipelineState::Normalized);

        let probed = self.probe(normalized).await?;
        progress.advance(PipelineState::Probed);

        let keyed = self.derive_key(probed)?;
        progress.advance(PipelineState::KeyDerived);

        let uploaded = self.upload(keyed, &content_type).await?;
        progress.advance(PipelineState::Uploaded);

        let Uploaded { file, object } = uploaded;
        if let Err(err) = file.cleanup().await {
            warn!(error = %err, "failed to remove normalized artifact");
        }

        let view = self.reconcile(video_id, &object).await?;
        progress.advance(PipelineState::Reconciled);

        Ok(view)
    }

    async fn stage<S>(&self, body: S) -> Result<StagedArtifact, PipelineError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        stager::stage_stream(&self.config.tmp_dir, self.config.max_upload_bytes, body)
            .await
            .map_err(|err| match err {
                StageError::PayloadTooLarge { limit } => PipelineError::PayloadTooLarge { limit },
                StageError::Io(err) => PipelineError::StagingIo(err),
            })
    }

    /// Accept only the configured MIME type; parameters such as `codecs=` are
    /// ignored. Returns the bare type used for the stored object.
    fn validate(&self, declared: Option<&str>) -> Result<String, PipelineError> {
        let accepted = &self.config.accepted_content_type;
        let unsupported = || PipelineError::UnsupportedFormat {
            declared: declared.unwrap_or("").to_string(),
            accepted: accepted.clone(),
        };

        let mime: mime::Mime = declared
            .ok_or_else(unsupported)?
            .parse()
            .map_err(|_| unsupported())?;

        if mime.essence_str().eq_ignore_ascii_case(accepted) {
            Ok(mime.essence_str().to_string())
        } else {
            Err(unsupported())
        }
    }

    /// The staged upload is released as soon as its fast-start copy exists.
    async fn normalize(&self, staged: StagedArtifact) -> Result<Normalized, PipelineError> {
        let file = normalizer::normalize(self.rewriter.as_ref(), &staged.file)
            .await
            .map_err(PipelineError::NormalizationFailed)?;

        if let Err(err) = staged.file.cleanup().await {
            warn!(error = %err, "failed to remove staged artifact");
        }
        Ok(Normalized { file })
    }

    async fn probe(&self, normalized: Normalized) -> Result<Probed, PipelineError> {
        let category = prober::probe_category(self.inspector.as_ref(), &normalized.file)
            .await
            .map_err(|err| match err {
                ProbeError::DataMissing(what) => PipelineError::ProbeDataMissing(what),
                other => PipelineError::ProbeFailed(other),
            })?;

        Ok(Probed {
            file: normalized.file,
            category,
        })
    }

    fn derive_key(&self, probed: Probed) -> Result<Keyed, PipelineError> {
        let key =
            keys::derive_key(probed.category).map_err(PipelineError::RandomSourceUnavailable)?;
        debug!(%key, "derived storage key");
        Ok(Keyed {
            file: probed.file,
            key,
        })
    }

    async fn upload(&self, keyed: Keyed, content_type: &str) -> Result<Uploaded, PipelineError> {
        // Fresh handle so the store always reads from offset zero.
        let body = File::open(&*keyed.file)
            .await
            .map_err(PipelineError::StagingIo)?;

        let object = self
            .store
            .put_object(&self.config.bucket, &keyed.key, body, content_type)
            .await
            .map_err(PipelineError::UploadFailed)?;

        Ok(Uploaded {
            file: keyed.file,
            object,
        })
    }

    async fn reconcile(
        &self,
        video_id: Uuid,
        object: &StoredObject,
    ) -> Result<VideoRecordView, PipelineError> {
        let mut video = self
            .repo
            .get_video(video_id)
            .await
            .map_err(PipelineError::ReconciliationFailed)?
            .ok_or(PipelineError::ReconciliationFailed(RepoError::NotFound(
                video_id,
            )))?;

        video.video_url = Some(object.locator());
        self.repo
            .update_video(&video)
            .await
            .map_err(PipelineError::ReconciliationFailed)?;

        Ok(video.into())
    }
}

#[cfg(all(test, unix))]
mod tests;
