use super::Pipeline;
use crate::{
    config::PipelineConfig,
    errors::PipelineError,
    models::{object::StoredObject, upload::UploadRequest, video::VideoRecord},
    services::{
        normalizer::MediaRewriter,
        process::ProcessError,
        prober::{MediaInspector, ProbeError, VideoGeometry},
        store::{ContentStore, StoreError, StoreResult},
        video_repo::{RepoResult, VideoRepository},
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::{
    collections::HashMap,
    io,
    os::unix::process::ExitStatusExt,
    path::Path,
    process::ExitStatus,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;
use tokio::{fs::File, io::AsyncReadExt};
use uuid::Uuid;

const MP4: &str = "video/mp4";

type TestBody = stream::Iter<std::vec::IntoIter<io::Result<Bytes>>>;

#[derive(Clone, Copy)]
enum RewriteMode {
    Copy,
    Fail,
    Hang,
}

struct FakeRewriter {
    mode: RewriteMode,
    calls: AtomicUsize,
}

#[async_trait]
impl MediaRewriter for FakeRewriter {
    async fn fast_start(&self, input: &Path, output: &Path) -> Result<(), ProcessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            RewriteMode::Copy => {
                let mut bytes = tokio::fs::read(input).await.unwrap();
                bytes.extend_from_slice(b"+faststart");
                tokio::fs::write(output, bytes).await.unwrap();
                Ok(())
            }
            RewriteMode::Fail => {
                tokio::fs::write(output, b"partial").await.unwrap();
                Err(ProcessError::Status {
                    command: "ffmpeg".into(),
                    status: ExitStatus::from_raw(1 << 8),
                    stderr: "moov atom not found".into(),
                })
            }
            RewriteMode::Hang => {
                tokio::fs::write(output, b"partial").await.unwrap();
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }
}

struct FakeInspector {
    geometry: Option<VideoGeometry>,
    tool_fails: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl MediaInspector for FakeInspector {
    async fn geometry(&self, path: &Path) -> Result<VideoGeometry, ProbeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(path.exists(), "inspection must run against an existing artifact");
        if self.tool_fails {
            return Err(ProbeError::Process(ProcessError::Status {
                command: "ffprobe".into(),
                status: ExitStatus::from_raw(1 << 8),
                stderr: "Invalid data found when processing input".into(),
            }));
        }
        self.geometry
            .ok_or(ProbeError::DataMissing("no streams reported"))
    }
}

#[derive(Default)]
struct MemoryStore {
    fail: bool,
    objects: Mutex<Vec<(StoredObject, Vec<u8>)>>,
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: File,
        content_type: &str,
    ) -> StoreResult<StoredObject> {
        if self.fail {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "store unreachable",
            )));
        }
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;
        let object = StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            size_bytes: data.len() as u64,
            etag: None,
        };
        self.objects.lock().unwrap().push((object.clone(), data));
        Ok(object)
    }
}

#[derive(Default)]
struct MemoryRepo {
    videos: Mutex<HashMap<Uuid, VideoRecord>>,
}

#[async_trait]
impl VideoRepository for MemoryRepo {
    async fn get_video(&self, id: Uuid) -> RepoResult<Option<VideoRecord>> {
        Ok(self.videos.lock().unwrap().get(&id).cloned())
    }

    async fn update_video(&self, video: &VideoRecord) -> RepoResult<()> {
        self.videos.lock().unwrap().insert(video.id, video.clone());
        Ok(())
    }
}

struct Harness {
    tmp: TempDir,
    pipeline: Pipeline,
    rewriter: Arc<FakeRewriter>,
    inspector: Arc<FakeInspector>,
    store: Arc<MemoryStore>,
    repo: Arc<MemoryRepo>,
    video: VideoRecord,
}

impl Harness {
    fn new(mode: RewriteMode, geometry: Option<VideoGeometry>, store_fails: bool) -> Self {
        Self::build(mode, geometry, false, store_fails)
    }

    fn build(
        mode: RewriteMode,
        geometry: Option<VideoGeometry>,
        inspector_fails: bool,
        store_fails: bool,
    ) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let rewriter = Arc::new(FakeRewriter {
            mode,
            calls: AtomicUsize::new(0),
        });
        let inspector = Arc::new(FakeInspector {
            geometry,
            tool_fails: inspector_fails,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(MemoryStore {
            fail: store_fails,
            ..Default::default()
        });
        let repo = Arc::new(MemoryRepo::default());

        let video = VideoRecord::new(Uuid::new_v4(), "clip");
        repo.videos.lock().unwrap().insert(video.id, video.clone());

        let config = PipelineConfig {
            tmp_dir: tmp.path().to_path_buf(),
            max_upload_bytes: 64,
            accepted_content_type: MP4.into(),
            bucket: "tubely".into(),
        };
        let pipeline = Pipeline::new(
            config,
            rewriter.clone(),
            inspector.clone(),
            store.clone(),
            repo.clone(),
        );

        Self {
            tmp,
            pipeline,
            rewriter,
            inspector,
            store,
            repo,
            video,
        }
    }

    fn landscape() -> Self {
        Self::new(
            RewriteMode::Copy,
            Some(VideoGeometry {
                width: 1920,
                height: 1080,
            }),
            false,
        )
    }

    fn request(
        &self,
        content_type: &str,
        body: &'static [u8],
    ) -> UploadRequest<TestBody> {
        UploadRequest::new(
            self.video.id,
            self.video.user_id,
            Some(content_type.to_string()),
            stream::iter(vec![Ok(Bytes::from_static(body))]),
        )
    }

    async fn upload(&self, content_type: &str, body: &'static [u8]) -> Result<String, PipelineError> {
        self.pipeline
            .upload_video(self.request(content_type, body))
            .await
            .map(|view| view.video_url.unwrap())
    }

    fn tmp_is_empty(&self) -> bool {
        std::fs::read_dir(self.tmp.path()).unwrap().count() == 0
    }

    fn locator(&self) -> Option<String> {
        self.repo.videos.lock().unwrap()[&self.video.id]
            .video_url
            .clone()
    }

    fn calls(&self) -> (usize, usize, usize) {
        (
            self.rewriter.calls.load(Ordering::SeqCst),
            self.inspector.calls.load(Ordering::SeqCst),
            self.store.objects.lock().unwrap().len(),
        )
    }
}

#[tokio::test]
async fn successful_upload_stores_normalized_bytes_and_sets_locator() {
    let h = Harness::landscape();

    let url = h.upload(MP4, b"raw-video").await.unwrap();

    let objects = h.store.objects.lock().unwrap();
    let (object, data) = &objects[0];
    assert_eq!(data, b"raw-video+faststart");
    assert_eq!(object.content_type, MP4);
    assert_eq!(object.bucket, "tubely");
    assert!(object.key.starts_with("landscape/"));
    assert!(object.key.ends_with(".mp4"));
    assert_eq!(url, format!("tubely,{}", object.key));
    drop(objects);

    assert_eq!(h.locator(), Some(url));
    assert_eq!(h.calls(), (1, 1, 1));
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn content_type_parameters_are_ignored() {
    let h = Harness::landscape();
    h.upload("video/mp4; codecs=\"avc1.42E01E\"", b"raw").await.unwrap();

    let objects = h.store.objects.lock().unwrap();
    assert_eq!(objects[0].0.content_type, MP4);
}

#[tokio::test]
async fn oversized_upload_never_reaches_external_tools() {
    let h = Harness::landscape();
    let body: &'static [u8] = &[0u8; 65];

    let err = h.upload(MP4, body).await.unwrap_err();

    assert!(matches!(err, PipelineError::PayloadTooLarge { limit: 64 }));
    assert_eq!(h.calls(), (0, 0, 0));
    assert!(h.tmp_is_empty());
    assert_eq!(h.locator(), None);
}

#[tokio::test]
async fn wrong_content_type_is_rejected_before_rewrite() {
    let h = Harness::landscape();

    for declared in ["video/webm", "image/png", "not a mime type", ""] {
        let err = h.upload(declared, b"raw").await.unwrap_err();
        assert!(
            matches!(err, PipelineError::UnsupportedFormat { .. }),
            "{declared:?} gave {err:?}"
        );
    }

    let mut request = h.request(MP4, b"raw");
    request.content_type = None;
    let err = h.pipeline.upload_video(request).await.unwrap_err();
    assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));

    assert_eq!(h.calls(), (0, 0, 0));
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn rewrite_failure_stops_the_pipeline() {
    let h = Harness::new(
        RewriteMode::Fail,
        Some(VideoGeometry {
            width: 1920,
            height: 1080,
        }),
        false,
    );

    let err = h.upload(MP4, b"raw").await.unwrap_err();

    assert!(matches!(err, PipelineError::NormalizationFailed(_)));
    assert!(err.to_string().contains("moov atom not found"));
    assert!(err.is_client_error());
    assert_eq!(h.calls(), (1, 0, 0));
    assert_eq!(h.locator(), None);
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn missing_geometry_is_a_hard_error() {
    let h = Harness::new(RewriteMode::Copy, None, false);

    let err = h.upload(MP4, b"raw").await.unwrap_err();

    assert!(matches!(err, PipelineError::ProbeDataMissing(_)));
    assert_eq!(h.calls(), (1, 1, 0));
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn inspector_tool_failure_stops_the_pipeline() {
    let h = Harness::build(
        RewriteMode::Copy,
        Some(VideoGeometry {
            width: 1920,
            height: 1080,
        }),
        true,
        false,
    );

    let err = h.upload(MP4, b"raw").await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::ProbeFailed(ProbeError::Process(ProcessError::Status { .. }))
    ));
    assert!(err.to_string().contains("Invalid data found"));
    assert!(!err.is_client_error());
    assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.calls(), (1, 1, 0));
    assert_eq!(h.locator(), None);
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn store_failure_leaves_record_untouched() {
    let h = Harness::new(
        RewriteMode::Copy,
        Some(VideoGeometry {
            width: 1080,
            height: 1920,
        }),
        true,
    );

    let err = h.upload(MP4, b"raw").await.unwrap_err();

    assert!(matches!(err, PipelineError::UploadFailed(_)));
    assert!(!err.is_client_error());
    assert_eq!(h.locator(), None);
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn missing_record_fails_reconciliation() {
    let h = Harness::landscape();
    h.repo.videos.lock().unwrap().clear();

    let err = h.upload(MP4, b"raw").await.unwrap_err();

    assert!(matches!(err, PipelineError::ReconciliationFailed(_)));
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn reruns_get_fresh_keys_but_same_category() {
    let h = Harness::new(
        RewriteMode::Copy,
        Some(VideoGeometry {
            width: 1000,
            height: 1000,
        }),
        false,
    );

    let first = h.upload(MP4, b"same bytes").await.unwrap();
    let second = h.upload(MP4, b"same bytes").await.unwrap();

    assert_ne!(first, second);
    assert!(first.starts_with("tubely,other/"));
    assert!(second.starts_with("tubely,other/"));
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn dropped_request_cleans_up_artifacts() {
    let h = Harness::new(RewriteMode::Hang, None, false);

    let res = tokio::time::timeout(
        Duration::from_millis(100),
        h.pipeline.upload_video(h.request(MP4, b"raw")),
    )
    .await;

    assert!(res.is_err(), "hanging rewrite should time out");
    assert_eq!(h.calls().0, 1);
    assert!(h.tmp_is_empty());
}

#[tokio::test]
async fn concurrent_uploads_do_not_interfere() {
    let h = Harness::landscape();

    let (a, b) = tokio::join!(h.upload(MP4, b"first"), h.upload(MP4, b"second"));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_ne!(a, b);
    let objects = h.store.objects.lock().unwrap();
    let mut payloads: Vec<_> = objects.iter().map(|(_, d)| d.clone()).collect();
    payloads.sort();
    assert_eq!(
        payloads,
        vec![b"first+faststart".to_vec(), b"second+faststart".to_vec()]
    );
    drop(objects);
    assert!(h.tmp_is_empty());
}
