use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

/// Default upload bound: 1 GiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 1 << 30;
pub const DEFAULT_ACCEPTED_CONTENT_TYPE: &str = "video/mp4";

/// Which `ContentStore` backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    File,
    S3,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "s3" => Ok(Self::S3),
            other => bail!("unknown store backend `{}` (expected `file` or `s3`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub tmp_dir: PathBuf,
    pub max_upload_bytes: u64,
    pub accepted_content_type: String,
    pub store_backend: StoreBackend,
    pub store_dir: PathBuf,
    pub bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub process_timeout: Duration,
}

/// The slice of configuration the ingestion pipeline needs, fixed at
/// construction time.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory for staged and normalized artifacts.
    pub tmp_dir: PathBuf,
    pub max_upload_bytes: u64,
    /// The single MIME type uploads must declare.
    pub accepted_content_type: String,
    /// Store namespace artifacts are written into.
    pub bucket: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Video ingestion and fast-start normalization service")]
pub struct Args {
    /// Host to bind to (overrides VIDEO_INGEST_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides VIDEO_INGEST_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides VIDEO_INGEST_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Directory for temporary upload artifacts (overrides VIDEO_INGEST_TMP_DIR)
    #[arg(long)]
    pub tmp_dir: Option<PathBuf>,

    /// Maximum accepted upload size in bytes (overrides VIDEO_INGEST_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<u64>,

    /// MIME type uploads must declare (overrides VIDEO_INGEST_ACCEPTED_CONTENT_TYPE)
    #[arg(long)]
    pub accepted_content_type: Option<String>,

    /// Content store backend, `file` or `s3` (overrides VIDEO_INGEST_STORE_BACKEND)
    #[arg(long)]
    pub store_backend: Option<StoreBackend>,

    /// Root directory of the file store (overrides VIDEO_INGEST_STORE_DIR)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Store namespace / S3 bucket (overrides VIDEO_INGEST_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// S3 region (overrides VIDEO_INGEST_S3_REGION)
    #[arg(long)]
    pub s3_region: Option<String>,

    /// Custom S3 endpoint, e.g. MinIO (overrides VIDEO_INGEST_S3_ENDPOINT)
    #[arg(long)]
    pub s3_endpoint: Option<String>,

    /// ffmpeg binary (overrides VIDEO_INGEST_FFMPEG)
    #[arg(long)]
    pub ffmpeg_path: Option<String>,

    /// ffprobe binary (overrides VIDEO_INGEST_FFPROBE)
    #[arg(long)]
    pub ffprobe_path: Option<String>,

    /// Per-invocation limit for external tools, in seconds
    /// (overrides VIDEO_INGEST_PROCESS_TIMEOUT_SECS)
    #[arg(long)]
    pub process_timeout_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.into())
}

/// Parse an optional env var, failing loudly on malformed values.
fn env_parse<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        let env_port = env_parse("VIDEO_INGEST_PORT", 8091u16)?;
        let env_max = env_parse("VIDEO_INGEST_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let env_backend = env_parse("VIDEO_INGEST_STORE_BACKEND", StoreBackend::File)?;
        let env_timeout = env_parse("VIDEO_INGEST_PROCESS_TIMEOUT_SECS", 600u64)?;

        let cfg = Self {
            host: args
                .host
                .unwrap_or_else(|| env_or("VIDEO_INGEST_HOST", "0.0.0.0")),
            port: args.port.unwrap_or(env_port),
            database_url: args.database_url.unwrap_or_else(|| {
                env_or(
                    "VIDEO_INGEST_DATABASE_URL",
                    "sqlite://./data/meta/videos.db",
                )
            }),
            tmp_dir: args.tmp_dir.unwrap_or_else(|| {
                env::var("VIDEO_INGEST_TMP_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| env::temp_dir().join("video-ingest"))
            }),
            max_upload_bytes: args.max_upload_bytes.unwrap_or(env_max),
            accepted_content_type: args.accepted_content_type.unwrap_or_else(|| {
                env_or(
                    "VIDEO_INGEST_ACCEPTED_CONTENT_TYPE",
                    DEFAULT_ACCEPTED_CONTENT_TYPE,
                )
            }),
            store_backend: args.store_backend.unwrap_or(env_backend),
            store_dir: args.store_dir.unwrap_or_else(|| {
                PathBuf::from(env_or("VIDEO_INGEST_STORE_DIR", "./data/objects"))
            }),
            bucket: args
                .bucket
                .unwrap_or_else(|| env_or("VIDEO_INGEST_BUCKET", "videos")),
            s3_region: args
                .s3_region
                .unwrap_or_else(|| env_or("VIDEO_INGEST_S3_REGION", "us-east-1")),
            s3_endpoint: args
                .s3_endpoint
                .or_else(|| env::var("VIDEO_INGEST_S3_ENDPOINT").ok()),
            ffmpeg_path: args
                .ffmpeg_path
                .unwrap_or_else(|| env_or("VIDEO_INGEST_FFMPEG", "ffmpeg")),
            ffprobe_path: args
                .ffprobe_path
                .unwrap_or_else(|| env_or("VIDEO_INGEST_FFPROBE", "ffprobe")),
            process_timeout: Duration::from_secs(args.process_timeout_secs.unwrap_or(env_timeout)),
        };

        if cfg.max_upload_bytes == 0 {
            bail!("max upload size must be greater than zero");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            tmp_dir: self.tmp_dir.clone(),
            max_upload_bytes: self.max_upload_bytes,
            accepted_content_type: self.accepted_content_type.clone(),
            bucket: self.bucket.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AppConfig, Args, StoreBackend};
    use clap::Parser;
    use std::{path::PathBuf, time::Duration};

    #[test]
    fn cli_flags_override_defaults() {
        let args = Args::parse_from([
            "video-ingest",
            "--port",
            "9000",
            "--max-upload-bytes",
            "1024",
            "--store-backend",
            "s3",
            "--bucket",
            "tubely",
            "--tmp-dir",
            "/var/tmp/ingest",
        ]);
        let cfg = AppConfig::merge(args).unwrap();

        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.max_upload_bytes, 1024);
        assert_eq!(cfg.store_backend, StoreBackend::S3);
        assert_eq!(cfg.addr(), format!("{}:9000", cfg.host));

        let pipeline = cfg.pipeline_config();
        assert_eq!(pipeline.bucket, "tubely");
        assert_eq!(pipeline.tmp_dir, PathBuf::from("/var/tmp/ingest"));
        assert_eq!(pipeline.max_upload_bytes, 1024);
    }

    #[test]
    fn tool_and_store_flags_override_env() {
        let args = Args::parse_from([
            "video-ingest",
            "--accepted-content-type",
            "video/quicktime",
            "--s3-region",
            "eu-west-1",
            "--s3-endpoint",
            "http://localhost:9000",
            "--ffmpeg-path",
            "/opt/ffmpeg/bin/ffmpeg",
            "--ffprobe-path",
            "/opt/ffmpeg/bin/ffprobe",
            "--process-timeout-secs",
            "30",
        ]);
        let cfg = AppConfig::merge(args).unwrap();

        assert_eq!(cfg.accepted_content_type, "video/quicktime");
        assert_eq!(cfg.pipeline_config().accepted_content_type, "video/quicktime");
        assert_eq!(cfg.s3_region, "eu-west-1");
        assert_eq!(cfg.s3_endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(cfg.ffprobe_path, "/opt/ffmpeg/bin/ffprobe");
        assert_eq!(cfg.process_timeout, Duration::from_secs(30));
    }

    #[test]
    fn zero_upload_limit_is_rejected() {
        let args = Args::parse_from(["video-ingest", "--max-upload-bytes", "0"]);
        assert!(AppConfig::merge(args).is_err());
    }

    #[test]
    fn store_backend_parsing() {
        assert_eq!("FILE".parse::<StoreBackend>().unwrap(), StoreBackend::File);
        assert!("gcs".parse::<StoreBackend>().is_err());
    }
}
