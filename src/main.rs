use anyhow::{Context, Result};
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use config::{AppConfig, StoreBackend};
use services::{
    normalizer::FfmpegRewriter,
    pipeline::Pipeline,
    prober::FfprobeInspector,
    store::{ContentStore, FileStore, S3Store},
    video_repo::{self, SqliteVideoRepository},
};
use state::AppState;

const MIGRATION_PATH: &str = "migrations/0001_init.sql";

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting video-ingest with config: {:?}", cfg);

    // --- Ensure local directories exist ---
    ensure_dir(&cfg.tmp_dir)?;
    if cfg.store_backend == StoreBackend::File {
        ensure_dir(&cfg.store_dir)?;
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if !db_path.contains(":memory:") {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                ensure_dir(parent)?;
            }
        }

        // SQLx will not create a missing database file on its own
        if let Err(e) = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(db_path)
        {
            tracing::warn!("Failed to open database file manually: {}", e);
        }
    }

    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .with_context(|| format!("connecting to {}", db_url))?,
    );

    // --- Handle migration mode ---
    if migrate {
        let sql = fs::read_to_string(MIGRATION_PATH)
            .with_context(|| format!("reading migration file {}", MIGRATION_PATH))?;
        let count = video_repo::run_migrations(&db, &sql).await?;
        tracing::info!("Database migration complete ({} statements).", count);
        return Ok(());
    }

    // --- Initialize pipeline collaborators ---
    let store: Arc<dyn ContentStore> = match cfg.store_backend {
        StoreBackend::File => Arc::new(FileStore::new(cfg.store_dir.clone())),
        StoreBackend::S3 => Arc::new(S3Store::new(
            &cfg.bucket,
            &cfg.s3_region,
            cfg.s3_endpoint.as_deref(),
        )?),
    };
    let pipeline = Pipeline::new(
        cfg.pipeline_config(),
        Arc::new(FfmpegRewriter::new(&cfg.ffmpeg_path, cfg.process_timeout)),
        Arc::new(FfprobeInspector::new(&cfg.ffprobe_path, cfg.process_timeout)),
        store,
        Arc::new(SqliteVideoRepository::new(db.clone())),
    );

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(AppState { pipeline, db });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("creating directory {}", path.display()))?;
        tracing::info!("Created directory {}", path.display());
    }
    Ok(())
}
