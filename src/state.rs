use crate::services::pipeline::Pipeline;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,

    /// Pool backing the metadata repository, used by readiness checks.
    pub db: Arc<SqlitePool>,
}
