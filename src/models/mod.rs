//! Core data models for the video ingestion service.
//!
//! `VideoRecord` maps to the `videos` table via `sqlx::FromRow`; the rest are
//! values that flow between pipeline stages.

pub mod aspect;
pub mod object;
pub mod upload;
pub mod video;
