//! Ingestion pipeline stages and their collaborators.

pub mod keys;
pub mod normalizer;
pub mod pipeline;
pub mod process;
pub mod prober;
pub mod stager;
pub mod store;
pub mod tmp_file;
pub mod video_repo;
