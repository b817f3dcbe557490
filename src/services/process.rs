//! Shared runner for external media tools.
//!
//! Children are spawned with `kill_on_drop`, so dropping the future that awaits
//! them (request aborted, caller timeout) also kills the process.

use std::{
    ffi::OsStr,
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("required command {0} not found, make sure it is on $PATH")]
    NotFound(String),

    #[error("cannot run command {0} due to invalid permissions on the binary")]
    PermissionDenied(String),

    #[error("{0} timed out")]
    Timeout(String),

    #[error("{command} failed with {status}: {stderr}")]
    Status {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("unknown process error running {0}")]
    Other(String, #[source] std::io::Error),
}

/// Run `command` to completion and return its stdout.
pub async fn run<T>(command: &str, args: &[T], timeout: Duration) -> Result<Vec<u8>, ProcessError>
where
    T: AsRef<OsStr>,
{
    let start = Instant::now();
    let child = Command::new(command)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => ProcessError::NotFound(command.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                ProcessError::PermissionDenied(command.to_string())
            }
            _ => ProcessError::Other(command.to_string(), err),
        })?;

    // On timeout the child is dropped here and killed.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProcessError::Timeout(command.to_string()))?
        .map_err(|err| ProcessError::Other(command.to_string(), err))?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    if output.status.success() {
        debug!(command, elapsed_ms, "process completed");
        Ok(output.stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        warn!(command, elapsed_ms, status = %output.status, %stderr, "process failed");
        Err(ProcessError::Status {
            command: command.to_string(),
            status: output.status,
            stderr,
        })
    }
}
