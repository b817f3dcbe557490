//! Scoped temporary files.
//!
//! A `TmpFile` owns a path on local disk and removes it when dropped, so every
//! exit path of the pipeline (early return, `?`, panic unwinding, or the whole
//! request future being dropped) releases the disk it used.

use std::{
    io,
    ops::Deref,
    path::{Path, PathBuf},
};
use tracing::debug;
use uuid::Uuid;

#[must_use]
#[derive(Debug)]
pub struct TmpFile {
    path: PathBuf,
    armed: bool,
}

impl TmpFile {
    /// Reserve a fresh random path inside `dir`. Nothing is created on disk.
    pub fn in_dir(dir: &Path, ext: &str) -> Self {
        Self::at(dir.join(format!("{}{}", Uuid::new_v4(), ext)))
    }

    /// Take ownership of `path`; it will be removed on drop.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// A sibling path with `suffix` appended to the full file name.
    pub fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Remove the file now. Missing files are not an error.
    pub async fn cleanup(mut self) -> io::Result<()> {
        self.armed = false;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("removed tmp file {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl AsRef<Path> for TmpFile {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

impl Deref for TmpFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.path
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
