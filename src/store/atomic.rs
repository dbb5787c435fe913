//! Atomic file persistence
//!
//! Every persisted artifact is written with write-temp-then-rename in the
//! destination directory, so readers either see the old file or the new
//! one, never a torn write. The advisory lock is a create-new lock file;
//! it guards cross-process writers of the genre cache and the catalog.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::{Error, Result};

/// Write `bytes` to `path` atomically.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let dir = match dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            dir
        }
        None => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// How long a lock file may sit on disk before it is considered left
/// behind by a crashed process.
const STALE_LOCK_AGE: Duration = Duration::from_secs(300);
const ACQUIRE_POLL: Duration = Duration::from_millis(100);

/// Advisory file lock; released on drop.
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock at `<target>.lock`, polling until `timeout`.
    ///
    /// Locks older than the staleness bound are broken; the previous
    /// holder either crashed or lost its host.
    pub async fn acquire(target: &Path, timeout: Duration) -> Result<FileLock> {
        let path = lock_path(target);
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(_) => return Ok(FileLock { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if lock_is_stale(&path) {
                        warn!(lock = %path.display(), "breaking stale lock");
                        let _ = std::fs::remove_file(&path);
                        continue;
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(Error::Io(std::io::Error::new(
                            std::io::ErrorKind::WouldBlock,
                            format!("lock busy: {}", path.display()),
                        )));
                    }
                    tokio::time::sleep(ACQUIRE_POLL).await;
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "state".into());
    name.push(".lock");
    target.with_file_name(name)
}

fn lock_is_stale(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.elapsed().ok())
        .map(|age| age > STALE_LOCK_AGE)
        .unwrap_or(false)
}
