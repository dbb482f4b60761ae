//! Cross-process setup lock backed by an exclusively created file.
//!
//! Worker processes racing through startup serialize the directory reset by
//! creating `<path>` with `create_new`. Waiting is bounded: the lock polls with
//! exponential backoff and fails with `LockTimeout` once the deadline passes.
//!
//! The file holds an owner token unique to one acquisition. A lock file older
//! than `stale_after` is assumed to belong to a crashed process: a waiter
//! moves it aside with a rename, so only one waiter can break a given stale
//! lock, and a guard only deletes the file while it still holds its token.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use mpmetrics_core::error::{MetricsError, Result};

const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(100);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    timeout: Duration,
    stale_after: Duration,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>, timeout: Duration, stale_after: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
            stale_after,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until the lock is held or the timeout elapses.
    pub fn acquire(&self) -> Result<LockGuard<'_>> {
        let started = Instant::now();
        let mut backoff = MIN_BACKOFF;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&self.path) {
                Ok(mut f) => {
                    let token = owner_token();
                    if let Err(e) = f.write_all(token.as_bytes()) {
                        let _ = fs::remove_file(&self.path);
                        return Err(MetricsError::io(&self.path, e));
                    }
                    tracing::debug!(lock = %self.path.display(), "setup lock acquired");
                    return Ok(LockGuard { lock: self, token });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if is_stale(&self.path, self.stale_after) {
                        self.break_stale()?;
                        continue;
                    }
                }
                Err(e) => return Err(MetricsError::io(&self.path, e)),
            }

            let waited = started.elapsed();
            if waited >= self.timeout {
                return Err(MetricsError::LockTimeout {
                    path: self.path.clone(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            thread::sleep(backoff.min(self.timeout - waited));
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Move the lock file aside and discard it if it is still stale.
    ///
    /// A lost rename race means another waiter already broke it. A moved
    /// file that turns out fresh was created after our staleness check and
    /// is linked back into place for its owner.
    fn break_stale(&self) -> Result<()> {
        let mut aside = self.path.clone().into_os_string();
        aside.push(format!(".{}.stale", owner_token()));
        let aside = PathBuf::from(aside);

        match fs::rename(&self.path, &aside) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(MetricsError::io(&self.path, e)),
        }

        if is_stale(&aside, self.stale_after) {
            tracing::warn!(lock = %self.path.display(), "removed stale setup lock");
        } else if let Err(e) = fs::hard_link(&aside, &self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to restore live setup lock");
        }
        match fs::remove_file(&aside) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MetricsError::io(aside, e)),
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let modified = match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(t) => t,
        Err(_) => return false,
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age >= stale_after)
        .unwrap_or(false)
}

/// `<pid>-<nanos>-<seq>`, unique per call across threads and processes.
fn owner_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let seq = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos}-{seq}", std::process::id())
}

/// Releases the lock on drop, on success and error paths alike.
#[derive(Debug)]
pub struct LockGuard<'a> {
    lock: &'a LockFile,
    token: String,
}

impl LockGuard<'_> {
    /// Token written into the lock file by this acquisition.
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let path = &self.lock.path;
        match fs::read_to_string(path) {
            Ok(owner) if owner == self.token => {}
            _ => {
                tracing::warn!(lock = %path.display(), "setup lock was taken over; leaving it in place");
                return;
            }
        }
        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(lock = %path.display(), error = %e, "failed to release setup lock");
        } else {
            tracing::debug!(lock = %path.display(), "setup lock released");
        }
    }
}
