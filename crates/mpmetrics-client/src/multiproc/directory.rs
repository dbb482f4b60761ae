//! The on-disk directory worker processes write their shards into.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use mpmetrics_core::error::{MetricsError, Result};

use super::lock::LockFile;
use super::shard::{self, MetricKind};

#[derive(Debug, Clone)]
pub struct SharedStateDirectory {
    path: PathBuf,
    multiproc: bool,
}

impl SharedStateDirectory {
    pub fn new(path: impl Into<PathBuf>, multiproc: bool) -> Self {
        Self {
            path: path.into(),
            multiproc,
        }
    }

    /// Directory for a process that keeps its metrics in memory only.
    pub fn disabled() -> Self {
        Self::new(PathBuf::new(), false)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_multiproc(&self) -> bool {
        self.multiproc
    }

    /// Wipe and recreate the directory. Run once at startup, before any
    /// process writes shards.
    ///
    /// When `lock` is given it is held for the whole wipe + recreate and is
    /// released on every exit path.
    pub fn setup(&self, lock: Option<&LockFile>) -> Result<()> {
        if !self.multiproc {
            return Ok(());
        }
        if self.path.as_os_str().is_empty() {
            return Err(MetricsError::Configuration(
                "multiproc_dir must be provided when multiproc is enabled".into(),
            ));
        }

        let _guard = lock.map(LockFile::acquire).transpose()?;
        tracing::debug!(dir = %self.path.display(), "resetting multiprocess metrics directory");

        match fs::remove_dir_all(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(MetricsError::io(&self.path, e)),
        }
        fs::create_dir_all(&self.path).map_err(|e| MetricsError::io(&self.path, e))?;

        tracing::info!(dir = %self.path.display(), "multiprocess metrics directory ready");
        Ok(())
    }

    /// Discard the shards of a reaped process that describe live state.
    ///
    /// Gauges of a dead worker are meaningless and are removed, for every
    /// registry that process ran. Counter, histogram and summary shards stay
    /// so cumulative totals never go backwards. Unknown pids are a no-op.
    pub fn mark_process_dead(&self, pid: u32) -> Result<()> {
        if !self.multiproc {
            return Ok(());
        }
        for (kind, shard_pid, path) in self.shard_files()? {
            if kind != MetricKind::Gauge || shard_pid != pid {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(pid, shard = %path.display(), "removed shard of dead process");
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(MetricsError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Every shard currently in the directory, sorted by file name.
    ///
    /// A missing directory (e.g. mid-reset) yields no shards.
    pub fn shard_files(&self) -> Result<Vec<(MetricKind, u32, PathBuf)>> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MetricsError::io(&self.path, e)),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(MetricsError::io(&self.path, e)),
            };
            let name = entry.file_name();
            if let Some((kind, pid)) = name.to_str().and_then(shard::parse_file_name) {
                out.push((kind, pid, entry.path()));
            }
        }
        out.sort_by(|a, b| a.2.cmp(&b.2));
        Ok(out)
    }
}
