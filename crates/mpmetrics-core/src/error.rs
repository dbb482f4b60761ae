//! Shared error type across mpmetrics crates.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Stable error categories (safe to log, match on, or expose).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid setup input.
    Configuration,
    /// Scrape endpoint could not bind.
    Bind,
    /// Incompatible metric registration.
    DuplicateMetric,
    /// Unsupported input types given to the normalizer.
    TypeMismatch,
    /// Setup lock could not be acquired in time.
    LockTimeout,
    /// Filesystem failure.
    Io,
    /// Unreadable shard file.
    Shard,
    /// Exposition encoding failure.
    Encode,
}

impl ErrorKind {
    /// String representation used in logs and JSON bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Configuration => "CONFIGURATION",
            ErrorKind::Bind => "BIND",
            ErrorKind::DuplicateMetric => "DUPLICATE_METRIC",
            ErrorKind::TypeMismatch => "TYPE_MISMATCH",
            ErrorKind::LockTimeout => "LOCK_TIMEOUT",
            ErrorKind::Io => "IO",
            ErrorKind::Shard => "SHARD",
            ErrorKind::Encode => "ENCODE",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Unified error type used by core and client.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to bind scrape endpoint {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("duplicate metric {name}: {reason}")]
    DuplicateMetric { name: String, reason: String },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("timed out after {waited_ms}ms waiting for lock {}", path.display())]
    LockTimeout { path: PathBuf, waited_ms: u64 },
    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid shard {}: {reason}", path.display())]
    Shard { path: PathBuf, reason: String },
    #[error("encode failed: {0}")]
    Encode(String),
}

impl MetricsError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        MetricsError::Io {
            path: path.into(),
            source,
        }
    }

    /// Map an error to its stable category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetricsError::Configuration(_) => ErrorKind::Configuration,
            MetricsError::Bind { .. } => ErrorKind::Bind,
            MetricsError::DuplicateMetric { .. } => ErrorKind::DuplicateMetric,
            MetricsError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            MetricsError::LockTimeout { .. } => ErrorKind::LockTimeout,
            MetricsError::Io { .. } => ErrorKind::Io,
            MetricsError::Shard { .. } => ErrorKind::Shard,
            MetricsError::Encode(_) => ErrorKind::Encode,
        }
    }
}
