use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use mpmetrics_core::error::{MetricsError, Result};

use crate::multiproc::{GaugeMode, LockFile};

/// Conventional multiprocess directory variable; honored by
/// [`MetricsConfig::from_env`].
pub const MULTIPROC_DIR_ENV: &str = "PROMETHEUS_MULTIPROC_DIR";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MpMetricsConfig {
    pub version: u32,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub exporter: ExporterSection,
}

impl MpMetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(MetricsError::Configuration(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.metrics.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub namespace: String,

    #[serde(default = "default_multiproc")]
    pub multiproc: bool,

    #[serde(default)]
    pub multiproc_dir: Option<PathBuf>,

    #[serde(default)]
    pub gauge_mode: GaugeMode,

    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    #[serde(default)]
    pub lock: Option<LockSection>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            multiproc: default_multiproc(),
            multiproc_dir: None,
            gauge_mode: GaugeMode::default(),
            flush_interval_ms: default_flush_interval_ms(),
            lock: None,
        }
    }
}

impl MetricsConfig {
    /// In-process only; nothing touches the filesystem.
    pub fn local(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            multiproc: false,
            ..Self::default()
        }
    }

    pub fn multiproc(namespace: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            namespace: namespace.into(),
            multiproc: true,
            multiproc_dir: Some(dir.into()),
            ..Self::default()
        }
    }

    /// Multiprocess when `PROMETHEUS_MULTIPROC_DIR` is set, local otherwise.
    pub fn from_env(namespace: impl Into<String>) -> Self {
        match std::env::var_os(MULTIPROC_DIR_ENV) {
            Some(dir) if !dir.is_empty() => Self::multiproc(namespace, PathBuf::from(dir)),
            _ => Self::local(namespace),
        }
    }

    pub fn with_gauge_mode(mut self, mode: GaugeMode) -> Self {
        self.gauge_mode = mode;
        self
    }

    pub fn with_lock(mut self, lock: LockSection) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.multiproc {
            match &self.multiproc_dir {
                Some(dir) if !dir.as_os_str().is_empty() => {}
                _ => {
                    return Err(MetricsError::Configuration(
                        "metrics.multiproc_dir must be provided when multiproc is enabled".into(),
                    ))
                }
            }
        }
        if !(10..=600_000).contains(&self.flush_interval_ms) {
            return Err(MetricsError::Configuration(
                "metrics.flush_interval_ms must be between 10 and 600000".into(),
            ));
        }
        if let Some(lock) = &self.lock {
            lock.validate()?;
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Setup lock, if configured. Defaults its path to `<multiproc_dir>.lock`.
    pub fn lock_file(&self) -> Option<LockFile> {
        let lock = self.lock.as_ref()?;
        let path = match (&lock.path, &self.multiproc_dir) {
            (Some(p), _) => p.clone(),
            (None, Some(dir)) => {
                let mut p = dir.clone().into_os_string();
                p.push(".lock");
                PathBuf::from(p)
            }
            (None, None) => return None,
        };
        Some(LockFile::new(
            path,
            Duration::from_millis(lock.timeout_ms),
            Duration::from_millis(lock.stale_after_ms),
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LockSection {
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_lock_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_stale_after_ms")]
    pub stale_after_ms: u64,
}

impl Default for LockSection {
    fn default() -> Self {
        Self {
            path: None,
            timeout_ms: default_lock_timeout_ms(),
            stale_after_ms: default_stale_after_ms(),
        }
    }
}

impl LockSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=300_000).contains(&self.timeout_ms) {
            return Err(MetricsError::Configuration(
                "metrics.lock.timeout_ms must be between 1 and 300000".into(),
            ));
        }
        if self.stale_after_ms <= self.timeout_ms {
            return Err(MetricsError::Configuration(
                "metrics.lock.stale_after_ms must be greater than timeout_ms".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterSection {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Empty means every interface.
    #[serde(default)]
    pub addr: String,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            addr: String::new(),
        }
    }
}

fn default_multiproc() -> bool {
    true
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_lock_timeout_ms() -> u64 {
    10_000
}
fn default_stale_after_ms() -> u64 {
    60_000
}
fn default_port() -> u16 {
    9464
}
