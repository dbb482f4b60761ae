//! Metrics config loader (strict parsing).

pub mod schema;

use std::fs;

use mpmetrics_core::error::{MetricsError, Result};

pub use schema::{ExporterSection, LockSection, MetricsConfig, MpMetricsConfig};

pub fn load_from_file(path: &str) -> Result<MpMetricsConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| MetricsError::Configuration(format!("read config {path} failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<MpMetricsConfig> {
    let cfg: MpMetricsConfig = serde_yaml::from_str(s)
        .map_err(|e| MetricsError::Configuration(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
