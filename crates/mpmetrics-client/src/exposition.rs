//! Text exposition of a registry.

use bytes::Bytes;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, TextEncoder};

use mpmetrics_core::error::{MetricsError, Result};

use crate::registry::MultiprocRegistry;

/// Content type of [`generate_latest`] output.
pub const CONTENT_TYPE_LATEST: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Encode a fresh gather of `registry`.
pub fn generate_latest(registry: &MultiprocRegistry) -> Result<Bytes> {
    encode(&registry.gather())
}

/// Encode metric families in the Prometheus text format.
///
/// Families without series are dropped; the encoder rejects them.
pub fn encode(families: &[MetricFamily]) -> Result<Bytes> {
    let families: Vec<MetricFamily> = families
        .iter()
        .filter(|mf| !mf.get_metric().is_empty())
        .cloned()
        .collect();

    let mut buf = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buf)
        .map_err(|e| {
            tracing::error!(error = %e, family_count = families.len(), "text encoder failed");
            MetricsError::Encode(e.to_string())
        })?;
    Ok(Bytes::from(buf))
}
