//! Per-process shard files.
//!
//! Each registry owns `<kind>_<pid>_<instance>.json` for every metric kind
//! it has observed; `instance` tells apart registries living in the same
//! process. A shard is a full snapshot of that registry's series of one kind,
//! replaced atomically (unique temp file + rename) so readers never see
//! partial JSON.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use prometheus::proto::{MetricFamily, MetricType};
use serde::{Deserialize, Serialize};

use mpmetrics_core::error::{MetricsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Histogram,
        MetricKind::Summary,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }

    pub fn from_proto(t: MetricType) -> Option<Self> {
        match t {
            MetricType::COUNTER => Some(MetricKind::Counter),
            MetricType::GAUGE => Some(MetricKind::Gauge),
            MetricType::HISTOGRAM => Some(MetricKind::Histogram),
            MetricType::SUMMARY => Some(MetricKind::Summary),
            MetricType::UNTYPED => None,
        }
    }

    pub fn proto(self) -> MetricType {
        match self {
            MetricKind::Counter => MetricType::COUNTER,
            MetricKind::Gauge => MetricType::GAUGE,
            MetricKind::Histogram => MetricType::HISTOGRAM,
            MetricKind::Summary => MetricType::SUMMARY,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        MetricKind::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

pub fn file_name(kind: MetricKind, pid: u32, instance: u32) -> String {
    format!("{}_{pid}_{instance}.json", kind.as_str())
}

/// Inverse of [`file_name`], returning `(kind, pid)`; anything else in the
/// directory is ignored.
pub fn parse_file_name(name: &str) -> Option<(MetricKind, u32)> {
    let stem = name.strip_suffix(".json")?;
    let mut parts = stem.split('_');
    let kind = MetricKind::parse(parts.next()?)?;
    let pid = parts.next()?.parse().ok()?;
    let _instance: u32 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((kind, pid))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shard {
    pub pid: u32,
    #[serde(default)]
    pub instance: u32,
    pub written_at_ms: u64,
    pub families: Vec<ShardFamily>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardFamily {
    pub name: String,
    pub help: String,
    pub samples: Vec<ShardSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardSample {
    /// Label pairs sorted by label name.
    pub labels: Vec<(String, String)>,
    pub value: SampleValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SampleValue {
    Counter { value: f64 },
    Gauge { value: f64 },
    Histogram {
        /// `(upper_bound, cumulative_count)`, +Inf excluded.
        buckets: Vec<(f64, u64)>,
        sum: f64,
        count: u64,
    },
    Summary { sum: f64, count: u64 },
}

impl Shard {
    /// Snapshot the families of one kind out of a local gather.
    pub fn from_families(
        pid: u32,
        instance: u32,
        kind: MetricKind,
        families: &[MetricFamily],
    ) -> Self {
        let families = families
            .iter()
            .filter(|mf| MetricKind::from_proto(mf.get_field_type()) == Some(kind))
            .map(|mf| ShardFamily {
                name: mf.get_name().to_string(),
                help: mf.get_help().to_string(),
                samples: mf
                    .get_metric()
                    .iter()
                    .map(|m| {
                        let mut labels: Vec<(String, String)> = m
                            .get_label()
                            .iter()
                            .map(|lp| (lp.get_name().to_string(), lp.get_value().to_string()))
                            .collect();
                        labels.sort();
                        let value = match kind {
                            MetricKind::Counter => SampleValue::Counter {
                                value: m.get_counter().get_value(),
                            },
                            MetricKind::Gauge => SampleValue::Gauge {
                                value: m.get_gauge().get_value(),
                            },
                            MetricKind::Histogram => {
                                let h = m.get_histogram();
                                SampleValue::Histogram {
                                    buckets: h
                                        .get_bucket()
                                        .iter()
                                        .filter(|b| b.get_upper_bound().is_finite())
                                        .map(|b| (b.get_upper_bound(), b.get_cumulative_count()))
                                        .collect(),
                                    sum: h.get_sample_sum(),
                                    count: h.get_sample_count(),
                                }
                            }
                            MetricKind::Summary => {
                                let s = m.get_summary();
                                SampleValue::Summary {
                                    sum: s.get_sample_sum(),
                                    count: s.get_sample_count(),
                                }
                            }
                        };
                        ShardSample { labels, value }
                    })
                    .collect(),
            })
            .collect();

        Self {
            pid,
            instance,
            written_at_ms: now_ms(),
            families,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.families.iter().all(|f| f.samples.is_empty())
    }

    /// Replace `<dir>/<kind>_<pid>_<instance>.json` with this snapshot.
    ///
    /// Every call writes its own temp file, so concurrent writers never
    /// share a partially written file; the last rename wins.
    pub fn write(&self, dir: &Path, kind: MetricKind) -> Result<PathBuf> {
        let path = dir.join(file_name(kind, self.pid, self.instance));

        let body = serde_json::to_vec(self).map_err(|e| MetricsError::Shard {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| MetricsError::io(dir, e))?;
        tmp.write_all(&body)
            .map_err(|e| MetricsError::io(tmp.path(), e))?;
        tmp.persist(&path)
            .map_err(|e| MetricsError::io(&path, e.error))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let body = fs::read(path).map_err(|e| MetricsError::io(path, e))?;
        serde_json::from_slice(&body).map_err(|e| MetricsError::Shard {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
