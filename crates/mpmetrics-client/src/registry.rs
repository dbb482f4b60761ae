//! Process-local collector registry with optional multiprocess merge.
//!
//! Every metric handle lives in the local `prometheus::Registry`. In
//! multiprocess mode the local state is flushed to this process's shards and
//! a scrape merges all shards in the shared directory; otherwise a scrape is
//! a plain local gather.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::proto::MetricFamily;
use prometheus::{CounterVec, GaugeVec, HistogramVec, Registry};

use mpmetrics_core::error::{MetricsError, Result};

use crate::factory::SummaryVec;
use crate::multiproc::shard::Shard;
use crate::multiproc::{GaugeMode, MetricKind, MultiProcessCollector, SharedStateDirectory};

/// Handle kept for every registered name.
#[derive(Clone)]
pub enum MetricHandle {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl MetricHandle {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricHandle::Counter(_) => MetricKind::Counter,
            MetricHandle::Gauge(_) => MetricKind::Gauge,
            MetricHandle::Histogram(_) => MetricKind::Histogram,
            MetricHandle::Summary(_) => MetricKind::Summary,
        }
    }

    fn collector(&self) -> Box<dyn prometheus::core::Collector> {
        match self {
            MetricHandle::Counter(m) => Box::new(m.clone()),
            MetricHandle::Gauge(m) => Box::new(m.clone()),
            MetricHandle::Histogram(m) => Box::new(m.clone()),
            MetricHandle::Summary(m) => Box::new(m.clone()),
        }
    }
}

/// What a name was registered with; a second registration must match it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSignature {
    pub kind: MetricKind,
    pub label_names: Vec<String>,
    pub buckets: Option<Vec<f64>>,
}

// Distinguishes registries of one process in shard file names.
static NEXT_INSTANCE: AtomicU32 = AtomicU32::new(0);

struct Registered {
    signature: MetricSignature,
    handle: MetricHandle,
}

pub struct MultiprocRegistry {
    local: Registry,
    pid: u32,
    instance: u32,
    merge: Option<(SharedStateDirectory, MultiProcessCollector)>,
    metrics: DashMap<String, Registered>,
    flush_lock: Mutex<()>,
}

impl MultiprocRegistry {
    /// Registry whose scrapes only see this process.
    pub fn local_only() -> Self {
        Self {
            local: Registry::new(),
            pid: std::process::id(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            merge: None,
            metrics: DashMap::new(),
            flush_lock: Mutex::new(()),
        }
    }

    /// Registry that shards into `dir` and merges every shard on scrape.
    pub fn multiproc(dir: impl Into<PathBuf>, gauge_mode: GaugeMode) -> Self {
        let dir = SharedStateDirectory::new(dir, true);
        let collector = MultiProcessCollector::new(dir.clone(), gauge_mode);
        Self {
            merge: Some((dir, collector)),
            ..Self::local_only()
        }
    }

    /// Override the pid used to name this process's shards.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Process-unique number of this registry; part of its shard file names.
    pub fn instance(&self) -> u32 {
        self.instance
    }

    pub fn is_multiproc(&self) -> bool {
        self.merge.is_some()
    }

    pub fn local(&self) -> &Registry {
        &self.local
    }

    /// Return the existing handle for `fq_name`, or build and register one.
    ///
    /// A name already registered with a different signature fails with
    /// `DuplicateMetric`.
    pub fn get_or_register(
        &self,
        fq_name: &str,
        signature: MetricSignature,
        build: impl FnOnce() -> Result<MetricHandle>,
    ) -> Result<MetricHandle> {
        match self.metrics.entry(fq_name.to_string()) {
            Entry::Occupied(e) => {
                let existing = &e.get().signature;
                if *existing == signature {
                    return Ok(e.get().handle.clone());
                }
                Err(MetricsError::DuplicateMetric {
                    name: fq_name.to_string(),
                    reason: format!(
                        "already registered as {} with labels {:?}",
                        existing.kind.as_str(),
                        existing.label_names
                    ),
                })
            }
            Entry::Vacant(v) => {
                let handle = build()?;
                self.local
                    .register(handle.collector())
                    .map_err(|e| MetricsError::DuplicateMetric {
                        name: fq_name.to_string(),
                        reason: e.to_string(),
                    })?;
                tracing::debug!(metric = fq_name, kind = signature.kind.as_str(), "metric registered");
                v.insert(Registered {
                    signature,
                    handle: handle.clone(),
                });
                Ok(handle)
            }
        }
    }

    /// Write this registry's current values to its shard files.
    ///
    /// Concurrent flushes are serialized so a later snapshot is never
    /// overwritten by an earlier one.
    pub fn flush(&self) -> Result<()> {
        let Some((dir, _)) = &self.merge else {
            return Ok(());
        };
        let _flushing = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let families = self.local.gather();
        for kind in MetricKind::ALL {
            let shard = Shard::from_families(self.pid, self.instance, kind, &families);
            if shard.is_empty() {
                continue;
            }
            shard.write(dir.path(), kind)?;
        }
        Ok(())
    }

    /// Current view: the merge over all shards in multiprocess mode, the
    /// local registry otherwise. Computed fresh on every call.
    pub fn gather(&self) -> Vec<MetricFamily> {
        match &self.merge {
            Some((dir, collector)) => {
                if let Err(e) = self.flush() {
                    tracing::warn!(dir = %dir.path().display(), error = %e, "failed to flush own shards before merge");
                }
                collector.collect()
            }
            None => self.local.gather(),
        }
    }

    /// Flush on a fixed cadence so other processes' scrapes see our writes.
    pub fn spawn_flush_task(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = registry.flush() {
                    tracing::warn!(error = %e, "periodic shard flush failed");
                }
            }
        })
    }
}
