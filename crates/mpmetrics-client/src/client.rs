//! Process-facing metrics client.
//!
//! One `MetricsClient` per process: it owns the shared directory settings,
//! builds the registry on first use, and hands out metric constructors bound
//! to its namespace.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use prometheus::{CounterVec, GaugeVec, HistogramVec};

use mpmetrics_core::error::Result;

use crate::config::MetricsConfig;
use crate::exposition::{self, CONTENT_TYPE_LATEST};
use crate::factory::{MetricFactory, MetricOpts, SummaryVec};
use crate::multiproc::{GaugeMode, SharedStateDirectory};
use crate::ops::{self, ScrapeServer};
use crate::registry::MultiprocRegistry;

pub struct MetricsClient {
    namespace: String,
    dir: SharedStateDirectory,
    gauge_mode: GaugeMode,
    flush_interval: Duration,
    pid: u32,
    registry: OnceLock<Arc<MultiprocRegistry>>,
}

impl MetricsClient {
    /// Validate `cfg`, reset the shared directory (under the configured lock)
    /// and return a client for this process.
    ///
    /// Call once per deployment, before workers start writing shards. Workers
    /// joining an already prepared directory use [`MetricsClient::attach`].
    pub fn new(cfg: &MetricsConfig) -> Result<Self> {
        let client = Self::attach(cfg)?;
        let lock = cfg.lock_file();
        client.dir.setup(lock.as_ref())?;
        Ok(client)
    }

    /// Like [`MetricsClient::new`] but leaves the directory contents alone.
    pub fn attach(cfg: &MetricsConfig) -> Result<Self> {
        cfg.validate()?;
        let dir = match (&cfg.multiproc_dir, cfg.multiproc) {
            (Some(path), true) => SharedStateDirectory::new(path, true),
            _ => SharedStateDirectory::disabled(),
        };
        Ok(Self {
            namespace: cfg.namespace.clone(),
            dir,
            gauge_mode: cfg.gauge_mode,
            flush_interval: cfg.flush_interval(),
            pid: std::process::id(),
            registry: OnceLock::new(),
        })
    }

    /// Name this process's shards after `pid` instead of the OS pid.
    ///
    /// Only meaningful before the registry is first used.
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn directory(&self) -> &SharedStateDirectory {
        &self.dir
    }

    /// The process registry, built on first access.
    pub fn registry(&self) -> &Arc<MultiprocRegistry> {
        self.registry.get_or_init(|| {
            let registry = if self.dir.is_multiproc() {
                MultiprocRegistry::multiproc(self.dir.path(), self.gauge_mode)
            } else {
                MultiprocRegistry::local_only()
            };
            tracing::debug!(
                multiproc = self.dir.is_multiproc(),
                pid = self.pid,
                "metrics registry initialized"
            );
            Arc::new(registry.with_pid(self.pid))
        })
    }

    pub fn factory(&self) -> MetricFactory {
        MetricFactory::new(self.namespace.clone(), Arc::clone(self.registry()))
    }

    pub fn counter(&self, opts: MetricOpts) -> Result<CounterVec> {
        self.factory().counter(opts)
    }

    pub fn gauge(&self, opts: MetricOpts) -> Result<GaugeVec> {
        self.factory().gauge(opts)
    }

    pub fn histogram(&self, opts: MetricOpts) -> Result<HistogramVec> {
        self.factory().histogram(opts)
    }

    pub fn summary(&self, opts: MetricOpts) -> Result<SummaryVec> {
        self.factory().summary(opts)
    }

    /// Persist this process's values so other processes' scrapes see them.
    pub fn flush(&self) -> Result<()> {
        self.registry().flush()
    }

    /// Flush every `flush_interval_ms` on the current tokio runtime.
    pub fn spawn_flush_task(&self) -> tokio::task::JoinHandle<()> {
        self.registry().spawn_flush_task(self.flush_interval)
    }

    pub fn generate_latest(&self) -> Result<Bytes> {
        exposition::generate_latest(self.registry())
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE_LATEST
    }

    /// Drop the live-state shards of a reaped worker.
    pub fn mark_process_dead(&self, pid: u32) -> Result<()> {
        self.dir.mark_process_dead(pid)
    }

    pub async fn start_http_server(&self, port: u16, addr: &str) -> Result<ScrapeServer> {
        ops::start_http_server(Arc::clone(self.registry()), port, addr).await
    }
}
