//! Metric factory bound to one namespace and one registry.
//!
//! Every constructor prefixes the name with the factory namespace and
//! registers into the shared [`MultiprocRegistry`]. Histograms default to
//! [`mpmetrics_core::CUSTOM_BUCKETS`] unless the caller passes explicit buckets.

pub mod summary;

use std::sync::Arc;

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts};

use mpmetrics_core::buckets::custom_buckets;
use mpmetrics_core::error::{MetricsError, Result};

use crate::multiproc::MetricKind;
use crate::registry::{MetricHandle, MetricSignature, MultiprocRegistry};

pub use summary::{Summary, SummaryVec};

/// Creation parameters passed through to the metric constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricOpts {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    /// Histogram only; `None` means the factory default.
    pub buckets: Option<Vec<f64>>,
}

impl MetricOpts {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            label_names: Vec::new(),
            buckets: None,
        }
    }

    pub fn labels(mut self, names: &[&str]) -> Self {
        self.label_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }
}

#[derive(Clone)]
pub struct MetricFactory {
    namespace: String,
    registry: Arc<MultiprocRegistry>,
}

impl MetricFactory {
    pub fn new(namespace: impl Into<String>, registry: Arc<MultiprocRegistry>) -> Self {
        Self {
            namespace: namespace.into(),
            registry,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn registry(&self) -> &Arc<MultiprocRegistry> {
        &self.registry
    }

    /// `<namespace>_<name>`, or `name` when the namespace is empty.
    pub fn fq_name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}_{}", self.namespace, name)
        }
    }

    pub fn counter(&self, opts: MetricOpts) -> Result<CounterVec> {
        let handle = self.register(MetricKind::Counter, &opts, None, || {
            let labels = label_refs(&opts.label_names);
            CounterVec::new(self.opts(&opts), &labels)
                .map(MetricHandle::Counter)
                .map_err(|e| invalid(&opts, e))
        })?;
        match handle {
            MetricHandle::Counter(m) => Ok(m),
            other => Err(kind_mismatch(&opts, other.kind())),
        }
    }

    pub fn gauge(&self, opts: MetricOpts) -> Result<GaugeVec> {
        let handle = self.register(MetricKind::Gauge, &opts, None, || {
            let labels = label_refs(&opts.label_names);
            GaugeVec::new(self.opts(&opts), &labels)
                .map(MetricHandle::Gauge)
                .map_err(|e| invalid(&opts, e))
        })?;
        match handle {
            MetricHandle::Gauge(m) => Ok(m),
            other => Err(kind_mismatch(&opts, other.kind())),
        }
    }

    /// Histogram with `opts.buckets` if given, the shared bucket set otherwise.
    pub fn histogram(&self, opts: MetricOpts) -> Result<HistogramVec> {
        let buckets = opts.buckets.clone().unwrap_or_else(custom_buckets);
        let handle = self.register(MetricKind::Histogram, &opts, Some(buckets.clone()), || {
            let labels = label_refs(&opts.label_names);
            let hopts = HistogramOpts::from(self.opts(&opts)).buckets(buckets);
            HistogramVec::new(hopts, &labels)
                .map(MetricHandle::Histogram)
                .map_err(|e| invalid(&opts, e))
        })?;
        match handle {
            MetricHandle::Histogram(m) => Ok(m),
            other => Err(kind_mismatch(&opts, other.kind())),
        }
    }

    pub fn summary(&self, opts: MetricOpts) -> Result<SummaryVec> {
        let fq_name = self.fq_name(&opts.name);
        let handle = self.register(MetricKind::Summary, &opts, None, || {
            SummaryVec::new(&fq_name, &help_or_name(&opts), &opts.label_names)
                .map(MetricHandle::Summary)
        })?;
        match handle {
            MetricHandle::Summary(m) => Ok(m),
            other => Err(kind_mismatch(&opts, other.kind())),
        }
    }

    fn register(
        &self,
        kind: MetricKind,
        opts: &MetricOpts,
        buckets: Option<Vec<f64>>,
        build: impl FnOnce() -> Result<MetricHandle>,
    ) -> Result<MetricHandle> {
        let signature = MetricSignature {
            kind,
            label_names: opts.label_names.clone(),
            buckets,
        };
        self.registry
            .get_or_register(&self.fq_name(&opts.name), signature, build)
    }

    fn opts(&self, opts: &MetricOpts) -> Opts {
        Opts::new(opts.name.clone(), help_or_name(opts)).namespace(self.namespace.clone())
    }
}

fn label_refs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

// The registry rejects empty help strings.
fn help_or_name(opts: &MetricOpts) -> String {
    if opts.help.is_empty() {
        opts.name.clone()
    } else {
        opts.help.clone()
    }
}

fn invalid(opts: &MetricOpts, e: prometheus::Error) -> MetricsError {
    MetricsError::Configuration(format!("invalid metric {}: {e}", opts.name))
}

// Unreachable in practice: the kind is part of the registered signature, so
// `get_or_register` already fails with `DuplicateMetric` on a kind change.
fn kind_mismatch(opts: &MetricOpts, found: MetricKind) -> MetricsError {
    MetricsError::DuplicateMetric {
        name: opts.name.clone(),
        reason: format!("already registered as {}", found.as_str()),
    }
}
