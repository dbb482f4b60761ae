//! mpmetrics client library entry.
//!
//! This crate wires the shared shard directory, the process registry, the
//! metric factory and the scrape endpoint into one client. It is consumed by
//! worker processes, by the exporter binary (`main.rs`) and by integration
//! tests.

pub mod client;
pub mod config;
pub mod exposition;
pub mod factory;
pub mod multiproc;
pub mod ops;
pub mod registry;
pub mod router;

pub use client::MetricsClient;
pub use exposition::CONTENT_TYPE_LATEST;
pub use factory::{MetricFactory, MetricOpts, Summary, SummaryVec};
pub use registry::MultiprocRegistry;
