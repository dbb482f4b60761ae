//! Multiprocess shard plumbing.
//!
//! - `directory`: the shared directory and its reset/cleanup lifecycle
//! - `lock`: bounded-wait lock serializing the reset across processes
//! - `shard`: per-process snapshot files
//! - `collector`: merge-on-read over all shards

pub mod collector;
pub mod directory;
pub mod lock;
pub mod shard;

pub use collector::{GaugeMode, MultiProcessCollector};
pub use directory::SharedStateDirectory;
pub use lock::{LockFile, LockGuard};
pub use shard::MetricKind;
