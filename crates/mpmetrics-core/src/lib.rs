//! mpmetrics core: runtime-free primitives shared by the client and tooling.
//!
//! This crate defines the error surface, the shared histogram bucket set and
//! the inference exception normalizer. It carries no runtime or
//! metrics-library dependencies.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `MetricsError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod buckets;
pub mod error;
pub mod inference;

/// Shared result type.
pub use error::{ErrorKind, MetricsError, Result};
pub use buckets::CUSTOM_BUCKETS;
pub use inference::{normalize, InferenceException, RawMessage};
