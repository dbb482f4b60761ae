//! Top-level facade crate for mpmetrics.
//!
//! Re-exports the core types and the client library so users can depend on a single crate.

pub mod core {
    pub use mpmetrics_core::*;
}

pub mod client {
    pub use mpmetrics_client::*;
}
