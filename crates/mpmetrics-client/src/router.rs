//! Axum router wiring for the scrape endpoint.
//!
//! Exposes a single `GET /metrics` route.

use std::sync::Arc;

use axum::{routing::get, Router};

use crate::{ops, registry::MultiprocRegistry};

/// Path served by the scrape endpoint.
pub const METRICS_PATH: &str = "/metrics";

pub fn build_router(registry: Arc<MultiprocRegistry>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(ops::metrics))
        .with_state(registry)
}
