//! Operational HTTP surface.
//!
//! - `/metrics` : Prometheus text format (merged across processes in multiproc mode)
//!
//! Also hosts the HTTP rendering of normalized inference failures.

pub mod errors;
pub mod server;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::exposition::{self, CONTENT_TYPE_LATEST};
use crate::registry::MultiprocRegistry;

pub use errors::InferenceError;
pub use server::{start_http_server, ScrapeServer};

pub async fn metrics(State(registry): State<Arc<MultiprocRegistry>>) -> Response {
    // Shard flush + merge touch the filesystem.
    let encoded = tokio::task::spawn_blocking(move || exposition::generate_latest(&registry)).await;

    match encoded {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, CONTENT_TYPE_LATEST)],
            body,
        )
            .into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "scrape task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
