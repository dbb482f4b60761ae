//! Minimal scrape server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use mpmetrics_core::error::{MetricsError, Result};

use crate::registry::MultiprocRegistry;
use crate::router;

/// Running scrape endpoint. Dropping the handle stops the server the same
/// way [`ScrapeServer::shutdown`] does, without waiting for it.
#[derive(Debug)]
pub struct ScrapeServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ScrapeServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight scrapes.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "scrape server task ended abnormally");
        }
    }
}

/// Bind `addr:port` and serve `GET /metrics` in the background.
///
/// An empty `addr` binds every interface. Bind failures are returned as
/// `MetricsError::Bind` and are not retried.
pub async fn start_http_server(
    registry: Arc<MultiprocRegistry>,
    port: u16,
    addr: &str,
) -> Result<ScrapeServer> {
    let host = if addr.is_empty() { "0.0.0.0" } else { addr };
    let listener = TcpListener::bind((host, port))
        .await
        .map_err(|source| MetricsError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })?;
    let local_addr = listener.local_addr().map_err(|source| MetricsError::Bind {
        addr: format!("{host}:{port}"),
        source,
    })?;

    let app = router::build_router(registry);
    let (tx, rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = rx.await;
        });
        if let Err(e) = server.await {
            tracing::error!(error = %e, "scrape server failed");
        }
    });

    tracing::info!(%local_addr, "metrics scrape endpoint listening");
    Ok(ScrapeServer {
        local_addr,
        shutdown: tx,
        task,
    })
}
