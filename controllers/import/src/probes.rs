//! Liveness and readiness endpoints
//!
//! - `GET /healthz`: always `200 ok` while the process serves requests
//! - `GET /readyz`: `200` once every watcher finished its initial list, `503` before

use crate::error::ControllerError;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Tracks which watchers completed their initial list.
#[derive(Debug, Clone)]
pub struct Readiness {
    synced: Arc<[AtomicBool]>,
}

impl Readiness {
    /// Readiness gate over `watchers` watchers, indexed from zero.
    #[must_use]
    pub fn new(watchers: usize) -> Self {
        Self {
            synced: (0..watchers).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    /// Records that watcher `index` completed its initial list.
    pub fn mark_synced(&self, index: usize) {
        if let Some(flag) = self.synced.get(index) {
            flag.store(true, Ordering::Release);
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.synced.iter().all(|flag| flag.load(Ordering::Acquire))
    }
}

/// Build the probe router
pub fn probe_routes(readiness: Readiness) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

async fn readyz(State(readiness): State<Readiness>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "waiting for initial sync")
    }
}

/// Serve the probes on `addr` until the server fails
pub async fn serve(addr: SocketAddr, readiness: Readiness) -> Result<(), ControllerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Probe(format!("bind {addr}: {e}")))?;
    info!("Probe server listening on {}", addr);
    axum::serve(listener, probe_routes(readiness))
        .await
        .map_err(|e| ControllerError::Probe(e.to_string()))
}
