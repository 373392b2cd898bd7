//! Main controller implementation.
//!
//! Wires the cluster client, the reconciler, the claim watcher and the probe
//! server together, and runs them until one of them stops or the process is
//! asked to terminate.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::probes::{self, Readiness};
use crate::reconciler::Reconciler;
use crate::watcher::{watch_claims, ClaimContext, SYNCED_CACHES};
use crate::workload::ImporterTemplate;
use cluster_client::{ClusterClientTrait, KubeClusterClient};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{Api, Client};
use std::future::Future;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

/// Main controller for claim imports.
pub struct Controller {
    config: ControllerConfig,
    client: Client,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Import Controller");
        let client = Client::try_default().await?;
        Ok(Self { config, client })
    }

    /// Runs the controller until a component stops or a shutdown signal arrives.
    pub async fn run(self) -> Result<(), ControllerError> {
        let shutdown = shutdown_signal()?;

        let cluster: Arc<dyn ClusterClientTrait> = Arc::new(KubeClusterClient::new(self.client.clone()));
        let template = ImporterTemplate::new(&self.config.importer_image, &self.config.pull_policy);
        let reconciler = Reconciler::new(cluster, template, self.config.phase_poll_interval);
        let ctx = Arc::new(ClaimContext::new(reconciler));
        let readiness = Readiness::new(SYNCED_CACHES);

        let (claims, pods): (Api<PersistentVolumeClaim>, Api<Pod>) = match &self.config.watch_namespace {
            Some(ns) => (
                Api::namespaced(self.client.clone(), ns),
                Api::namespaced(self.client.clone(), ns),
            ),
            None => (Api::all(self.client.clone()), Api::all(self.client.clone())),
        };

        let mut claim_watcher = tokio::spawn(watch_claims(
            claims,
            pods,
            ctx,
            self.config.worker_count,
            readiness.clone(),
        ));
        let mut probe_server = tokio::spawn(probes::serve(self.config.probe_addr, readiness));

        let result = tokio::select! {
            res = &mut claim_watcher => match res {
                Ok(()) => {
                    warn!("Claim watcher stopped");
                    Ok(())
                }
                Err(e) => Err(ControllerError::Watch(format!("claim watcher task panicked: {e}"))),
            },
            res = &mut probe_server => match res {
                Ok(Ok(())) => {
                    warn!("Probe server stopped");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Probe server failed: {}", e);
                    Err(e)
                }
                Err(e) => Err(ControllerError::Probe(format!("probe server task panicked: {e}"))),
            },
            () = shutdown => Ok(()),
        };

        claim_watcher.abort();
        probe_server.abort();
        result
    }
}

/// Resolves on SIGINT or SIGTERM.
///
/// The SIGTERM handler is installed before this returns, so the signal is
/// never missed between startup and the first poll.
pub(crate) fn shutdown_signal() -> Result<impl Future<Output = ()>, ControllerError> {
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => match res {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => warn!("Failed to listen for interrupt: {}", e),
            },
            _ = terminate.recv() => info!("Terminate signal received, shutting down"),
        }
    })
}
