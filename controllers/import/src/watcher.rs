//! Claim watcher.
//!
//! Runs the claim reconciler under `kube_runtime::Controller`, which owns the
//! scheduling: events for the same claim are deduplicated, a claim is never
//! reconciled by two tasks at once, and changes arriving mid-pass trigger one
//! more pass once it finishes.
//!
//! Importer pods reach their claim through the controller owner reference, so
//! a pod phase change requeues the claim that owns it.

use crate::backoff::BackoffRegistry;
use crate::error::ControllerError;
use crate::probes::Readiness;
use crate::reconciler::{ReconcileAction, Reconciler};
use cdi_api::{ClaimKey, IMPORTER_SELECTOR};
use futures::StreamExt;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::{Api, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Readiness slot of the claim cache
pub const CLAIM_CACHE: usize = 0;
/// Caches that must sync before the controller reports ready
pub const SYNCED_CACHES: usize = 1;

/// Shared state handed to every reconciliation.
pub struct ClaimContext {
    pub reconciler: Reconciler,
    pub backoff: BackoffRegistry,
}

impl ClaimContext {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler,
            backoff: BackoffRegistry::default(),
        }
    }
}

fn claim_key(claim: &PersistentVolumeClaim) -> Result<ClaimKey, ControllerError> {
    let namespace = claim
        .namespace()
        .ok_or(ControllerError::MissingObjectKey(".metadata.namespace"))?;
    Ok(ClaimKey::new(namespace, claim.name_any()))
}

/// Reconciles one claim and tells the runtime when to look at it again.
pub async fn reconcile_claim(
    claim: Arc<PersistentVolumeClaim>,
    ctx: Arc<ClaimContext>,
) -> Result<Action, ControllerError> {
    let key = claim_key(&claim)?;
    let action = ctx.reconciler.reconcile(&key).await?;
    ctx.backoff.reset(&key);
    debug!("Reconciled claim {}: {:?}", key, action);

    Ok(match action {
        ReconcileAction::Requeue(delay) => Action::requeue(delay),
        ReconcileAction::Skipped | ReconcileAction::Done | ReconcileAction::AwaitChange => Action::await_change(),
    })
}

/// Requeues a failed claim with its own exponential backoff.
pub fn error_policy(claim: Arc<PersistentVolumeClaim>, error: &ControllerError, ctx: Arc<ClaimContext>) -> Action {
    let key = ClaimKey::new(claim.namespace().unwrap_or_default(), claim.name_any());
    let delay = ctx.backoff.next_delay(&key);
    if error.is_conflict() {
        debug!("Claim {} changed during reconciliation, retrying in {:?}", key, delay);
    } else {
        error!("Reconciliation of claim {} failed, retrying in {:?}: {}", key, delay, error);
    }
    Action::requeue(delay)
}

/// Watches claims and their importer pods and reconciles until the watch ends.
pub async fn watch_claims(
    claims: Api<PersistentVolumeClaim>,
    pods: Api<Pod>,
    ctx: Arc<ClaimContext>,
    concurrency: u16,
    readiness: Readiness,
) {
    info!("Starting PersistentVolumeClaim watcher ({} concurrent reconciliations)", concurrency);

    let controller = Controller::new(claims, watcher::Config::default())
        .owns(pods, watcher::Config::default().labels(IMPORTER_SELECTOR))
        .with_config(RuntimeConfig::default().concurrency(concurrency));

    let store = controller.store();
    tokio::spawn(async move {
        match store.wait_until_ready().await {
            Ok(()) => {
                info!("PersistentVolumeClaim cache synced");
                readiness.mark_synced(CLAIM_CACHE);
            }
            Err(e) => warn!("PersistentVolumeClaim cache never synced: {}", e),
        }
    });

    controller
        .run(reconcile_claim, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((claim, action)) => debug!("Claim {} done: {:?}", claim, action),
                Err(e) => warn!("Claim controller error: {}", e),
            }
        })
        .await;
}
