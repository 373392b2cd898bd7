//! Claim reconciliation
//!
//! One pass reads the claim, decides what the import workload should be, and
//! takes at most one workload action and one status write. A pass never
//! waits on the workload: progress is picked up by the next pass, triggered
//! by pod events or by a requeue.

use crate::error::ControllerError;
use crate::source::resolve;
use crate::status::{PropagateOutcome, StatusPropagator, StatusUpdate};
use crate::supervisor::{EnsureOutcome, WorkloadSupervisor};
use crate::workload::{workload_intent, workload_phase, ImporterTemplate};
use cdi_api::{decode_intent, recorded_intent, recorded_phase, ClaimKey, ImportPhase, ANN_ENDPOINT};
use cluster_client::ClusterClientTrait;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delay before recreating a workload after deleting a stale one.
const STALE_REPLACE_DELAY: Duration = Duration::from_secs(2);

/// What should happen to a claim after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Claim carries no import intent and was left untouched
    Skipped,
    /// Nothing left to do until the claim changes
    Done,
    /// Workload is progressing; its next event triggers another pass
    AwaitChange,
    /// Look again after the given delay
    Requeue(Duration),
}

/// Reconciles claims against their importer pods.
pub struct Reconciler {
    client: Arc<dyn ClusterClientTrait>,
    supervisor: WorkloadSupervisor,
    propagator: StatusPropagator,
    poll_interval: Duration,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ClusterClientTrait>, template: ImporterTemplate, poll_interval: Duration) -> Self {
        Self {
            supervisor: WorkloadSupervisor::new(client.clone(), template),
            propagator: StatusPropagator::new(client.clone()),
            client,
            poll_interval,
        }
    }

    /// Runs one reconciliation pass for `key`.
    ///
    /// `Err` means a transient store problem; the caller retries with
    /// backoff. Problems with the claim's intent are recorded on the claim as
    /// `Failed` and reported as `Done`.
    pub async fn reconcile(&self, key: &ClaimKey) -> Result<ReconcileAction, ControllerError> {
        let Some(claim) = self.client.get_claim(&key.namespace, &key.name).await? else {
            debug!("Claim {} no longer exists", key);
            return Ok(ReconcileAction::Done);
        };

        let Some(intent) = decode_intent(&claim) else {
            info!("pvc annotation {:?} not found, skipping pvc {:?}", ANN_ENDPOINT, key.to_string());
            return Ok(ReconcileAction::Skipped);
        };
        let fingerprint = intent.fingerprint();

        if recorded_phase(&claim).is_some_and(ImportPhase::is_terminal)
            && recorded_intent(&claim) == Some(fingerprint.as_str())
        {
            debug!("Claim {} import already finished", key);
            return Ok(ReconcileAction::Done);
        }

        let spec = match resolve(&intent) {
            Ok(spec) => spec,
            Err(e) => {
                warn!("Claim {} has an unusable import intent: {}", key, e);
                // Any importer still around was built from an earlier intent
                if let Some(pod) = self.supervisor.find_existing(&claim).await? {
                    if workload_phase(&pod).is_some_and(ImportPhase::is_terminal) {
                        info!("Removing finished importer pod {} of claim {}", pod.name_any(), key);
                        self.supervisor.delete_pod(&pod).await?;
                    } else {
                        warn!(
                            "Importer pod {} of claim {} is still running an earlier intent; leaving it to finish",
                            pod.name_any(),
                            key
                        );
                    }
                }
                let update = StatusUpdate {
                    phase: Some(ImportPhase::Failed),
                    pod_name: None,
                    observed_intent: fingerprint,
                };
                self.propagator.propagate(&claim, &update).await?;
                return Ok(ReconcileAction::Done);
            }
        };

        let (pod, observed_intent) = match self.supervisor.ensure(&claim, &spec).await? {
            EnsureOutcome::Created(pod) | EnsureOutcome::Existing(pod) => (pod, fingerprint),
            EnsureOutcome::Stale(pod) => {
                if workload_phase(&pod).is_some_and(ImportPhase::is_terminal) {
                    info!("Import intent of claim {} changed, replacing importer pod {}", key, pod.name_any());
                    self.supervisor.delete(&claim).await?;
                    return Ok(ReconcileAction::Requeue(STALE_REPLACE_DELAY));
                }
                warn!(
                    "Import intent of claim {} changed while importer pod {} is still running; it will be replaced once it finishes",
                    key,
                    pod.name_any()
                );
                let previous = workload_intent(&pod).unwrap_or_default().to_string();
                (pod, previous)
            }
        };

        // Unknown leaves the last observed phase in place until the pod reports again
        let phase = workload_phase(&pod);
        let update = StatusUpdate {
            phase,
            pod_name: Some(pod.name_any()),
            observed_intent,
        };
        if self.propagator.propagate(&claim, &update).await? == PropagateOutcome::ClaimGone {
            return Ok(ReconcileAction::Done);
        }

        Ok(match phase {
            Some(phase) if phase.is_terminal() => ReconcileAction::Done,
            Some(_) => ReconcileAction::AwaitChange,
            None => ReconcileAction::Requeue(self.poll_interval),
        })
    }
}
