//! Status propagation onto the claim.

use crate::error::ControllerError;
use cdi_api::{encode_status, pending_changes, AnnotationPatch, ImportPhase, ANN_IMPORT_POD, ANN_OBSERVED_INTENT};
use cluster_client::ClusterClientTrait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

/// Status to record on a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Importer phase; `None` keeps whatever phase is already recorded
    pub phase: Option<ImportPhase>,
    /// Importer pod the status describes; `None` clears the annotation
    pub pod_name: Option<String>,
    /// Fingerprint of the intent the status describes
    pub observed_intent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagateOutcome {
    /// The claim already carried this status; nothing was written
    Unchanged,
    /// The claim was patched
    Updated,
    /// The claim was deleted before the write landed
    ClaimGone,
}

/// Writes workload status onto claims with optimistic locking.
pub struct StatusPropagator {
    client: Arc<dyn ClusterClientTrait>,
}

impl StatusPropagator {
    pub fn new(client: Arc<dyn ClusterClientTrait>) -> Self {
        Self { client }
    }

    /// Records `update` on `claim`.
    ///
    /// The patch is conditional on the claim's `resourceVersion`; a concurrent
    /// edit surfaces as a conflict error and the caller re-reads and retries.
    pub async fn propagate(
        &self,
        claim: &PersistentVolumeClaim,
        update: &StatusUpdate,
    ) -> Result<PropagateOutcome, ControllerError> {
        let mut desired = match update.phase {
            Some(phase) => encode_status(Some(phase)),
            None => AnnotationPatch::new(),
        };
        desired.insert(ANN_IMPORT_POD.to_string(), update.pod_name.clone());
        desired.insert(ANN_OBSERVED_INTENT.to_string(), Some(update.observed_intent.clone()));

        let changes = pending_changes(claim, &desired);
        if changes.is_empty() {
            return Ok(PropagateOutcome::Unchanged);
        }

        let namespace = claim
            .namespace()
            .ok_or(ControllerError::MissingObjectKey(".metadata.namespace"))?;
        let name = claim.name_any();
        let resource_version = claim
            .resource_version()
            .ok_or(ControllerError::MissingObjectKey(".metadata.resourceVersion"))?;

        match self
            .client
            .patch_claim_annotations(&namespace, &name, &resource_version, &changes)
            .await?
        {
            Some(_) => {
                info!(
                    "Claim {}/{} import phase: {}",
                    namespace,
                    name,
                    update.phase.map_or("<unknown>", ImportPhase::as_str)
                );
                Ok(PropagateOutcome::Updated)
            }
            None => {
                debug!("Claim {}/{} was deleted before its status could be written", namespace, name);
                Ok(PropagateOutcome::ClaimGone)
            }
        }
    }
}
