//! Workload supervision
//!
//! Keeps at most one importer pod per claim. Pods are always discovered by
//! label selector, so the supervisor holds no per-claim state and a
//! restarted controller picks up where the previous one stopped.

use crate::error::ControllerError;
use crate::source::WorkloadSpec;
use crate::workload::{is_bound_to, workload_intent, ImporterTemplate};
use cdi_api::{importer_pod_name, workload_selector};
use cluster_client::{ClusterClientTrait, ClusterError, CreateOutcome};
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of making sure a claim has its importer pod.
#[derive(Debug, Clone)]
pub enum EnsureOutcome {
    /// A new pod was created by this call
    Created(Pod),

    /// A pod built from the current intent already exists
    Existing(Pod),

    /// A pod exists but was built from a different intent
    Stale(Pod),
}

impl EnsureOutcome {
    #[must_use]
    pub fn pod(&self) -> &Pod {
        match self {
            Self::Created(pod) | Self::Existing(pod) | Self::Stale(pod) => pod,
        }
    }
}

fn claim_identity(claim: &PersistentVolumeClaim) -> Result<(String, String), ControllerError> {
    let namespace = claim
        .namespace()
        .ok_or(ControllerError::MissingObjectKey(".metadata.namespace"))?;
    let uid = claim.uid().ok_or(ControllerError::MissingObjectKey(".metadata.uid"))?;
    Ok((namespace, uid))
}

/// Find, create and delete importer pods.
pub struct WorkloadSupervisor {
    client: Arc<dyn ClusterClientTrait>,
    template: ImporterTemplate,
}

impl WorkloadSupervisor {
    pub fn new(client: Arc<dyn ClusterClientTrait>, template: ImporterTemplate) -> Self {
        Self { client, template }
    }

    /// Looks up the importer pod of `claim`.
    ///
    /// Should more than one pod match, the one carrying the deterministic
    /// name (or else the oldest) is kept and the others are deleted.
    pub async fn find_existing(&self, claim: &PersistentVolumeClaim) -> Result<Option<Pod>, ControllerError> {
        let (namespace, uid) = claim_identity(claim)?;
        let mut pods = self.client.list_pods(&namespace, &workload_selector(&uid)).await?;
        if pods.len() <= 1 {
            return Ok(pods.pop());
        }

        let expected = importer_pod_name(&claim.name_any(), &uid);
        pods.sort_by_key(|pod| {
            (
                pod.name_any() != expected,
                pod.metadata.creation_timestamp.as_ref().map(|t| t.0),
                pod.name_any(),
            )
        });
        let mut pods = pods.into_iter();
        let keep = pods.next();
        for extra in pods {
            warn!(
                "Claim {}/{} has more than one importer pod, deleting {}",
                namespace,
                claim.name_any(),
                extra.name_any()
            );
            self.client.delete_pod(&namespace, &extra.name_any()).await?;
        }
        Ok(keep)
    }

    /// Makes sure `claim` has an importer pod and reports how it relates to `spec`.
    ///
    /// Never mutates an existing pod. Creation races are settled by the API
    /// server: the pod name is deterministic, so a losing create sees
    /// `AlreadyExists` and adopts the winner's pod.
    pub async fn ensure(
        &self,
        claim: &PersistentVolumeClaim,
        spec: &WorkloadSpec,
    ) -> Result<EnsureOutcome, ControllerError> {
        if let Some(pod) = self.find_existing(claim).await? {
            return Ok(classify(pod, spec));
        }

        let (namespace, uid) = claim_identity(claim)?;
        let pod = self.template.render(claim, spec)?;
        let name = pod.name_any();

        match self.client.create_pod(&namespace, &pod).await? {
            CreateOutcome::Created(created) => {
                info!("Created importer pod {}/{} for claim {}", namespace, name, claim.name_any());
                Ok(EnsureOutcome::Created(created))
            }
            CreateOutcome::AlreadyExists => {
                debug!("Importer pod {}/{} already exists, re-reading", namespace, name);
                match self.client.get_pod(&namespace, &name).await? {
                    Some(existing) if is_bound_to(&existing, &uid) => Ok(classify(existing, spec)),
                    Some(_) => Err(ControllerError::WorkloadNameTaken(format!("{namespace}/{name}"))),
                    None => Err(ClusterError::Conflict(format!(
                        "importer pod {namespace}/{name} vanished after AlreadyExists"
                    ))
                    .into()),
                }
            }
        }
    }

    /// Deletes every importer pod of `claim`; returns how many were removed.
    pub async fn delete(&self, claim: &PersistentVolumeClaim) -> Result<usize, ControllerError> {
        let (namespace, uid) = claim_identity(claim)?;
        let mut removed = 0;
        for pod in self.client.list_pods(&namespace, &workload_selector(&uid)).await? {
            if self.delete_pod(&pod).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Deletes one importer pod; `false` if it was already gone.
    pub async fn delete_pod(&self, pod: &Pod) -> Result<bool, ControllerError> {
        let namespace = pod.namespace().unwrap_or_default();
        let deleted = self.client.delete_pod(&namespace, &pod.name_any()).await?;
        if deleted {
            info!("Deleted importer pod {}/{}", namespace, pod.name_any());
        }
        Ok(deleted)
    }
}

fn classify(pod: Pod, spec: &WorkloadSpec) -> EnsureOutcome {
    if workload_intent(&pod) == Some(spec.fingerprint.as_str()) {
        EnsureOutcome::Existing(pod)
    } else {
        EnsureOutcome::Stale(pod)
    }
}
