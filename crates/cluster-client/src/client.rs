//! Kubernetes-backed cluster client
//!
//! Thin wrapper over `kube::Api` that maps the status codes the controller
//! cares about (404, 409) onto the trait's not-found and conflict semantics.

use crate::cluster_trait::{ClusterClientTrait, CreateOutcome};
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

/// Cluster client talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a new client from a configured `kube::Client`
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn claims(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn api_code(error: &kube::Error) -> Option<u16> {
    match error {
        kube::Error::Api(response) => Some(response.code),
        _ => None,
    }
}

/// Maps throttling and server-side hiccups to `Unavailable`, everything else to `Kube`.
fn classify(error: kube::Error, what: &str) -> ClusterError {
    match api_code(&error) {
        Some(409) => ClusterError::Conflict(format!("{what}: {error}")),
        Some(429 | 500 | 503 | 504) => ClusterError::Unavailable(format!("{what}: {error}")),
        _ => ClusterError::Kube(error),
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>, ClusterError> {
        self.claims(namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, &format!("get claim {namespace}/{name}")))
    }

    async fn patch_claim_annotations(
        &self,
        namespace: &str,
        name: &str,
        resource_version: &str,
        annotations: &BTreeMap<String, Option<String>>,
    ) -> Result<Option<PersistentVolumeClaim>, ClusterError> {
        // A merge patch that carries resourceVersion is rejected with 409 by
        // the API server if the claim changed since it was read.
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": resource_version,
                "annotations": annotations,
            }
        });
        debug!("Patching claim {}/{} annotations at resourceVersion {}", namespace, name, resource_version);

        match self
            .claims(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(claim) => Ok(Some(claim)),
            Err(e) if api_code(&e) == Some(404) => Ok(None),
            Err(e) => Err(classify(e, &format!("patch claim {namespace}/{name}"))),
        }
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClusterError> {
        self.pods(namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, &format!("get pod {namespace}/{name}")))
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let params = ListParams::default().labels(label_selector);
        self.pods(namespace)
            .list(&params)
            .await
            .map(|list| list.items)
            .map_err(|e| classify(e, &format!("list pods in {namespace} ({label_selector})")))
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<CreateOutcome, ClusterError> {
        match self.pods(namespace).create(&PostParams::default(), pod).await {
            Ok(created) => Ok(CreateOutcome::Created(created)),
            Err(e) if api_code(&e) == Some(409) => Ok(CreateOutcome::AlreadyExists),
            Err(e) => Err(classify(e, &format!("create pod in {namespace}"))),
        }
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        match self.pods(namespace).delete(name, &DeleteParams::background()).await {
            Ok(_) => Ok(true),
            Err(e) if api_code(&e) == Some(404) => Ok(false),
            Err(e) => Err(classify(e, &format!("delete pod {namespace}/{name}"))),
        }
    }
}
