//! ClusterClient trait for mocking
//!
//! This trait abstracts the Kubernetes API calls made during reconciliation so
//! tests can run against `MockClusterClient` instead of a live cluster.

use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use std::collections::BTreeMap;

/// Result of an idempotent create.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The object was created; carries the server's copy
    Created(Pod),

    /// An object with the same name already exists
    AlreadyExists,
}

/// Trait for the claim and pod operations used by the import controller
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// "Not found" is never an error: reads return `None` and deletes return
/// `false`, so a claim deleted mid-reconciliation winds down cleanly.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Claim operations
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>, ClusterError>;

    /// Applies annotation changes guarded by `resource_version`.
    ///
    /// Fails with `ClusterError::Conflict` when the claim changed since it was
    /// read. Returns `Ok(None)` when the claim no longer exists.
    async fn patch_claim_annotations(
        &self,
        namespace: &str,
        name: &str,
        resource_version: &str,
        annotations: &BTreeMap<String, Option<String>>,
    ) -> Result<Option<PersistentVolumeClaim>, ClusterError>;

    // Pod operations
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClusterError>;
    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError>;
    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<CreateOutcome, ClusterError>;
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<bool, ClusterError>;
}
