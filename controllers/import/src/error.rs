//! Controller-specific error types.
//!
//! Everything returned as `Err` from a reconciliation is treated as transient
//! and retried with backoff. Permanent problems with a claim's intent are not
//! errors at this level: they are recorded on the claim as a `Failed` phase.

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors that can occur in the Import Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Cluster store error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Kubernetes client construction error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Object is missing a field the API server always sets
    #[error("Object is missing {0}")]
    MissingObjectKey(&'static str),

    /// The deterministic importer pod name is held by a pod this claim does not own
    #[error("Importer pod name taken: {0}")]
    WorkloadNameTaken(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Claim watcher task failed
    #[error("Claim watcher failed: {0}")]
    Watch(String),

    /// Probe server failed
    #[error("Probe server failed: {0}")]
    Probe(String),

    /// Signal handler could not be installed
    #[error("Signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

impl ControllerError {
    /// Whether the error came from an optimistic-lock conflict.
    ///
    /// Conflicts are expected under concurrent edits and are logged quieter.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Cluster(e) if e.status_code() == Some(409))
    }
}
