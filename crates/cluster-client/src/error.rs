//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster store
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API or transport error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Optimistic-lock conflict: the object changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store temporarily unreachable or throttling
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    /// HTTP status code of an API error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Kube(kube::Error::Api(response)) => Some(response.code),
            Self::Conflict(_) => Some(409),
            _ => None,
        }
    }
}
