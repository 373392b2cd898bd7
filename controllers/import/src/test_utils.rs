//! Test utilities for unit testing the reconciler
//!
//! This module provides helpers for creating test claims and wiring
//! components against `MockClusterClient`.

use crate::reconciler::Reconciler;
use crate::workload::ImporterTemplate;
use cluster_client::MockClusterClient;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::sync::Arc;
use std::time::Duration;

pub const TEST_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Helper to create a test claim in `default` with the given annotations
pub fn claim_with_intent(name: &str, annotations: &[(&str, &str)]) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            annotations: Some(
                annotations
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Importer template used by all tests
pub fn template() -> ImporterTemplate {
    ImporterTemplate::new("kubevirt/cdi-importer:latest", "IfNotPresent")
}

/// Helper to create a reconciler backed by `mock`
pub fn reconciler(mock: &MockClusterClient) -> Reconciler {
    Reconciler::new(Arc::new(mock.clone()), template(), TEST_POLL_INTERVAL)
}
