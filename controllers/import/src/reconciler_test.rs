//! Scenario tests for the reconciler, driven against `MockClusterClient`

use crate::reconciler::{ReconcileAction, Reconciler};
use crate::test_utils::{claim_with_intent, reconciler, TEST_POLL_INTERVAL};
use crate::workload::workload_intent;
use cdi_api::{
    decode_intent, recorded_intent, recorded_phase, ClaimKey, ImportPhase, ANN_CONTENT_TYPE, ANN_ENDPOINT,
    ANN_IMPORT_POD, ANN_SOURCE, STATUS_ANNOTATIONS,
};
use cluster_client::{Fault, MockClusterClient};
use kube::ResourceExt;
use std::sync::Arc;

fn key(name: &str) -> ClaimKey {
    ClaimKey::new("default", name)
}

fn phase_of(mock: &MockClusterClient, name: &str) -> Option<ImportPhase> {
    recorded_phase(&mock.claim("default", name).unwrap())
}

#[tokio::test]
async fn test_claim_without_intent_is_skipped() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("no-import", &[]));

    let action = reconciler(&mock).reconcile(&key("no-import")).await.unwrap();

    assert_eq!(action, ReconcileAction::Skipped);
    assert!(mock.pods_in("default").is_empty());
    assert_eq!(mock.mutation_count(), 0);
    let claim = mock.claim("default", "no-import").unwrap();
    assert!(STATUS_ANNOTATIONS.iter().all(|k| !claim.annotations().contains_key(*k)));
}

#[tokio::test]
async fn test_unreachable_endpoint_ends_failed() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("no-import", &[(ANN_ENDPOINT, "http://invalid-host/file.iso")]));
    let reconciler = reconciler(&mock);

    let action = reconciler.reconcile(&key("no-import")).await.unwrap();
    assert_eq!(action, ReconcileAction::AwaitChange);
    assert_eq!(mock.pods_in("default").len(), 1);
    assert_eq!(phase_of(&mock, "no-import"), Some(ImportPhase::Pending));

    mock.set_pod_phase("default", "importer-no-import", "Failed");
    let action = reconciler.reconcile(&key("no-import")).await.unwrap();
    assert_eq!(action, ReconcileAction::Done);
    assert_eq!(phase_of(&mock, "no-import"), Some(ImportPhase::Failed));

    // Terminal and unchanged intent: nothing more happens
    let before = mock.mutation_count();
    assert_eq!(reconciler.reconcile(&key("no-import")).await.unwrap(), ReconcileAction::Done);
    assert_eq!(mock.mutation_count(), before);
    assert_eq!(mock.pods_in("default").len(), 1);
}

#[tokio::test]
async fn test_blank_image_ends_succeeded() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent(
        "create-image",
        &[(ANN_SOURCE, "none"), (ANN_CONTENT_TYPE, "kubevirt")],
    ));
    let reconciler = reconciler(&mock);

    reconciler.reconcile(&key("create-image")).await.unwrap();
    let claim = mock.claim("default", "create-image").unwrap();
    assert_eq!(
        claim.annotations().get(ANN_IMPORT_POD).map(String::as_str),
        Some("importer-create-image")
    );

    mock.set_pod_phase("default", "importer-create-image", "Running");
    assert_eq!(
        reconciler.reconcile(&key("create-image")).await.unwrap(),
        ReconcileAction::AwaitChange
    );
    assert_eq!(phase_of(&mock, "create-image"), Some(ImportPhase::Running));

    mock.set_pod_phase("default", "importer-create-image", "Succeeded");
    assert_eq!(reconciler.reconcile(&key("create-image")).await.unwrap(), ReconcileAction::Done);
    assert_eq!(phase_of(&mock, "create-image"), Some(ImportPhase::Succeeded));
}

#[tokio::test]
async fn test_https_without_secret_starts_import() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent(
        "public-image",
        &[(ANN_SOURCE, "https"), (ANN_ENDPOINT, "https://images.example.com/disk.img")],
    ));

    reconciler(&mock).reconcile(&key("public-image")).await.unwrap();

    assert_eq!(mock.pods_in("default").len(), 1);
    assert_eq!(phase_of(&mock, "public-image"), Some(ImportPhase::Pending));
}

#[tokio::test]
async fn test_unsupported_source_fails_without_retry() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("ftp", &[(ANN_SOURCE, "ftp"), (ANN_ENDPOINT, "ftp://host/disk.img")]));
    let reconciler = reconciler(&mock);

    assert_eq!(reconciler.reconcile(&key("ftp")).await.unwrap(), ReconcileAction::Done);
    assert_eq!(phase_of(&mock, "ftp"), Some(ImportPhase::Failed));
    assert!(mock.pods_in("default").is_empty());

    let before = mock.mutation_count();
    assert_eq!(reconciler.reconcile(&key("ftp")).await.unwrap(), ReconcileAction::Done);
    assert_eq!(mock.mutation_count(), before);
}

#[tokio::test]
async fn test_unknown_pod_phase_requeues() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("disk", &[(ANN_SOURCE, "none")]));
    let reconciler = reconciler(&mock);
    reconciler.reconcile(&key("disk")).await.unwrap();
    mock.set_pod_phase("default", "importer-disk", "Running");
    reconciler.reconcile(&key("disk")).await.unwrap();
    assert_eq!(phase_of(&mock, "disk"), Some(ImportPhase::Running));

    // Node lost contact: the last observed phase stays and nothing is written
    mock.set_pod_phase("default", "importer-disk", "Unknown");
    let before = mock.mutation_count();
    let action = reconciler.reconcile(&key("disk")).await.unwrap();

    assert_eq!(action, ReconcileAction::Requeue(TEST_POLL_INTERVAL));
    assert_eq!(phase_of(&mock, "disk"), Some(ImportPhase::Running));
    assert_eq!(mock.mutation_count(), before);
    assert_eq!(mock.pods_in("default").len(), 1);

    mock.set_pod_phase("default", "importer-disk", "Succeeded");
    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::Done);
    assert_eq!(phase_of(&mock, "disk"), Some(ImportPhase::Succeeded));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reconciles_create_one_workload() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("disk", &[(ANN_SOURCE, "none")]));
    let reconciler: Arc<Reconciler> = Arc::new(reconciler(&mock));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let reconciler = reconciler.clone();
            tokio::spawn(async move { reconciler.reconcile(&key("disk")).await })
        })
        .collect();
    for handle in handles {
        // Losers of the status write see a conflict; only the pod count matters here
        let _ = handle.await.unwrap();
    }

    assert_eq!(mock.pods_in("default").len(), 1);
}

#[tokio::test]
async fn test_deleted_claim_is_done() {
    let mock = MockClusterClient::new();
    assert_eq!(
        reconciler(&mock).reconcile(&key("missing")).await.unwrap(),
        ReconcileAction::Done
    );

    mock.add_claim(claim_with_intent("disk", &[(ANN_SOURCE, "none")]));
    let reconciler = reconciler(&mock);
    reconciler.reconcile(&key("disk")).await.unwrap();
    mock.delete_claim("default", "disk");

    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::Done);
    assert!(mock.pods_in("default").is_empty());
}

#[tokio::test]
async fn test_intent_change_after_terminal_reimports() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("disk", &[(ANN_SOURCE, "none")]));
    let reconciler = reconciler(&mock);
    reconciler.reconcile(&key("disk")).await.unwrap();
    mock.set_pod_phase("default", "importer-disk", "Succeeded");
    reconciler.reconcile(&key("disk")).await.unwrap();

    mock.set_claim_annotation("default", "disk", ANN_SOURCE, Some("http"));
    mock.set_claim_annotation("default", "disk", ANN_ENDPOINT, Some("http://host/disk.img"));

    // Finished pod of the old intent is removed first
    let action = reconciler.reconcile(&key("disk")).await.unwrap();
    assert!(matches!(action, ReconcileAction::Requeue(_)));
    assert!(mock.pods_in("default").is_empty());

    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::AwaitChange);
    let claim = mock.claim("default", "disk").unwrap();
    let fingerprint = decode_intent(&claim).unwrap().fingerprint();
    let pods = mock.pods_in("default");
    assert_eq!(pods.len(), 1);
    assert_eq!(workload_intent(&pods[0]), Some(fingerprint.as_str()));
    assert_eq!(recorded_phase(&claim), Some(ImportPhase::Pending));
    assert_eq!(recorded_intent(&claim), Some(fingerprint.as_str()));
}

#[tokio::test]
async fn test_intent_change_while_running_leaves_workload() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("disk", &[(ANN_ENDPOINT, "http://host/a.img")]));
    let reconciler = reconciler(&mock);
    reconciler.reconcile(&key("disk")).await.unwrap();
    mock.set_pod_phase("default", "importer-disk", "Running");
    let old_fingerprint = decode_intent(&mock.claim("default", "disk").unwrap()).unwrap().fingerprint();

    mock.set_claim_annotation("default", "disk", ANN_ENDPOINT, Some("http://host/b.img"));
    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::AwaitChange);

    let claim = mock.claim("default", "disk").unwrap();
    assert_eq!(mock.pods_in("default").len(), 1);
    assert_eq!(recorded_phase(&claim), Some(ImportPhase::Running));
    assert_eq!(recorded_intent(&claim), Some(old_fingerprint.as_str()));

    // Once the old import finishes it is replaced
    mock.set_pod_phase("default", "importer-disk", "Succeeded");
    assert!(matches!(
        reconciler.reconcile(&key("disk")).await.unwrap(),
        ReconcileAction::Requeue(_)
    ));
    reconciler.reconcile(&key("disk")).await.unwrap();
    let pods = mock.pods_in("default");
    assert_eq!(pods.len(), 1);
    assert_ne!(workload_intent(&pods[0]), Some(old_fingerprint.as_str()));
}

#[tokio::test]
async fn test_store_errors_are_transient() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("disk", &[(ANN_SOURCE, "none")]));
    let reconciler = reconciler(&mock);

    mock.inject_fault(Fault::Conflict);
    let err = reconciler.reconcile(&key("disk")).await.unwrap_err();
    assert!(err.is_conflict());

    mock.inject_fault(Fault::Unavailable);
    assert!(reconciler.reconcile(&key("disk")).await.is_err());

    // Nothing was recorded on the claim and the next pass proceeds normally
    assert_eq!(phase_of(&mock, "disk"), None);
    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::AwaitChange);
}

#[tokio::test]
async fn test_intent_becoming_invalid_leaves_running_workload() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("disk", &[(ANN_ENDPOINT, "http://host/a.img")]));
    let reconciler = reconciler(&mock);
    reconciler.reconcile(&key("disk")).await.unwrap();
    mock.set_pod_phase("default", "importer-disk", "Running");

    mock.set_claim_annotation("default", "disk", ANN_CONTENT_TYPE, Some("iso9660"));
    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::Done);

    let claim = mock.claim("default", "disk").unwrap();
    let fingerprint = decode_intent(&claim).unwrap().fingerprint();
    assert_eq!(mock.pods_in("default").len(), 1);
    assert_eq!(recorded_phase(&claim), Some(ImportPhase::Failed));
    assert_eq!(recorded_intent(&claim), Some(fingerprint.as_str()));
    assert!(!claim.annotations().contains_key(ANN_IMPORT_POD));

    // Reverting the typo picks the running import back up
    mock.set_claim_annotation("default", "disk", ANN_CONTENT_TYPE, None);
    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::AwaitChange);
    let claim = mock.claim("default", "disk").unwrap();
    assert_eq!(recorded_phase(&claim), Some(ImportPhase::Running));
    assert_ne!(recorded_intent(&claim), Some(fingerprint.as_str()));

    mock.set_pod_phase("default", "importer-disk", "Succeeded");
    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::Done);
    assert_eq!(phase_of(&mock, "disk"), Some(ImportPhase::Succeeded));
}

#[tokio::test]
async fn test_intent_becoming_invalid_removes_finished_workload() {
    let mock = MockClusterClient::new();
    mock.add_claim(claim_with_intent("disk", &[(ANN_ENDPOINT, "http://host/a.img")]));
    let reconciler = reconciler(&mock);
    reconciler.reconcile(&key("disk")).await.unwrap();
    mock.set_pod_phase("default", "importer-disk", "Failed");
    reconciler.reconcile(&key("disk")).await.unwrap();

    mock.set_claim_annotation("default", "disk", ANN_SOURCE, Some("s3"));
    assert_eq!(reconciler.reconcile(&key("disk")).await.unwrap(), ReconcileAction::Done);

    assert!(mock.pods_in("default").is_empty());
    let claim = mock.claim("default", "disk").unwrap();
    assert_eq!(recorded_phase(&claim), Some(ImportPhase::Failed));
    assert!(!claim.annotations().contains_key(ANN_IMPORT_POD));
}

#[tokio::test]
async fn test_long_claim_names_sharing_a_prefix_get_their_own_workloads() {
    let mock = MockClusterClient::new();
    let prefix = "disk-".repeat(48);
    let first = format!("{prefix}first");
    let second = format!("{prefix}second");
    mock.add_claim(claim_with_intent(&first, &[(ANN_SOURCE, "none")]));
    mock.add_claim(claim_with_intent(&second, &[(ANN_SOURCE, "none")]));
    let reconciler = reconciler(&mock);

    assert_eq!(reconciler.reconcile(&key(&first)).await.unwrap(), ReconcileAction::AwaitChange);
    assert_eq!(reconciler.reconcile(&key(&second)).await.unwrap(), ReconcileAction::AwaitChange);

    assert_eq!(mock.pods_in("default").len(), 2);
    assert_eq!(phase_of(&mock, &first), Some(ImportPhase::Pending));
    assert_eq!(phase_of(&mock, &second), Some(ImportPhase::Pending));
}
