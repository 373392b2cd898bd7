//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of `ClusterClientTrait`
//! that behaves like the API server where it matters to the controller:
//! - objects get a `uid` and a `resourceVersion`
//! - pod names are unique per namespace (second create is `AlreadyExists`)
//! - annotation patches are rejected with a conflict on a stale `resourceVersion`
//! - deleting a claim cascades to pods it owns
//!
//! Tests drive the "kubelet" side by hand with `set_pod_phase`.

use crate::cluster_trait::{ClusterClientTrait, CreateOutcome};
use crate::error::ClusterError;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, PodStatus};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

type ObjectKey = (String, String);

/// Failure injected into the next store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Optimistic-lock conflict
    Conflict,
    /// Store unreachable
    Unavailable,
}

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    claims: Arc<Mutex<HashMap<ObjectKey, PersistentVolumeClaim>>>,
    pods: Arc<Mutex<HashMap<ObjectKey, Pod>>>,
    next_resource_version: Arc<Mutex<u64>>,
    // Writes issued through the trait (creates, patches, deletes)
    mutations: Arc<Mutex<u64>>,
    faults: Arc<Mutex<VecDeque<Fault>>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

fn key(namespace: &str, name: &str) -> ObjectKey {
    (namespace.to_string(), name.to_string())
}

/// Evaluates a comma-separated equality selector (`k=v`, `k!=v`, `k`).
fn selector_matches(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((k, v)) = term.split_once("!=") {
                labels.get(k.trim()).map(String::as_str) != Some(v.trim())
            } else if let Some((k, v)) = term.split_once('=') {
                let v = v.trim_start_matches('=');
                labels.get(k.trim()).map(String::as_str) == Some(v.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

impl MockClusterClient {
    /// Create an empty mock store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_resource_version(&self) -> String {
        let mut rv = self.next_resource_version.lock().unwrap();
        *rv += 1;
        rv.to_string()
    }

    fn record_mutation(&self) {
        *self.mutations.lock().unwrap() += 1;
    }

    fn take_fault(&self, what: &str) -> Result<(), ClusterError> {
        match self.faults.lock().unwrap().pop_front() {
            Some(Fault::Conflict) => Err(ClusterError::Conflict(format!("injected conflict on {what}"))),
            Some(Fault::Unavailable) => Err(ClusterError::Unavailable(format!("injected outage on {what}"))),
            None => Ok(()),
        }
    }

    /// Queue a failure for the next store call (FIFO)
    pub fn inject_fault(&self, fault: Fault) {
        self.faults.lock().unwrap().push_back(fault);
    }

    /// Number of writes issued through the trait so far
    #[must_use]
    pub fn mutation_count(&self) -> u64 {
        *self.mutations.lock().unwrap()
    }

    /// Add a claim (for test setup); assigns uid and resourceVersion if missing
    pub fn add_claim(&self, mut claim: PersistentVolumeClaim) -> PersistentVolumeClaim {
        let namespace = claim.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = claim.metadata.name.clone().unwrap_or_default();
        claim.metadata.namespace = Some(namespace.clone());
        if claim.metadata.uid.is_none() {
            claim.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        claim.metadata.resource_version = Some(self.bump_resource_version());
        self.claims.lock().unwrap().insert(key(&namespace, &name), claim.clone());
        claim
    }

    /// Current copy of a claim
    #[must_use]
    pub fn claim(&self, namespace: &str, name: &str) -> Option<PersistentVolumeClaim> {
        self.claims.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// Simulate a user editing a claim annotation (`None` removes it)
    pub fn set_claim_annotation(&self, namespace: &str, name: &str, annotation: &str, value: Option<&str>) {
        let rv = self.bump_resource_version();
        if let Some(claim) = self.claims.lock().unwrap().get_mut(&key(namespace, name)) {
            let annotations = claim.metadata.annotations.get_or_insert_with(BTreeMap::new);
            match value {
                Some(v) => annotations.insert(annotation.to_string(), v.to_string()),
                None => annotations.remove(annotation),
            };
            claim.metadata.resource_version = Some(rv);
        }
    }

    /// Delete a claim and cascade to the pods it owns
    pub fn delete_claim(&self, namespace: &str, name: &str) {
        let removed = self.claims.lock().unwrap().remove(&key(namespace, name));
        let Some(uid) = removed.and_then(|c| c.metadata.uid) else {
            return;
        };
        self.pods.lock().unwrap().retain(|_, pod| {
            !pod.metadata
                .owner_references
                .iter()
                .flatten()
                .any(|owner| owner.uid == uid)
        });
    }

    /// Current copy of a pod
    #[must_use]
    pub fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.pods.lock().unwrap().get(&key(namespace, name)).cloned()
    }

    /// All pods in a namespace, sorted by name
    #[must_use]
    pub fn pods_in(&self, namespace: &str) -> Vec<Pod> {
        let mut pods: Vec<Pod> = self
            .pods
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, pod)| pod.clone())
            .collect();
        pods.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        pods
    }

    /// Add a pod directly (for test setup), bypassing the mutation counter
    pub fn add_pod(&self, mut pod: Pod) {
        let namespace = pod.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());
        let name = pod.metadata.name.clone().unwrap_or_default();
        pod.metadata.namespace = Some(namespace.clone());
        if pod.metadata.uid.is_none() {
            pod.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        pod.metadata.resource_version = Some(self.bump_resource_version());
        self.pods.lock().unwrap().insert(key(&namespace, &name), pod);
    }

    /// Simulate the kubelet reporting a pod phase
    pub fn set_pod_phase(&self, namespace: &str, name: &str, phase: &str) {
        let rv = self.bump_resource_version();
        if let Some(pod) = self.pods.lock().unwrap().get_mut(&key(namespace, name)) {
            pod.status.get_or_insert_with(PodStatus::default).phase = Some(phase.to_string());
            pod.metadata.resource_version = Some(rv);
        }
    }

    /// Simulate a pod disappearing outside the controller
    pub fn remove_pod(&self, namespace: &str, name: &str) {
        self.pods.lock().unwrap().remove(&key(namespace, name));
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_claim(&self, namespace: &str, name: &str) -> Result<Option<PersistentVolumeClaim>, ClusterError> {
        self.take_fault("get_claim")?;
        Ok(self.claim(namespace, name))
    }

    async fn patch_claim_annotations(
        &self,
        namespace: &str,
        name: &str,
        resource_version: &str,
        annotations: &BTreeMap<String, Option<String>>,
    ) -> Result<Option<PersistentVolumeClaim>, ClusterError> {
        self.take_fault("patch_claim_annotations")?;
        let new_rv = self.bump_resource_version();
        let mut claims = self.claims.lock().unwrap();
        let Some(claim) = claims.get_mut(&key(namespace, name)) else {
            return Ok(None);
        };
        if claim.metadata.resource_version.as_deref() != Some(resource_version) {
            return Err(ClusterError::Conflict(format!(
                "claim {namespace}/{name} is at resourceVersion {:?}, patch expected {resource_version}",
                claim.metadata.resource_version
            )));
        }
        let current = claim.metadata.annotations.get_or_insert_with(BTreeMap::new);
        for (k, v) in annotations {
            match v {
                Some(v) => current.insert(k.clone(), v.clone()),
                None => current.remove(k),
            };
        }
        claim.metadata.resource_version = Some(new_rv);
        let updated = claim.clone();
        drop(claims);
        self.record_mutation();
        Ok(Some(updated))
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClusterError> {
        self.take_fault("get_pod")?;
        Ok(self.pod(namespace, name))
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        self.take_fault("list_pods")?;
        Ok(self
            .pods_in(namespace)
            .into_iter()
            .filter(|pod| selector_matches(pod.metadata.labels.as_ref(), label_selector))
            .collect())
    }

    async fn create_pod(&self, namespace: &str, pod: &Pod) -> Result<CreateOutcome, ClusterError> {
        self.take_fault("create_pod")?;
        let name = pod.metadata.name.clone().unwrap_or_default();
        let rv = self.bump_resource_version();
        let mut pods = self.pods.lock().unwrap();
        if pods.contains_key(&key(namespace, &name)) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let mut created = pod.clone();
        created.metadata.namespace = Some(namespace.to_string());
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        created.metadata.resource_version = Some(rv);
        created.status = Some(PodStatus {
            phase: Some("Pending".to_string()),
            ..Default::default()
        });
        pods.insert(key(namespace, &name), created.clone());
        drop(pods);
        self.record_mutation();
        Ok(CreateOutcome::Created(created))
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<bool, ClusterError> {
        self.take_fault("delete_pod")?;
        let removed = self.pods.lock().unwrap().remove(&key(namespace, name)).is_some();
        if removed {
            self.record_mutation();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn claim(name: &str) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn pod(name: &str, labels: &[(&str, &str)]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_selector_matches() {
        let labels: BTreeMap<String, String> =
            [("a".to_string(), "1".to_string()), ("b".to_string(), String::new())].into_iter().collect();
        assert!(selector_matches(Some(&labels), "a=1"));
        assert!(selector_matches(Some(&labels), "a==1,b"));
        assert!(selector_matches(Some(&labels), "a!=2"));
        assert!(!selector_matches(Some(&labels), "a=2"));
        assert!(!selector_matches(Some(&labels), "c"));
        assert!(!selector_matches(None, "a=1"));
    }

    #[tokio::test]
    async fn test_patch_with_stale_resource_version_conflicts() {
        let mock = MockClusterClient::new();
        let stored = mock.add_claim(claim("disk"));
        let rv = stored.metadata.resource_version.clone().unwrap();
        mock.set_claim_annotation("default", "disk", "user", Some("edit"));

        let patch: BTreeMap<String, Option<String>> = [("k".to_string(), Some("v".to_string()))].into_iter().collect();
        let result = mock.patch_claim_annotations("default", "disk", &rv, &patch).await;
        assert!(matches!(result, Err(ClusterError::Conflict(_))));
        assert_eq!(mock.mutation_count(), 0);
    }

    #[tokio::test]
    async fn test_patch_of_missing_claim_is_none() {
        let mock = MockClusterClient::new();
        let patch = BTreeMap::new();
        let result = mock.patch_claim_annotations("default", "gone", "1", &patch).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_create_pod_twice_reports_already_exists() {
        let mock = MockClusterClient::new();
        let first = mock.create_pod("default", &pod("importer-disk", &[])).await.unwrap();
        assert!(matches!(first, CreateOutcome::Created(_)));
        let second = mock.create_pod("default", &pod("importer-disk", &[])).await.unwrap();
        assert!(matches!(second, CreateOutcome::AlreadyExists));
        assert_eq!(mock.pods_in("default").len(), 1);
        assert_eq!(mock.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_claim_cascades_to_owned_pods() {
        let mock = MockClusterClient::new();
        let stored = mock.add_claim(claim("disk"));
        let mut owned = pod("importer-disk", &[]);
        owned.metadata.owner_references = Some(vec![
            k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference {
                api_version: "v1".to_string(),
                kind: "PersistentVolumeClaim".to_string(),
                name: "disk".to_string(),
                uid: stored.metadata.uid.clone().unwrap(),
                ..Default::default()
            },
        ]);
        mock.add_pod(owned);
        mock.add_pod(pod("bystander", &[]));

        mock.delete_claim("default", "disk");
        assert!(mock.claim("default", "disk").is_none());
        assert_eq!(mock.pods_in("default").len(), 1);
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let mock = MockClusterClient::new();
        mock.inject_fault(Fault::Unavailable);
        assert!(matches!(mock.get_claim("default", "x").await, Err(ClusterError::Unavailable(_))));
        assert!(mock.get_claim("default", "x").await.unwrap().is_none());
    }
}
