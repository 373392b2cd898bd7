//! Claim annotation keys
//!
//! Intent keys are only ever read by the controller; status keys are only
//! ever written by it. The two sets are disjoint so a status write can never
//! be mistaken for a new import request.

use crate::phase::ImportPhase;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use std::collections::BTreeMap;

/// Source URI to import from
pub const ANN_ENDPOINT: &str = "cdi.kubevirt.io/storage.import.endpoint";

/// Source kind (`none`, `http`, `https`, `registry`, `upload`)
pub const ANN_SOURCE: &str = "cdi.kubevirt.io/storage.import.source";

/// Name of a Secret holding credentials for the source
pub const ANN_SECRET: &str = "cdi.kubevirt.io/storage.import.secretName";

/// Payload kind (`kubevirt` or `archive`)
pub const ANN_CONTENT_TYPE: &str = "cdi.kubevirt.io/storage.contentType";

/// Last observed importer pod phase
pub const ANN_POD_PHASE: &str = "cdi.kubevirt.io/storage.pod.phase";

/// Name of the importer pod bound to the claim
pub const ANN_IMPORT_POD: &str = "cdi.kubevirt.io/storage.import.importPodName";

/// Fingerprint of the intent the status annotations describe
pub const ANN_OBSERVED_INTENT: &str = "cdi.kubevirt.io/storage.import.observedIntent";

/// Annotations read as import intent.
pub const INTENT_ANNOTATIONS: [&str; 4] = [ANN_ENDPOINT, ANN_SOURCE, ANN_SECRET, ANN_CONTENT_TYPE];

/// Annotations written as import status.
pub const STATUS_ANNOTATIONS: [&str; 3] = [ANN_POD_PHASE, ANN_IMPORT_POD, ANN_OBSERVED_INTENT];

/// Annotation changes to apply to a claim.
///
/// `Some(value)` sets the key, `None` removes it. Serializes directly into the
/// `metadata.annotations` object of a JSON merge patch.
pub type AnnotationPatch = BTreeMap<String, Option<String>>;

/// Encodes a mirrored phase as an annotation patch.
///
/// `None` (unknown or not yet reported) removes the phase annotation so a
/// stale terminal value never outlives the workload it described.
#[must_use]
pub fn encode_status(phase: Option<ImportPhase>) -> AnnotationPatch {
    let mut patch = AnnotationPatch::new();
    patch.insert(ANN_POD_PHASE.to_string(), phase.map(|p| p.as_str().to_string()));
    patch
}

/// Drops every entry of `patch` that the claim already satisfies.
///
/// An empty result means the write would be a no-op.
#[must_use]
pub fn pending_changes(claim: &PersistentVolumeClaim, patch: &AnnotationPatch) -> AnnotationPatch {
    let current = claim.annotations();
    patch
        .iter()
        .filter(|(key, desired)| current.get(key.as_str()) != desired.as_ref())
        .map(|(key, desired)| (key.clone(), desired.clone()))
        .collect()
}

/// Phase currently recorded on the claim, if it parses.
#[must_use]
pub fn recorded_phase(claim: &PersistentVolumeClaim) -> Option<ImportPhase> {
    claim
        .annotations()
        .get(ANN_POD_PHASE)
        .and_then(|value| ImportPhase::parse(value))
}

/// Intent fingerprint the recorded status refers to.
#[must_use]
pub fn recorded_intent(claim: &PersistentVolumeClaim) -> Option<&str> {
    claim.annotations().get(ANN_OBSERVED_INTENT).map(String::as_str)
}
