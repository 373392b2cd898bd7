//! Importer pod labels and naming
//!
//! The importer pod of a claim is found by label selector, never by a name
//! remembered in memory, so a restarted controller rediscovers it.

/// Generic application label
pub const LABEL_APP: &str = "app";

/// Value of [`LABEL_APP`] on importer pods
pub const APP_NAME: &str = "containerized-data-importer";

/// Component label carried by every pod the controller creates
pub const LABEL_CDI: &str = "cdi.kubevirt.io";

/// Value of [`LABEL_CDI`] on importer pods
pub const CDI_COMPONENT_IMPORTER: &str = "importer";

/// Label binding an importer pod to the uid of its claim
pub const LABEL_CLAIM_UID: &str = "cdi.kubevirt.io/storage.import.claimUid";

/// Label selected by the metrics Service
pub const LABEL_PROMETHEUS: &str = "prometheus.kubevirt.io";

/// Pod annotation recording the intent fingerprint the pod was built from
pub const ANN_WORKLOAD_INTENT: &str = "cdi.kubevirt.io/storage.import.intent";

/// Selector matching every importer pod
pub const IMPORTER_SELECTOR: &str = "cdi.kubevirt.io=importer";

/// Name prefix of importer pods
pub const IMPORTER_POD_PREFIX: &str = "importer";

/// Name of the container port serving import progress metrics
pub const METRICS_PORT_NAME: &str = "metrics";

/// Container port serving import progress metrics
pub const METRICS_CONTAINER_PORT: i32 = 8443;

/// Service expected to front the metrics port of running importers
pub const METRICS_SERVICE_NAME: &str = "kubevirt-prometheus-metrics";

/// Service port of [`METRICS_SERVICE_NAME`]
pub const METRICS_SERVICE_PORT: i32 = 443;

const MAX_POD_NAME_LEN: usize = 253;

/// Characters of the claim uid appended to a truncated pod name
const UID_SUFFIX_LEN: usize = 8;

/// Deterministic importer pod name for a claim.
///
/// Two concurrent reconciliations of the same claim compute the same name,
/// so the API server rejects the second create with `AlreadyExists`.
///
/// Names that would exceed the pod name limit are cut short and suffixed
/// with the start of the claim uid, so claims sharing a long prefix still
/// get distinct pods.
#[must_use]
pub fn importer_pod_name(claim_name: &str, claim_uid: &str) -> String {
    let name = format!("{IMPORTER_POD_PREFIX}-{claim_name}");
    if name.len() <= MAX_POD_NAME_LEN {
        return name;
    }

    let suffix: String = claim_uid
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(UID_SUFFIX_LEN)
        .collect::<String>()
        .to_ascii_lowercase();
    let mut name = name;
    name.truncate(MAX_POD_NAME_LEN - suffix.len() - 1);
    // Names must end alphanumeric before the suffix is joined on
    while name.ends_with(['-', '.']) {
        name.pop();
    }
    format!("{name}-{suffix}")
}

/// Label selector matching the importer pod(s) of one claim.
#[must_use]
pub fn workload_selector(claim_uid: &str) -> String {
    format!("{IMPORTER_SELECTOR},{LABEL_CLAIM_UID}={claim_uid}")
}
