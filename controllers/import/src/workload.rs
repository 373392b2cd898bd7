//! Importer pod rendering
//!
//! Turns a resolved `WorkloadSpec` into the concrete `Pod` that runs the
//! importer for a claim, and reads back the few facts the controller needs
//! from an existing pod (intent fingerprint, phase, claim binding).

use crate::error::ControllerError;
use crate::source::{WorkloadSource, WorkloadSpec};
use cdi_api::{
    importer_pod_name, ImportPhase, ANN_WORKLOAD_INTENT, APP_NAME, CDI_COMPONENT_IMPORTER, LABEL_APP, LABEL_CDI,
    LABEL_CLAIM_UID, LABEL_PROMETHEUS, METRICS_CONTAINER_PORT, METRICS_PORT_NAME,
};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimVolumeSource, Pod, PodSpec,
    SecretVolumeSource, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;
use std::collections::BTreeMap;

const CONTAINER_NAME: &str = "importer";
const DATA_VOLUME: &str = "cdi-data-vol";
const DATA_MOUNT_PATH: &str = "/data";
const CREDENTIALS_VOLUME: &str = "cdi-import-credentials";
const CREDENTIALS_MOUNT_PATH: &str = "/var/run/secrets/cdi-import";
const UPLOAD_PORT_NAME: &str = "upload";
const UPLOAD_CONTAINER_PORT: i32 = 8080;

/// Static part of every importer pod, taken from controller configuration.
#[derive(Debug, Clone)]
pub struct ImporterTemplate {
    pub image: String,
    pub pull_policy: String,
}

impl ImporterTemplate {
    #[must_use]
    pub fn new(image: impl Into<String>, pull_policy: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            pull_policy: pull_policy.into(),
        }
    }

    /// Renders the importer pod for `claim`.
    ///
    /// The pod is named deterministically, labelled with the claim uid, and
    /// owned by the claim so deleting the claim garbage-collects it.
    pub fn render(&self, claim: &PersistentVolumeClaim, spec: &WorkloadSpec) -> Result<Pod, ControllerError> {
        let claim_name = claim.name_any();
        let uid = claim.uid().ok_or(ControllerError::MissingObjectKey(".metadata.uid"))?;
        let pod_name = importer_pod_name(&claim_name, &uid);

        let labels = BTreeMap::from([
            (LABEL_APP.to_string(), APP_NAME.to_string()),
            (LABEL_CDI.to_string(), CDI_COMPONENT_IMPORTER.to_string()),
            (LABEL_CLAIM_UID.to_string(), uid.clone()),
            (LABEL_PROMETHEUS.to_string(), String::new()),
        ]);
        let annotations = BTreeMap::from([(ANN_WORKLOAD_INTENT.to_string(), spec.fingerprint.clone())]);

        let owner = OwnerReference {
            api_version: "v1".to_string(),
            kind: "PersistentVolumeClaim".to_string(),
            name: claim_name.clone(),
            uid,
            controller: Some(true),
            block_owner_deletion: Some(true),
        };

        let mut ports = vec![ContainerPort {
            name: Some(METRICS_PORT_NAME.to_string()),
            container_port: METRICS_CONTAINER_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }];
        if spec.source == WorkloadSource::Upload {
            ports.push(ContainerPort {
                name: Some(UPLOAD_PORT_NAME.to_string()),
                container_port: UPLOAD_CONTAINER_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            });
        }

        let mut volumes = vec![Volume {
            name: DATA_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim_name.clone(),
                read_only: Some(false),
            }),
            ..Default::default()
        }];
        let mut mounts = vec![VolumeMount {
            name: DATA_VOLUME.to_string(),
            mount_path: DATA_MOUNT_PATH.to_string(),
            ..Default::default()
        }];
        let mut env = importer_env(claim, spec);

        if let Some(secret) = spec.source.credentials() {
            volumes.push(Volume {
                name: CREDENTIALS_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(secret.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            });
            mounts.push(VolumeMount {
                name: CREDENTIALS_VOLUME.to_string(),
                mount_path: CREDENTIALS_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            });
            env.push(env_var("IMPORTER_CREDENTIALS_DIR", CREDENTIALS_MOUNT_PATH));
        }

        Ok(Pod {
            metadata: ObjectMeta {
                name: Some(pod_name),
                namespace: claim.namespace(),
                labels: Some(labels),
                annotations: Some(annotations),
                owner_references: Some(vec![owner]),
                ..Default::default()
            },
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                containers: vec![Container {
                    name: CONTAINER_NAME.to_string(),
                    image: Some(self.image.clone()),
                    image_pull_policy: Some(self.pull_policy.clone()),
                    env: Some(env),
                    ports: Some(ports),
                    volume_mounts: Some(mounts),
                    ..Default::default()
                }],
                volumes: Some(volumes),
                ..Default::default()
            }),
            status: None,
        })
    }
}

fn env_var(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn importer_env(claim: &PersistentVolumeClaim, spec: &WorkloadSpec) -> Vec<EnvVar> {
    let (source, endpoint) = match &spec.source {
        WorkloadSource::Blank => ("none", None),
        WorkloadSource::Http { endpoint, .. } => ("http", Some(endpoint.to_string())),
        WorkloadSource::Registry { image, .. } => ("registry", Some(image.clone())),
        WorkloadSource::Upload => ("upload", None),
    };

    let mut env = vec![
        env_var("IMPORTER_SOURCE", source),
        env_var("IMPORTER_CONTENTTYPE", spec.content_type.as_str()),
    ];
    if let Some(endpoint) = endpoint {
        env.push(env_var("IMPORTER_ENDPOINT", endpoint));
    }
    if let Some(size) = requested_storage(claim) {
        env.push(env_var("IMPORTER_IMAGE_SIZE", size));
    }
    env
}

fn requested_storage(claim: &PersistentVolumeClaim) -> Option<String> {
    claim
        .spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|quantity| quantity.0.clone())
}

/// Intent fingerprint an importer pod was rendered from.
#[must_use]
pub fn workload_intent(pod: &Pod) -> Option<&str> {
    pod.annotations().get(ANN_WORKLOAD_INTENT).map(String::as_str)
}

/// Phase reported for a pod; `Unknown` and absent map to `None`.
#[must_use]
pub fn workload_phase(pod: &Pod) -> Option<ImportPhase> {
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .and_then(ImportPhase::parse)
}

/// Whether the pod is labelled as the importer of the claim with `claim_uid`.
#[must_use]
pub fn is_bound_to(pod: &Pod, claim_uid: &str) -> bool {
    pod.labels().get(LABEL_CLAIM_UID).map(String::as_str) == Some(claim_uid)
}
