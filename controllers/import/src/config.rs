//! Controller configuration
//!
//! All settings come from environment variables; the binary takes no flags.
//! Import behavior itself is driven entirely by claim annotations.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_IMPORTER_IMAGE: &str = "kubevirt/cdi-importer:latest";
const DEFAULT_PULL_POLICY: &str = "IfNotPresent";
const DEFAULT_WORKER_COUNT: u16 = 4;
const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8080";

/// Runtime configuration of the Import Controller.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch (`None` watches all namespaces)
    pub watch_namespace: Option<String>,
    /// Importer container image
    pub importer_image: String,
    /// Importer image pull policy
    pub pull_policy: String,
    /// Number of claims reconciled concurrently
    pub worker_count: u16,
    /// Listen address of the health/readiness probes
    pub probe_addr: SocketAddr,
    /// Re-poll interval while a pod reports no usable phase
    pub phase_poll_interval: Duration,
}

impl ControllerConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let watch_namespace = lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty());
        let importer_image = lookup("IMPORTER_IMAGE")
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| DEFAULT_IMPORTER_IMAGE.to_string());

        let pull_policy = lookup("IMPORTER_PULL_POLICY").unwrap_or_else(|| DEFAULT_PULL_POLICY.to_string());
        if !matches!(pull_policy.as_str(), "Always" | "IfNotPresent" | "Never") {
            return Err(ControllerError::InvalidConfig(format!(
                "IMPORTER_PULL_POLICY must be Always, IfNotPresent or Never, got {pull_policy:?}"
            )));
        }

        let worker_count = parse_positive(&lookup, "WORKER_COUNT", DEFAULT_WORKER_COUNT)?;

        let probe_addr = lookup("PROBE_ADDR")
            .unwrap_or_else(|| DEFAULT_PROBE_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ControllerError::InvalidConfig(format!("PROBE_ADDR is not a socket address: {e}")))?;

        Ok(Self {
            watch_namespace,
            importer_image,
            pull_policy,
            worker_count,
            probe_addr,
            phase_poll_interval: Duration::from_secs(10),
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &str, default: u16) -> Result<u16, ControllerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u16>() {
            Ok(0) | Err(_) => Err(ControllerError::InvalidConfig(format!(
                "{key} must be a positive integer, got {raw:?}"
            ))),
            Ok(value) => Ok(value),
        },
    }
}
