//! Import Controller
//!
//! Populates `PersistentVolumeClaim`s from an import source without any
//! manual steps.
//!
//! Claims ask for data through `cdi.kubevirt.io/storage.import.*`
//! annotations. For each such claim the controller runs exactly one importer
//! pod and mirrors its phase back onto the claim as
//! `cdi.kubevirt.io/storage.pod.phase`.

mod backoff;
mod config;
mod controller;
mod error;
mod probes;
mod reconciler;
mod source;
mod status;
mod supervisor;
mod watcher;
mod workload;

#[cfg(test)]
mod reconciler_test;
#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Import Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Importer image: {} ({})", config.importer_image, config.pull_policy);
    info!("  Concurrent reconciliations: {}", config.worker_count);
    info!("  Probe address: {}", config.probe_addr);

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
