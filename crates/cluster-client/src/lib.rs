//! Cluster store client
//!
//! The import controller talks to exactly two kinds of objects: the storage
//! claims it reads intent from and writes status to, and the importer pods it
//! launches. This crate puts both behind `ClusterClientTrait` so reconciliation
//! logic can be exercised against an in-memory store.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?);
//! if let Some(claim) = client.get_claim("default", "create-image").await? {
//!     println!("claim has {} annotations", claim.metadata.annotations.map_or(0, |a| a.len()));
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::{ClusterClientTrait, CreateOutcome};
pub use error::ClusterError;
#[cfg(any(test, feature = "test-util"))]
pub use mock::{Fault, MockClusterClient};
