//! Source resolution
//!
//! Validates an `ImportIntent` and turns it into the `WorkloadSpec` the
//! importer pod is rendered from. Every `ResolveError` is a configuration
//! problem with the claim: it is recorded as `Failed` and never retried until
//! the intent changes.

use cdi_api::{ContentType, ImportIntent, SourceKind};
use thiserror::Error;
use url::Url;

/// Why an intent cannot be turned into a workload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unsupported import source {0:?}")]
    UnsupportedSource(String),

    #[error("source {0} requires an endpoint")]
    MissingEndpoint(SourceKind),

    #[error("malformed endpoint {endpoint:?}: {reason}")]
    MalformedEndpoint { endpoint: String, reason: String },

    // `source` is reserved by thiserror for the error cause
    #[error("content type {content_type:?} is not supported for source {kind}")]
    UnsupportedContentType { kind: SourceKind, content_type: String },
}

/// Where the importer reads its data from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkloadSource {
    /// Write a blank disk image
    Blank,

    /// Download over HTTP(S)
    Http {
        endpoint: Url,
        credentials: Option<String>,
    },

    /// Pull a disk image out of a container image
    Registry {
        image: String,
        credentials: Option<String>,
    },

    /// Serve an upload endpoint and wait for a client push
    Upload,
}

impl WorkloadSource {
    /// Credential Secret the importer needs mounted, if any.
    #[must_use]
    pub fn credentials(&self) -> Option<&str> {
        match self {
            Self::Http { credentials, .. } | Self::Registry { credentials, .. } => credentials.as_deref(),
            Self::Blank | Self::Upload => None,
        }
    }
}

/// Everything needed to render the importer pod of a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub source: WorkloadSource,
    pub content_type: ContentType,
    /// Fingerprint of the intent this spec was resolved from
    pub fingerprint: String,
}

/// Resolves an import intent into a workload specification.
pub fn resolve(intent: &ImportIntent) -> Result<WorkloadSpec, ResolveError> {
    let source = match &intent.source {
        SourceKind::None => WorkloadSource::Blank,
        SourceKind::Http => WorkloadSource::Http {
            endpoint: parse_endpoint(intent, &["http", "https"])?,
            credentials: intent.secret.clone(),
        },
        SourceKind::Https => WorkloadSource::Http {
            endpoint: parse_endpoint(intent, &["https"])?,
            credentials: intent.secret.clone(),
        },
        SourceKind::Registry => {
            let endpoint = parse_endpoint(intent, &["docker"])?;
            WorkloadSource::Registry {
                image: endpoint.to_string(),
                credentials: intent.secret.clone(),
            }
        }
        SourceKind::Upload => WorkloadSource::Upload,
        SourceKind::Unsupported(kind) => return Err(ResolveError::UnsupportedSource(kind.clone())),
    };

    match (&intent.content_type, &source) {
        (ContentType::Kubevirt, _) | (ContentType::Archive, WorkloadSource::Http { .. }) => {}
        (content_type, _) => {
            return Err(ResolveError::UnsupportedContentType {
                kind: intent.source.clone(),
                content_type: content_type.as_str().to_string(),
            })
        }
    }

    Ok(WorkloadSpec {
        source,
        content_type: intent.content_type.clone(),
        fingerprint: intent.fingerprint(),
    })
}

fn parse_endpoint(intent: &ImportIntent, schemes: &[&str]) -> Result<Url, ResolveError> {
    let raw = intent
        .endpoint
        .as_deref()
        .ok_or_else(|| ResolveError::MissingEndpoint(intent.source.clone()))?;
    let malformed = |reason: String| ResolveError::MalformedEndpoint {
        endpoint: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| malformed(e.to_string()))?;
    if !schemes.contains(&url.scheme()) {
        return Err(malformed(format!(
            "scheme {:?} not allowed for source {}, expected one of {}",
            url.scheme(),
            intent.source,
            schemes.join(", ")
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(malformed("endpoint has no host".to_string()));
    }
    Ok(url)
}
