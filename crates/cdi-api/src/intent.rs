//! Import intent decoding
//!
//! Turns the intent annotations of a claim into an `ImportIntent`. Decoding
//! never fails: values the controller cannot act on are preserved in the
//! `Unsupported` variants so the source resolver can reject them with a
//! useful message.

use crate::annotations::{ANN_CONTENT_TYPE, ANN_ENDPOINT, ANN_SECRET, ANN_SOURCE};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use std::fmt;

/// Where the data for a claim comes from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// Blank image, nothing is fetched
    None,

    /// Plain HTTP (or HTTPS) download
    Http,

    /// HTTPS download, TLS required
    Https,

    /// Container image registry
    Registry,

    /// Data is pushed by a client through an upload endpoint
    Upload,

    /// Unrecognized `source` annotation value
    Unsupported(String),
}

impl SourceKind {
    /// Parses the `source` annotation value (case-insensitive).
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "none" | "blank" => Self::None,
            "http" => Self::Http,
            "https" => Self::Https,
            "registry" => Self::Registry,
            "upload" => Self::Upload,
            _ => Self::Unsupported(value.to_string()),
        }
    }

    /// Canonical annotation value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Http => "http",
            Self::Https => "https",
            Self::Registry => "registry",
            Self::Upload => "upload",
            Self::Unsupported(value) => value,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of payload written into the volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum ContentType {
    /// Raw or convertible virtual machine disk image
    #[default]
    Kubevirt,

    /// Tar archive extracted into the volume
    Archive,

    /// Unrecognized `contentType` annotation value
    Unsupported(String),
}

impl ContentType {
    /// Parses the `contentType` annotation value; empty means `kubevirt`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "" | "kubevirt" => Self::Kubevirt,
            "archive" => Self::Archive,
            _ => Self::Unsupported(value.to_string()),
        }
    }

    /// Canonical annotation value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Kubevirt => "kubevirt",
            Self::Archive => "archive",
            Self::Unsupported(value) => value,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a claim asks to be filled with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportIntent {
    /// Source kind
    pub source: SourceKind,

    /// Source URI (absent for `none` and `upload`)
    pub endpoint: Option<String>,

    /// Credential Secret name (absent means unauthenticated)
    pub secret: Option<String>,

    /// Payload kind
    pub content_type: ContentType,
}

impl ImportIntent {
    /// Canonical, order-stable rendering of the intent.
    ///
    /// Two intents are "the same import" exactly when their fingerprints are
    /// equal. The fingerprint is stored on the importer pod and on the claim
    /// status so intent changes survive controller restarts.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        serde_json::json!({
            "source": self.source.as_str(),
            "endpoint": self.endpoint,
            "secret": self.secret,
            "contentType": self.content_type.as_str(),
        })
        .to_string()
    }
}

/// Decodes the import intent of a claim.
///
/// Returns `None` when neither a `source` nor an `endpoint` annotation is
/// present: the claim did not ask for an import and must be left alone. An
/// endpoint without a source means `http`.
#[must_use]
pub fn decode_intent(claim: &PersistentVolumeClaim) -> Option<ImportIntent> {
    let annotations = claim.annotations();
    let value = |key: &str| {
        annotations
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let endpoint = value(ANN_ENDPOINT);
    let source = match (value(ANN_SOURCE), &endpoint) {
        (Some(source), _) => SourceKind::parse(&source),
        (None, Some(_)) => SourceKind::Http,
        (None, None) => return None,
    };

    Some(ImportIntent {
        source,
        endpoint,
        secret: value(ANN_SECRET),
        content_type: value(ANN_CONTENT_TYPE)
            .map(|v| ContentType::parse(&v))
            .unwrap_or_default(),
    })
}
