//! Claim identity

use std::fmt;

/// Identity of a storage claim: `(namespace, name)`.
///
/// This is the only thing that travels through the work queue; everything
/// else is re-read from the cluster when the key is processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClaimKey {
    /// Claim namespace
    pub namespace: String,

    /// Claim name
    pub name: String,
}

impl ClaimKey {
    /// Creates a key from namespace and name.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClaimKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
