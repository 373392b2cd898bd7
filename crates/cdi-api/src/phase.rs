//! Importer pod phase

use std::fmt;

/// Phase of an importer pod, mirrored onto its claim.
///
/// `Pending -> Running -> {Succeeded, Failed}`. Kubernetes also reports
/// `Unknown` when a node stops talking to the API server; that value has no
/// variant here on purpose and parses to `None`, which callers must treat as
/// "look again later" rather than as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportPhase {
    /// Pod accepted, containers not yet running
    Pending,

    /// Import in progress
    Running,

    /// Import finished successfully
    Succeeded,

    /// Import failed
    Failed,
}

impl ImportPhase {
    /// Parses a Kubernetes pod phase string.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(Self::Pending),
            "Running" => Some(Self::Running),
            "Succeeded" => Some(Self::Succeeded),
            "Failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Annotation value for this phase.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        }
    }

    /// Whether no further transition happens without new intent.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
