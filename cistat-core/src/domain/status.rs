//! Canonical build status

use serde::{Deserialize, Serialize};

/// Status every provider vocabulary is mapped into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildStatus {
    /// Accepted by the provider but not started yet
    Queued,

    /// Currently running
    InProgress,

    /// Finished successfully
    Success,

    /// Finished unsuccessfully (failure, timeout, cancellation, ...)
    Failed,

    /// The provider reported something we could not interpret
    Unknown,
}

impl BuildStatus {
    /// Returns true for statuses that end polling for a build
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failed)
    }

    /// Canonical lowercase spelling, as used by `Display` and serde
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::InProgress => "in-progress",
            BuildStatus::Success => "success",
            BuildStatus::Failed => "failed",
            BuildStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
