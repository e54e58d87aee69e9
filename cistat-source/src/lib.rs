//! Cistat Sources
//!
//! Pluggable adapters that turn a watched branch into an external CI query
//! and turn that query's raw output into canonical builds.
//!
//! Each provider implements [`SourceAdapter`]. Adding a provider means adding
//! one implementation; nothing else in the watcher needs to change.
//!
//! # Example
//!
//! ```
//! use cistat_source::{SourceKind, SourceSettings};
//!
//! let source = SourceKind::GithubActions.build(SourceSettings::default());
//! let command = source.build_command("main", &[]);
//! assert_eq!(command.program, "gh");
//! ```

mod cloud_build;
pub mod error;
mod github_actions;

// Re-export commonly used types
pub use cloud_build::CloudBuildSource;
pub use error::{Result, SourceError};
pub use github_actions::GithubActionsSource;

use cistat_core::domain::build::Build;
use cistat_core::dto::command::FetchCommand;
use std::str::FromStr;
use tracing::{debug, warn};

/// A CI provider: command builder plus response parser
pub trait SourceAdapter: Send + Sync {
    /// Short provider name used in logs
    fn name(&self) -> &'static str;

    /// Builds the command that lists builds for the watched branches
    ///
    /// # Arguments
    /// * `branch` - The branch currently being watched
    /// * `extra_branches` - Branches always watched alongside it
    fn build_command(&self, branch: &str, extra_branches: &[String]) -> FetchCommand;

    /// Parses raw command output, reporting why it could not be understood
    fn try_parse(&self, raw: &str) -> Result<Vec<Build>>;

    /// Parses raw command output into builds, in provider order
    ///
    /// Never fails: empty or malformed output yields an empty list so the
    /// cache is simply left alone for this cycle.
    fn parse_response(&self, raw: &str) -> Vec<Build> {
        match self.try_parse(raw) {
            Ok(builds) => builds,
            Err(e) if e.is_empty_response() => {
                debug!("{} returned no output", self.name());
                Vec::new()
            }
            Err(e) => {
                warn!("Discarding {} response: {}", self.name(), e);
                Vec::new()
            }
        }
    }
}

/// Provider-independent knobs passed to an adapter at configuration time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSettings {
    /// Repository name (Cloud Build `REPO_NAME`, GitHub `owner/name`)
    pub repository: Option<String>,

    /// Cloud project (Cloud Build only)
    pub project: Option<String>,

    /// Cloud region (Cloud Build only)
    pub region: Option<String>,

    /// Maximum number of runs to ask the provider for
    pub limit: Option<u32>,
}

/// Which provider to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceKind {
    #[default]
    CloudBuild,
    GithubActions,
}

impl SourceKind {
    /// Creates the adapter for this provider
    pub fn build(&self, settings: SourceSettings) -> Box<dyn SourceAdapter> {
        match self {
            SourceKind::CloudBuild => Box::new(CloudBuildSource::new(settings)),
            SourceKind::GithubActions => Box::new(GithubActionsSource::new(settings)),
        }
    }
}

impl FromStr for SourceKind {
    type Err = SourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cloud-build" | "cloudbuild" | "gcb" => Ok(SourceKind::CloudBuild),
            "github-actions" | "github" | "gh" => Ok(SourceKind::GithubActions),
            other => Err(SourceError::UnknownSource(other.to_string())),
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::CloudBuild => write!(f, "cloud-build"),
            SourceKind::GithubActions => write!(f, "github-actions"),
        }
    }
}

/// Watched branch first, then extras, without duplicates
pub fn watched_branches<'a>(branch: &'a str, extra_branches: &'a [String]) -> Vec<&'a str> {
    let mut branches = vec![branch];
    for extra in extra_branches {
        if !branches.contains(&extra.as_str()) {
            branches.push(extra.as_str());
        }
    }
    branches
}

/// First seven characters of a commit SHA
pub(crate) fn short_sha(sha: &str) -> String {
    sha.chars().take(7).collect()
}
