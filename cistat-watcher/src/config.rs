//! Watcher configuration
//!
//! Defines the provider selection and polling parameters a host hands to
//! the watcher. Values come from code, from the environment, or both.

use cistat_source::{SourceKind, SourceSettings};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::scheduler::{FixedDelay, Immediate, PollDelay};

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("limit must be greater than 0")]
    ZeroLimit,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Which CI provider to query
    pub provider: SourceKind,

    /// Repository name, provider specific
    pub repository: Option<String>,

    /// Cloud project (Cloud Build only)
    pub project: Option<String>,

    /// Cloud region (Cloud Build only)
    pub region: Option<String>,

    /// Maximum number of runs requested per fetch
    pub limit: Option<u32>,

    /// Branches watched alongside the current one, e.g. master or preview
    pub extra_branches: Vec<String>,

    /// Wait between a non-terminal result and the next fetch
    pub poll_delay: Duration,
}

impl WatcherConfig {
    /// Creates a new configuration for the provider with defaults
    pub fn new(provider: SourceKind) -> Self {
        Self {
            provider,
            repository: None,
            project: None,
            region: None,
            limit: None,
            extra_branches: Vec::new(),
            poll_delay: Duration::ZERO,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables (all optional):
    /// - CISTAT_PROVIDER (cloud-build | github-actions, default: cloud-build)
    /// - CISTAT_REPO
    /// - CISTAT_PROJECT
    /// - CISTAT_REGION
    /// - CISTAT_LIMIT
    /// - CISTAT_EXTRA_BRANCHES (comma-separated)
    /// - CISTAT_POLL_DELAY_SECS (default: 0)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`WatcherConfig::from_env`] with a custom variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let provider = match var("CISTAT_PROVIDER") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "CISTAT_PROVIDER",
                value,
            })?,
            None => SourceKind::default(),
        };

        let limit = var("CISTAT_LIMIT")
            .map(|value| {
                value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                    name: "CISTAT_LIMIT",
                    value,
                })
            })
            .transpose()?;

        let poll_delay = var("CISTAT_POLL_DELAY_SECS")
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| ConfigError::InvalidValue {
                        name: "CISTAT_POLL_DELAY_SECS",
                        value,
                    })
            })
            .transpose()?
            .unwrap_or(Duration::ZERO);

        let extra_branches = var("CISTAT_EXTRA_BRANCHES")
            .map(|value| split_branches(&value))
            .unwrap_or_default();

        Ok(Self {
            provider,
            repository: var("CISTAT_REPO"),
            project: var("CISTAT_PROJECT"),
            region: var("CISTAT_REGION"),
            limit,
            extra_branches,
            poll_delay,
        })
    }

    /// Adds a branch to watch alongside the current one
    pub fn with_extra_branch(mut self, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        if !self.extra_branches.contains(&branch) {
            self.extra_branches.push(branch);
        }
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.extra_branches.iter().any(|b| b.trim().is_empty()) {
            return Err(ConfigError::Empty("extra branch"));
        }

        for (name, value) in [
            ("repository", &self.repository),
            ("project", &self.project),
            ("region", &self.region),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ConfigError::Empty(name));
            }
        }

        if self.limit == Some(0) {
            return Err(ConfigError::ZeroLimit);
        }

        Ok(())
    }

    /// Provider knobs for the selected source adapter
    pub fn source_settings(&self) -> SourceSettings {
        SourceSettings {
            repository: self.repository.clone(),
            project: self.project.clone(),
            region: self.region.clone(),
            limit: self.limit,
        }
    }

    /// Delay policy matching `poll_delay`
    pub fn poll_delay_policy(&self) -> Arc<dyn PollDelay> {
        if self.poll_delay.is_zero() {
            Arc::new(Immediate)
        } else {
            Arc::new(FixedDelay(self.poll_delay))
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::new(SourceKind::default())
    }
}

fn split_branches(value: &str) -> Vec<String> {
    let mut branches: Vec<String> = Vec::new();
    for branch in value.split(',').map(str::trim).filter(|b| !b.is_empty()) {
        if !branches.iter().any(|b| b == branch) {
            branches.push(branch.to_string());
        }
    }
    branches
}
