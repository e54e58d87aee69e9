//! Configuration module
//!
//! Global CLI flags and their translation into a watcher configuration.
//! Every flag falls back to the matching `CISTAT_*` environment variable.

use anyhow::{Context, Result};
use cistat_source::SourceKind;
use cistat_watcher::WatcherConfig;
use clap::Args;
use std::time::Duration;

/// Flags shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// CI provider (cloud-build, github-actions)
    #[arg(long, global = true, env = "CISTAT_PROVIDER", default_value = "cloud-build")]
    pub provider: SourceKind,

    /// Repository name (Cloud Build REPO_NAME or GitHub owner/name)
    #[arg(long, global = true, env = "CISTAT_REPO")]
    pub repo: Option<String>,

    /// Cloud project (Cloud Build only)
    #[arg(long, global = true, env = "CISTAT_PROJECT")]
    pub project: Option<String>,

    /// Cloud region (Cloud Build only)
    #[arg(long, global = true, env = "CISTAT_REGION")]
    pub region: Option<String>,

    /// Maximum number of runs to request per fetch
    #[arg(long, global = true, env = "CISTAT_LIMIT")]
    pub limit: Option<u32>,

    /// Branch to watch alongside the current one (repeatable)
    #[arg(
        long = "extra",
        global = true,
        env = "CISTAT_EXTRA_BRANCHES",
        value_delimiter = ','
    )]
    pub extra_branches: Vec<String>,

    /// Seconds to wait before re-polling unfinished builds
    #[arg(long, global = true, env = "CISTAT_POLL_DELAY_SECS", default_value_t = 0)]
    pub poll_delay: u64,
}

impl GlobalArgs {
    /// Builds and validates the watcher configuration
    pub fn watcher_config(&self) -> Result<WatcherConfig> {
        let mut config = WatcherConfig::new(self.provider);
        config.repository = self.repo.clone();
        config.project = self.project.clone();
        config.region = self.region.clone();
        config.limit = self.limit;
        config.poll_delay = Duration::from_secs(self.poll_delay);

        let config = self
            .extra_branches
            .iter()
            .map(|branch| branch.trim())
            .filter(|branch| !branch.is_empty())
            .fold(config, |config, branch| config.with_extra_branch(branch));

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}
