//! GitHub Actions source
//!
//! Queries `gh run list` for the watched branch. Workflow runs listed this
//! way carry no job or step detail, so every build has an empty step list.

use chrono::{DateTime, Utc};
use cistat_core::domain::build::Build;
use cistat_core::domain::status::BuildStatus;
use cistat_core::dto::command::FetchCommand;
use serde::Deserialize;

use crate::error::{Result, SourceError};
use crate::{SourceAdapter, SourceSettings, short_sha};

const JSON_FIELDS: &str = "headBranch,headSha,url,status,conclusion,createdAt,updatedAt";

/// Source adapter backed by the `gh` CLI
#[derive(Debug, Clone, Default)]
pub struct GithubActionsSource {
    settings: SourceSettings,
}

impl GithubActionsSource {
    pub fn new(settings: SourceSettings) -> Self {
        Self { settings }
    }
}

impl SourceAdapter for GithubActionsSource {
    fn name(&self) -> &'static str {
        "github-actions"
    }

    /// `gh run list` takes a single `--branch`, so only the watched branch is
    /// queried; extra branches are ignored by this provider.
    fn build_command(&self, branch: &str, _extra_branches: &[String]) -> FetchCommand {
        let mut command = FetchCommand::new("gh")
            .args(["run", "list", "--branch"])
            .arg(branch)
            .args(["--json", JSON_FIELDS]);
        if let Some(repo) = &self.settings.repository {
            command = command.arg("--repo").arg(repo.as_str());
        }
        if let Some(limit) = self.settings.limit {
            command = command.arg("--limit").arg(limit.to_string());
        }
        command
    }

    fn try_parse(&self, raw: &str) -> Result<Vec<Build>> {
        if raw.trim().is_empty() {
            return Err(SourceError::EmptyResponse);
        }

        let runs: Vec<RawRun> = serde_json::from_str(raw)?;
        Ok(runs.into_iter().map(RawRun::into_build).collect())
    }
}

/// Maps a run's `status` and `conclusion` onto the canonical status
pub fn map_status(status: &str, conclusion: &str) -> BuildStatus {
    match status {
        "queued" | "requested" | "waiting" | "pending" => BuildStatus::Queued,
        "in_progress" => BuildStatus::InProgress,
        "completed" => map_conclusion(conclusion),
        _ => BuildStatus::Unknown,
    }
}

fn map_conclusion(conclusion: &str) -> BuildStatus {
    match conclusion {
        "success" | "neutral" | "skipped" => BuildStatus::Success,
        "failure" | "cancelled" | "timed_out" | "startup_failure" | "action_required"
        | "stale" => BuildStatus::Failed,
        _ => BuildStatus::Unknown,
    }
}

/// One run as printed by `gh run list --json ...`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRun {
    head_branch: String,
    #[serde(default)]
    head_sha: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    status: String,
    conclusion: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl RawRun {
    fn into_build(self) -> Build {
        let status = map_status(&self.status, self.conclusion.as_deref().unwrap_or_default());
        // updatedAt only marks the finish once the run has completed
        let end_time = if self.status == "completed" {
            self.updated_at
        } else {
            None
        };

        Build::new(self.head_branch, status, self.created_at, end_time)
            .with_log_url(self.url)
            .with_commit_ref(short_sha(&self.head_sha))
    }
}
