//! Google Cloud Build source
//!
//! Queries `gcloud builds list` for every run whose `BRANCH_NAME`
//! substitution is one of the watched branches.

use chrono::{DateTime, Utc};
use cistat_core::domain::build::{Build, Step};
use cistat_core::domain::status::BuildStatus;
use cistat_core::dto::command::FetchCommand;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Result, SourceError};
use crate::{SourceAdapter, SourceSettings, short_sha, watched_branches};

/// Source adapter backed by the `gcloud` CLI
#[derive(Debug, Clone, Default)]
pub struct CloudBuildSource {
    settings: SourceSettings,
}

impl CloudBuildSource {
    pub fn new(settings: SourceSettings) -> Self {
        Self { settings }
    }

    /// Builds the `--filter` expression for the watched branches
    ///
    /// Branch membership uses `=(...)`, which matches any listed value exactly.
    pub fn filter(&self, branch: &str, extra_branches: &[String]) -> String {
        let branches = watched_branches(branch, extra_branches)
            .into_iter()
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ");
        let membership = format!("substitutions.BRANCH_NAME=({})", branches);

        match &self.settings.repository {
            Some(repo) => format!("substitutions.REPO_NAME={} AND {}", quote(repo), membership),
            None => membership,
        }
    }
}

impl SourceAdapter for CloudBuildSource {
    fn name(&self) -> &'static str {
        "cloud-build"
    }

    fn build_command(&self, branch: &str, extra_branches: &[String]) -> FetchCommand {
        let mut command = FetchCommand::new("gcloud").args(["builds", "list", "--format=json"]);
        if let Some(project) = &self.settings.project {
            command = command.arg(format!("--project={}", project));
        }
        if let Some(region) = &self.settings.region {
            command = command.arg(format!("--region={}", region));
        }
        if let Some(limit) = self.settings.limit {
            command = command.arg(format!("--limit={}", limit));
        }
        command.arg(format!("--filter={}", self.filter(branch, extra_branches)))
    }

    fn try_parse(&self, raw: &str) -> Result<Vec<Build>> {
        if raw.trim().is_empty() {
            return Err(SourceError::EmptyResponse);
        }

        let runs: Vec<RawBuild> = serde_json::from_str(raw)?;
        Ok(runs.into_iter().filter_map(RawBuild::into_build).collect())
    }
}

/// Maps the Cloud Build status vocabulary onto the canonical status
pub fn map_status(raw: &str) -> BuildStatus {
    match raw {
        "PENDING" | "QUEUED" => BuildStatus::Queued,
        "WORKING" => BuildStatus::InProgress,
        "SUCCESS" => BuildStatus::Success,
        "FAILURE" | "INTERNAL_ERROR" | "TIMEOUT" | "CANCELLED" | "EXPIRED" => BuildStatus::Failed,
        _ => BuildStatus::Unknown,
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// One run as printed by `gcloud builds list --format=json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBuild {
    #[serde(default)]
    status: String,
    #[serde(default)]
    log_url: String,
    create_time: Option<DateTime<Utc>>,
    start_time: Option<DateTime<Utc>>,
    finish_time: Option<DateTime<Utc>>,
    #[serde(default)]
    steps: Vec<RawStep>,
    #[serde(default)]
    substitutions: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    #[serde(default)]
    status: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: Vec<String>,
    timing: Option<RawTiming>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTiming {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

impl RawBuild {
    fn into_build(self) -> Option<Build> {
        let Some(branch) = self.substitutions.get("BRANCH_NAME").cloned() else {
            debug!("Skipping Cloud Build run without BRANCH_NAME");
            return None;
        };

        // Queued runs have no startTime yet
        let Some(start_time) = self.start_time.or(self.create_time) else {
            debug!("Skipping Cloud Build run for {} without a start time", branch);
            return None;
        };

        let commit_ref = match self.substitutions.get("SHORT_SHA") {
            Some(sha) => sha.clone(),
            None => self
                .substitutions
                .get("COMMIT_SHA")
                .map(|sha| short_sha(sha))
                .unwrap_or_default(),
        };

        let steps = self.steps.into_iter().map(RawStep::into_step).collect();

        Some(
            Build::new(branch, map_status(&self.status), start_time, self.finish_time)
                .with_steps(steps)
                .with_log_url(self.log_url)
                .with_commit_ref(commit_ref),
        )
    }
}

impl RawStep {
    fn into_step(self) -> Step {
        let (start_time, end_time) = match self.timing {
            Some(timing) => (timing.start_time, timing.end_time),
            None => (None, None),
        };

        Step {
            status: map_status(&self.status),
            start_time,
            end_time,
            action: describe_step(&self.name, &self.args),
        }
    }
}

/// `gcr.io/cloud-builders/docker` + `["build", "."]` becomes `docker build .`
fn describe_step(name: &str, args: &[String]) -> String {
    let builder = name.rsplit('/').next().unwrap_or(name);
    std::iter::once(builder)
        .chain(args.iter().map(String::as_str))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
