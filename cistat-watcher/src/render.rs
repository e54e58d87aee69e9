//! Render interface
//!
//! The watcher does no layout. It tells the host, per watched branch, what
//! is cached and whether a fetch is in flight; views carry the values a
//! status display needs with runtimes already computed.

use chrono::{DateTime, Duration, Utc};
use cistat_core::domain::build::{Build, Step};
use cistat_core::domain::session::SessionId;
use cistat_core::domain::status::BuildStatus;
use serde::{Serialize, Serializer};
use tracing::info;

/// Implemented by the host UI
pub trait Renderer: Send + Sync {
    /// Called with the cached builds of one watched branch
    ///
    /// # Arguments
    /// * `session_id` - The session the branch belongs to
    /// * `branch` - The watched branch
    /// * `builds` - Cached builds, possibly empty
    /// * `fetch_in_progress` - Whether a fetch is live for the session
    fn notify(&self, session_id: SessionId, branch: &str, builds: &[Build], fetch_in_progress: bool);
}

/// A build as it should be displayed at a given instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildView {
    pub branch: String,
    pub status: BuildStatus,

    /// Finished runtime, or live estimate for unfinished builds
    #[serde(rename = "runtime_secs", serialize_with = "as_seconds")]
    pub runtime: Duration,
    pub steps: Vec<StepView>,
    pub log_url: String,
    pub commit_ref: String,
}

impl BuildView {
    /// Snapshots a build, computing runtimes against `now`
    pub fn at(build: &Build, now: DateTime<Utc>) -> Self {
        Self {
            branch: build.branch.clone(),
            status: build.status,
            runtime: build.runtime(now),
            steps: build.steps.iter().map(|step| StepView::at(step, now)).collect(),
            log_url: build.log_url.clone(),
            commit_ref: build.commit_ref.clone(),
        }
    }
}

/// A step as it should be displayed at a given instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepView {
    pub status: BuildStatus,

    /// `None` for steps that have not started
    #[serde(rename = "runtime_secs", serialize_with = "as_optional_seconds")]
    pub runtime: Option<Duration>,
    pub action: String,
}

impl StepView {
    pub fn at(step: &Step, now: DateTime<Utc>) -> Self {
        Self {
            status: step.status,
            runtime: step.runtime(now),
            action: step.action.clone(),
        }
    }
}

fn as_seconds<S: Serializer>(runtime: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_i64(runtime.num_seconds())
}

fn as_optional_seconds<S: Serializer>(
    runtime: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match runtime {
        Some(runtime) => serializer.serialize_some(&runtime.num_seconds()),
        None => serializer.serialize_none(),
    }
}

/// Formats a runtime as `1h02m03s`, `2m05s` or `42s`
pub fn format_runtime(runtime: Duration) -> String {
    let total = runtime.num_seconds().max(0);
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}h{:02}m{:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Renderer that only logs, for headless hosts
#[derive(Debug, Clone, Default)]
pub struct TracingRenderer;

impl Renderer for TracingRenderer {
    fn notify(&self, session_id: SessionId, branch: &str, builds: &[Build], fetch_in_progress: bool) {
        let now = Utc::now();
        if builds.is_empty() {
            info!(
                "[{}] {}: no builds{}",
                session_id,
                branch,
                if fetch_in_progress { " (fetching)" } else { "" }
            );
            return;
        }

        for build in builds {
            let view = BuildView::at(build, now);
            info!(
                "[{}] {}: {} after {} ({}) {}{}",
                session_id,
                branch,
                view.status,
                format_runtime(view.runtime),
                view.commit_ref,
                view.log_url,
                if fetch_in_progress { " (fetching)" } else { "" }
            );
        }
    }
}
