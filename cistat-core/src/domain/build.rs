//! Build domain types
//!
//! A `Build` is one CI run for a branch, normalized from whatever the provider
//! returned. Runtimes are always computed on demand against a caller-supplied
//! `now`, so a running build's estimate is fresh on every render.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::status::BuildStatus;

/// One unit of work inside a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub status: BuildStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Human-readable description of what the step runs
    pub action: String,
}

impl Step {
    /// Elapsed runtime of the step
    ///
    /// Returns `None` when the step has not started; a started but unfinished
    /// step is measured against `now`.
    pub fn runtime(&self, now: DateTime<Utc>) -> Option<Duration> {
        let start = self.start_time?;
        Some(elapsed(start, self.end_time, now))
    }
}

/// One CI run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub branch: String,
    pub status: BuildStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub steps: Vec<Step>,
    pub log_url: String,

    /// Short commit reference (e.g. 7-character SHA)
    pub commit_ref: String,
}

impl Build {
    /// Creates a build without steps
    ///
    /// An `end_time` earlier than `start_time` is clamped to `start_time`.
    pub fn new(
        branch: impl Into<String>,
        status: BuildStatus,
        start_time: DateTime<Utc>,
        end_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            branch: branch.into(),
            status,
            start_time,
            end_time: end_time.map(|end| end.max(start_time)),
            steps: Vec::new(),
            log_url: String::new(),
            commit_ref: String::new(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_log_url(mut self, log_url: impl Into<String>) -> Self {
        self.log_url = log_url.into();
        self
    }

    pub fn with_commit_ref(mut self, commit_ref: impl Into<String>) -> Self {
        self.commit_ref = commit_ref.into();
        self
    }

    /// Elapsed runtime: `end - start` when finished, otherwise `now - start`
    pub fn runtime(&self, now: DateTime<Utc>) -> Duration {
        elapsed(self.start_time, self.end_time, now)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

fn elapsed(start: DateTime<Utc>, end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    let until = end.unwrap_or(now);
    (until - start).max(Duration::zero())
}
