//! Terminal renderer
//!
//! Prints the cached builds of each watched branch with colored statuses.

use chrono::{DateTime, Utc};
use cistat_core::domain::build::Build;
use cistat_core::domain::session::SessionId;
use cistat_core::domain::status::BuildStatus;
use cistat_watcher::{BuildView, Renderer, StepView, format_runtime};
use colored::*;
use tokio::sync::mpsc;

/// One render callback, forwarded to the command loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEvent {
    pub branch: String,
    pub fetch_in_progress: bool,
}

/// Prints builds to stdout
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    events: Option<mpsc::UnboundedSender<RenderEvent>>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also reports every callback on the given channel
    pub fn with_events(events: mpsc::UnboundedSender<RenderEvent>) -> Self {
        Self {
            events: Some(events),
        }
    }
}

impl Renderer for TerminalRenderer {
    fn notify(&self, _session_id: SessionId, branch: &str, builds: &[Build], fetch_in_progress: bool) {
        for line in branch_lines(branch, builds, fetch_in_progress, Utc::now()) {
            println!("{}", line);
        }

        if let Some(events) = &self.events {
            let _ = events.send(RenderEvent {
                branch: branch.to_string(),
                fetch_in_progress,
            });
        }
    }
}

/// Lines describing one branch
pub fn branch_lines(
    branch: &str,
    builds: &[Build],
    fetch_in_progress: bool,
    now: DateTime<Utc>,
) -> Vec<String> {
    let fetching = if fetch_in_progress {
        format!(" {}", "(fetching…)".dimmed())
    } else {
        String::new()
    };

    if builds.is_empty() {
        return vec![format!(
            "{} {} {}{}",
            "▸".cyan(),
            branch.bold(),
            "no builds".dimmed(),
            fetching
        )];
    }

    let mut lines = Vec::new();
    for build in builds {
        let view = BuildView::at(build, now);
        let commit = if view.commit_ref.is_empty() {
            String::new()
        } else {
            format!(" {}", view.commit_ref.dimmed())
        };

        lines.push(format!(
            "{} {} {} {}{}{}",
            "▸".cyan(),
            branch.bold(),
            colorize_status(view.status),
            format_runtime(view.runtime),
            commit,
            fetching
        ));

        for step in &view.steps {
            lines.push(step_line(step));
        }

        if !view.log_url.is_empty() {
            lines.push(format!("    {}", view.log_url.dimmed()));
        }
    }
    lines
}

fn step_line(step: &StepView) -> String {
    let runtime = step.runtime.map(format_runtime).unwrap_or_default();
    format!(
        "    {} {} {}",
        status_marker(step.status),
        step.action,
        runtime.dimmed()
    )
}

fn status_marker(status: BuildStatus) -> ColoredString {
    match status {
        BuildStatus::Success => "✓".green(),
        BuildStatus::Failed => "✗".red(),
        BuildStatus::InProgress => "●".cyan(),
        BuildStatus::Queued => "○".yellow(),
        BuildStatus::Unknown => "?".dimmed(),
    }
}

/// Colorize build status for display
fn colorize_status(status: BuildStatus) -> ColoredString {
    let status_str = status.as_str().to_uppercase();
    match status {
        BuildStatus::Queued => status_str.yellow(),
        BuildStatus::InProgress => status_str.cyan(),
        BuildStatus::Success => status_str.green(),
        BuildStatus::Failed => status_str.red(),
        BuildStatus::Unknown => status_str.dimmed(),
    }
}
