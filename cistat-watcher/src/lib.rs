//! Cistat Watcher
//!
//! Polls a CI provider for the builds of a watched branch and keeps the
//! host informed until every build has settled.
//!
//! Architecture:
//! - Session: the watched branch, its cache and the single live fetch
//! - Services: process supervision, response aggregation, the build cache
//! - Scheduler: poll cycles and the re-poll decision
//! - Render: the interface the host implements to display builds
//!
//! # Example
//!
//! ```no_run
//! use cistat_watcher::{BuildPoller, Session, TracingRenderer, WatcherConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), cistat_watcher::config::ConfigError> {
//! let config = WatcherConfig::from_env()?.with_extra_branch("master");
//! config.validate()?;
//!
//! let poller = BuildPoller::from_config(&config, Arc::new(TracingRenderer));
//! let session = Session::new("feature-x", config.extra_branches.clone());
//! poller.refresh(&session);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod render;
pub mod scheduler;
pub mod service;
pub mod session;

pub use config::{ConfigError, WatcherConfig};
pub use render::{BuildView, Renderer, StepView, TracingRenderer, format_runtime};
pub use scheduler::{BuildPoller, FixedDelay, Immediate, PollDelay, needs_repoll};
pub use session::{FetchSession, Session, SessionHandle};
