//! Scheduler layer for the watcher
//!
//! This layer drives poll cycles: it starts fetches through the process
//! supervisor, folds completed fetches into the session cache, notifies the
//! renderer, and keeps re-polling while any build is still running.

pub mod delay;
pub mod poller;

pub use delay::{FixedDelay, Immediate, PollDelay};
pub use poller::{BuildPoller, needs_repoll};
