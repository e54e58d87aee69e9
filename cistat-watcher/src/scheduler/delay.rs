//! Inter-poll delay policies

use cistat_core::domain::build::Build;
use std::collections::BTreeMap;
use std::time::Duration;

/// Decides how long to wait before re-polling non-terminal builds
pub trait PollDelay: Send + Sync {
    /// Delay before the next automatic fetch
    ///
    /// # Arguments
    /// * `latest` - The aggregated builds of the fetch that just completed
    fn next_delay(&self, latest: &BTreeMap<String, Build>) -> Duration;
}

/// Re-poll as soon as the previous fetch completes
///
/// The external command's own latency is the only throttle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Immediate;

impl PollDelay for Immediate {
    fn next_delay(&self, _latest: &BTreeMap<String, Build>) -> Duration {
        Duration::ZERO
    }
}

/// Wait a fixed time between automatic fetches
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay(pub Duration);

impl PollDelay for FixedDelay {
    fn next_delay(&self, _latest: &BTreeMap<String, Build>) -> Duration {
        self.0
    }
}
