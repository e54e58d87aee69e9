//! Service layer
//!
//! The pieces a poll cycle is assembled from: the process supervisor that
//! runs the provider command, the aggregator that collapses its results, and
//! the cache the results land in.

mod aggregator;
mod cache;
mod supervisor;

pub use aggregator::dedup_latest;
pub use cache::BuildCache;
pub use supervisor::{
    CommandOutput, CommandRunner, OnComplete, OnSpawn, ProcessSupervisor, TokioCommandRunner,
};
