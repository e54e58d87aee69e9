//! Core domain types
//!
//! This module contains the canonical structures shared by every cistat crate.
//! Source adapters produce them, the watcher aggregates and caches them, and
//! renderers read them.

pub mod build;
pub mod session;
pub mod status;
