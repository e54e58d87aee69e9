//! Cistat Core
//!
//! Core types and abstractions for the cistat build-status watcher.
//!
//! This crate contains:
//! - Domain types: the canonical build model every CI provider maps into
//! - DTOs: descriptions handed between the source adapters and the watcher

pub mod domain;
pub mod dto;
