//! Data Transfer Objects
//!
//! Lightweight descriptions passed from source adapters to the process
//! supervisor. Nothing here is executed directly.

pub mod command;
