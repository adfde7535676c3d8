//! Infrastructure layer for mdflow.
//!
//! Adapters for the ports defined in `mdflow-core`: SHA-256 content hashing,
//! the `mdflow.toml` loader, and the debounced filesystem watcher.

pub mod config;
pub mod hash;
pub mod watcher;
