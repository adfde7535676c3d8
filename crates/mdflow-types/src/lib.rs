//! Shared domain types for mdflow.
//!
//! This crate contains the plain data structures of the ingestion pipeline:
//! the parsed markdown `Document`, the executable `WorkflowGraph`, validation
//! reports, option/config records, and the pipeline error types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod document;
pub mod error;
pub mod graph;
pub mod validation;
