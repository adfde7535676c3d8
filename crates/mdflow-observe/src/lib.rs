//! Observability setup for mdflow hosts.

pub mod tracing_setup;
