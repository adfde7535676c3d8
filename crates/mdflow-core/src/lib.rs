//! Markdown workflow ingestion for mdflow.
//!
//! Parser, validator, converter, and the caching pipeline that ties them
//! together, plus the handler port the file watcher drives. No filesystem
//! watching or cryptography here; those adapters live in mdflow-infra.

pub mod cache;
pub mod coerce;
pub mod converter;
pub mod dag;
pub mod hash;
pub mod ident;
pub mod parser;
pub mod pipeline;
pub mod placeholder;
pub mod registry;
pub mod validator;
pub mod watch;

pub use converter::convert;
pub use parser::{Parser, looks_like_workflow};
pub use pipeline::{IngestError, IngestionPipeline};
pub use validator::validate;
