//! Parse -> convert pipeline fronted by the ingestion cache.
//!
//! The content hash is computed first. On a cache hit the stored graph is
//! returned without invoking the parser; on a miss the document is parsed,
//! converted, and the result stored under its hash.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use mdflow_types::config::{ConversionOptions, ParseOptions};
use mdflow_types::error::{ConversionError, ParseError};
use mdflow_types::graph::WorkflowGraph;
use serde::Serialize;
use thiserror::Error;

use crate::cache::IngestionCache;
use crate::converter::{self, complexity};
use crate::hash::ContentHasher;
use crate::parser::Parser;

/// Failure of one ingestion attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IngestError {
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("conversion failed: {0}")]
    Conversion(#[from] ConversionError),
}

#[derive(Debug, Default)]
struct PipelineStats {
    parses: AtomicU64,
    cache_hits: AtomicU64,
    parse_failures: AtomicU64,
    conversion_failures: AtomicU64,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Parser invocations.
    pub parses: u64,
    pub cache_hits: u64,
    pub parse_failures: u64,
    pub conversion_failures: u64,
}

pub struct IngestionPipeline {
    parser: Parser,
    conversion: ConversionOptions,
    cache: Arc<IngestionCache>,
    hasher: Arc<dyn ContentHasher>,
    stats: PipelineStats,
}

impl IngestionPipeline {
    pub fn new(hasher: Arc<dyn ContentHasher>) -> Self {
        Self {
            parser: Parser::new(Arc::clone(&hasher)),
            conversion: ConversionOptions::default(),
            cache: Arc::new(IngestionCache::new()),
            hasher,
            stats: PipelineStats::default(),
        }
    }

    pub fn with_options(mut self, parse: ParseOptions, conversion: ConversionOptions) -> Self {
        self.parser = self.parser.with_options(parse);
        self.conversion = conversion;
        self
    }

    /// Share an existing cache instead of the pipeline's own.
    pub fn with_cache(mut self, cache: Arc<IngestionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<IngestionCache> {
        &self.cache
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    pub fn conversion_options(&self) -> &ConversionOptions {
        &self.conversion
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            parses: self.stats.parses.load(Ordering::Relaxed),
            cache_hits: self.stats.cache_hits.load(Ordering::Relaxed),
            parse_failures: self.stats.parse_failures.load(Ordering::Relaxed),
            conversion_failures: self.stats.conversion_failures.load(Ordering::Relaxed),
        }
    }

    /// Ingest content, optionally attributed to a source path.
    ///
    /// Byte-identical content always yields the same `Arc` instance while the
    /// cache entry lives. The graph's `source` is the path of the first
    /// ingestion that produced the entry.
    pub fn ingest(
        &self,
        source: Option<&Path>,
        content: &str,
    ) -> Result<Arc<WorkflowGraph>, IngestError> {
        let hash = self.hasher.compute_hash(content);

        if let Some(graph) = self.cache.get(&hash) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            if let Some(path) = source {
                self.cache.associate(path, &hash);
            }
            tracing::debug!(hash = %hash, path = ?source, "ingestion cache hit");
            return Ok(graph);
        }

        self.stats.parses.fetch_add(1, Ordering::Relaxed);
        let document = self.parser.parse_source(content, source).inspect_err(|_| {
            self.stats.parse_failures.fetch_add(1, Ordering::Relaxed);
        })?;

        let estimate = complexity::estimate(&document);
        tracing::debug!(
            hash = %hash,
            score = estimate.score,
            steps = estimate.step_count,
            max_chain_depth = estimate.max_chain_depth,
            "complexity estimate"
        );

        let graph = converter::convert(&document, &self.conversion).inspect_err(|e| {
            self.stats.conversion_failures.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(hash = %hash, phase = %e.phase(), error = %e, "conversion failed");
        })?;

        let graph = self.cache.insert(graph);
        if let Some(path) = source {
            self.cache.associate(path, &graph.content_hash);
        }
        tracing::info!(
            hash = %graph.content_hash,
            path = ?source,
            steps = graph.steps.len(),
            edges = graph.edges.len(),
            warnings = graph.warnings.len(),
            "workflow ingested"
        );
        Ok(graph)
    }

    /// Read `path` and ingest its content.
    pub fn ingest_file(&self, path: &Path) -> Result<Arc<WorkflowGraph>, IngestError> {
        let content = self.parser.read_source(path)?;
        self.ingest(Some(path), &content)
    }

    /// Drop the cache association of a path that no longer exists.
    pub fn forget(&self, path: &Path) {
        if let Some(hash) = self.cache.forget_path(path) {
            tracing::debug!(path = %path.display(), hash = %hash, "forgot cached workflow");
        }
    }
}

impl std::fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("parse_options", self.parser.options())
            .field("conversion", &self.conversion)
            .field("cached", &self.cache.len())
            .finish()
    }
}
