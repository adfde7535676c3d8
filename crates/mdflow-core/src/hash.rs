//! ContentHasher trait for computing content fingerprints.
//!
//! Defined in mdflow-core so the parser and the ingestion cache can hash
//! source text without coupling to a specific algorithm. The
//! `Sha256ContentHasher` adapter lives in mdflow-infra.

/// Abstraction over content hashing.
///
/// The digest is both the ingestion cache key and the watcher's
/// change-detection fingerprint, so it must be stable across runs.
pub trait ContentHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given content.
    fn compute_hash(&self, content: &str) -> String;
}
