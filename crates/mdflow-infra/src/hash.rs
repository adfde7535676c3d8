//! SHA-256 content hashing for the ingestion cache and change detection.
//!
//! Implements the `ContentHasher` trait from `mdflow-core` using the
//! `sha2` crate (RustCrypto ecosystem).

use sha2::{Digest, Sha256};

use mdflow_core::hash::ContentHasher;

/// SHA-256 implementation of `ContentHasher`.
///
/// Computes lowercase hex-encoded SHA-256 digests of raw source text.
pub struct Sha256ContentHasher;

impl Sha256ContentHasher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Sha256ContentHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentHasher for Sha256ContentHasher {
    fn compute_hash(&self, content: &str) -> String {
        format!("{:x}", Sha256::digest(content.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash_known_value() {
        let hash = Sha256ContentHasher::new().compute_hash("");
        assert_eq!(
            hash,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_hash_is_lowercase_hex() {
        let hash = Sha256ContentHasher::new().compute_hash("# Build\n## Steps\n- Compile\n");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_sha256_hash_sensitive_to_whitespace() {
        let hasher = Sha256ContentHasher::new();
        assert_eq!(hasher.compute_hash("a\n"), hasher.compute_hash("a\n"));
        assert_ne!(hasher.compute_hash("a\n"), hasher.compute_hash("a\r\n"));
    }
}
