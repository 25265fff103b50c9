//! Cache key derivation.
//!
//! Keys are derived from dependency-manifest contents so that identical
//! manifests resolve to identical keys across runs and machines.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Derive a stable cache key from a prefix and manifest contents.
pub fn manifest_key<M: AsRef<[u8]>>(prefix: &str, manifests: &[M]) -> String {
    let mut hasher = Sha256::new();
    for manifest in manifests {
        hasher.update(manifest.as_ref());
    }
    let digest = hasher.finalize();
    format!(
        "{}-{}",
        prefix.trim_end_matches('-'),
        hex::encode(&digest[..8])
    )
}

/// Derive a cache key by hashing manifest files on disk. Unreadable paths
/// contribute nothing to the hash.
pub fn manifest_key_for_paths(prefix: &str, paths: &[&Path]) -> String {
    let contents: Vec<Vec<u8>> = paths
        .iter()
        .filter_map(|path| std::fs::read(path).ok())
        .collect();
    manifest_key(prefix, &contents)
}

/// Check if a key matches a restore-key prefix.
pub fn matches_prefix(key: &str, prefix: &str) -> bool {
    key.starts_with(prefix)
}

/// Sanitize a key for use in filenames.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_key_is_stable() {
        let a = manifest_key("deps-v1", &[b"serde = \"1\"".as_slice()]);
        let b = manifest_key("deps-v1", &[b"serde = \"1\"".as_slice()]);
        assert_eq!(a, b);
        assert!(a.starts_with("deps-v1-"));
    }

    #[test]
    fn test_manifest_key_changes_with_contents() {
        let a = manifest_key("deps-v1", &[b"serde = \"1\"".as_slice()]);
        let b = manifest_key("deps-v1", &[b"serde = \"2\"".as_slice()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_trailing_dash_in_prefix_is_collapsed() {
        let a = manifest_key("deps-", &[b"x".as_slice()]);
        let b = manifest_key("deps", &[b"x".as_slice()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_matches_prefix() {
        assert!(matches_prefix("deps-v1-abc123", "deps-v1-"));
        assert!(matches_prefix("deps-v1-abc123", "deps-"));
        assert!(!matches_prefix("tools-abc123", "deps-"));
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("my/cache/key"), "my_cache_key");
        assert_eq!(sanitize_key("cache:key"), "cache_key");
    }
}
