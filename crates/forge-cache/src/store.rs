//! Cache store adapters.
//!
//! Both adapters implement the same resolution policy: exact key first, then
//! restore-key prefixes in the caller-declared order, taking the most
//! recently written entry within a prefix. Saves overwrite the exact key
//! only (last-writer-wins).

use crate::archive::{self, CompressionKind};
use crate::keys::sanitize_key;
use forge_core::ports::{CacheRestoreRequest, CacheSaveRequest, CacheStore, RestoreOutcome};
use forge_core::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory cache store.
///
/// Tracks key resolution only; the engine never inspects cached blobs, so
/// nothing is materialized. Recency is an explicit write generation rather
/// than a timestamp, so "most recent within a prefix" is exact even for
/// writes within the same clock tick.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<(String, String), MemoryEntry>>,
    generation: AtomicU64,
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    generation: u64,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all scopes.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl CacheStore for MemoryCacheStore {
    async fn restore(&self, request: &CacheRestoreRequest) -> Result<RestoreOutcome> {
        let entries = self.entries.read().await;

        let exact = (request.scope.clone(), request.key.clone());
        if entries.contains_key(&exact) {
            debug!(key = %request.key, "cache exact hit");
            return Ok(RestoreOutcome {
                matched_key: Some(request.key.clone()),
                exact: true,
            });
        }

        for prefix in &request.restore_keys {
            let best = entries
                .iter()
                .filter(|((scope, key), _)| scope == &request.scope && key.starts_with(prefix))
                .max_by_key(|(_, entry)| entry.generation);
            if let Some(((_, key), _)) = best {
                debug!(key = %request.key, matched = %key, "cache prefix hit");
                return Ok(RestoreOutcome {
                    matched_key: Some(key.clone()),
                    exact: false,
                });
            }
        }

        debug!(key = %request.key, "cache miss");
        Ok(RestoreOutcome::default())
    }

    async fn save(&self, request: &CacheSaveRequest) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write().await;
        entries.insert(
            (request.scope.clone(), request.key.clone()),
            MemoryEntry { generation },
        );
        Ok(())
    }
}

/// Filesystem cache store, durable across runs.
///
/// Entries live under `<root>/<scope>/<sanitized key>` as compressed tar
/// blobs of the declared paths; recency for prefix fallback is the blob's
/// modification time.
pub struct FsCacheStore {
    root: PathBuf,
    compression: CompressionKind,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            compression: CompressionKind::Zstd,
        }
    }

    pub fn with_compression(mut self, compression: CompressionKind) -> Self {
        self.compression = compression;
        self
    }

    fn scope_dir(&self, scope: &str) -> PathBuf {
        self.root.join(sanitize_key(scope))
    }

    async fn unpack_into(&self, blob_path: PathBuf, workspace: PathBuf) -> Result<()> {
        let compression = self.compression;
        tokio::task::spawn_blocking(move || {
            let file = std::fs::File::open(&blob_path)?;
            archive::unpack(std::io::BufReader::new(file), &workspace, compression)
        })
        .await
        .map_err(|e| Error::CacheStorage(e.to_string()))?
    }
}

#[async_trait::async_trait]
impl CacheStore for FsCacheStore {
    async fn restore(&self, request: &CacheRestoreRequest) -> Result<RestoreOutcome> {
        let dir = self.scope_dir(&request.scope);

        let exact = dir.join(sanitize_key(&request.key));
        if tokio::fs::try_exists(&exact).await.unwrap_or(false) {
            self.unpack_into(exact, request.workspace.clone()).await?;
            return Ok(RestoreOutcome {
                matched_key: Some(request.key.clone()),
                exact: true,
            });
        }

        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(RestoreOutcome::default());
        }

        for prefix in &request.restore_keys {
            let wanted = sanitize_key(prefix);
            let mut best: Option<(String, std::time::SystemTime)> = None;

            let mut read_dir = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| Error::CacheStorage(format!("Failed to read cache dir: {}", e)))?;
            while let Some(entry) = read_dir
                .next_entry()
                .await
                .map_err(|e| Error::CacheStorage(format!("Failed to read cache entry: {}", e)))?
            {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.starts_with(&wanted) {
                    continue;
                }
                let modified = entry
                    .metadata()
                    .await
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                if best.as_ref().is_none_or(|(_, at)| modified > *at) {
                    best = Some((name, modified));
                }
            }

            if let Some((name, _)) = best {
                self.unpack_into(dir.join(&name), request.workspace.clone())
                    .await?;
                return Ok(RestoreOutcome {
                    matched_key: Some(name),
                    exact: false,
                });
            }
        }

        Ok(RestoreOutcome::default())
    }

    async fn save(&self, request: &CacheSaveRequest) -> Result<()> {
        let dir = self.scope_dir(&request.scope);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::CacheStorage(format!("Failed to create cache dir: {}", e)))?;

        let paths = request.paths.clone();
        let workspace = request.workspace.clone();
        let compression = self.compression;
        let blob = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut blob = Vec::new();
            archive::pack(&mut blob, &paths, &workspace, compression)?;
            Ok(blob)
        })
        .await
        .map_err(|e| Error::CacheStorage(e.to_string()))??;

        let target = dir.join(sanitize_key(&request.key));
        tokio::fs::write(&target, blob)
            .await
            .map_err(|e| Error::CacheStorage(format!("Failed to write cache blob: {}", e)))?;
        debug!(key = %request.key, path = %target.display(), "cache saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn restore_request(key: &str, restore_keys: &[&str]) -> CacheRestoreRequest {
        CacheRestoreRequest {
            scope: "linux".to_string(),
            key: key.to_string(),
            restore_keys: restore_keys.iter().map(|s| s.to_string()).collect(),
            paths: vec![],
            workspace: PathBuf::from("."),
        }
    }

    fn save_request(key: &str) -> CacheSaveRequest {
        CacheSaveRequest {
            scope: "linux".to_string(),
            key: key.to_string(),
            paths: vec![],
            workspace: PathBuf::from("."),
        }
    }

    #[tokio::test]
    async fn test_exact_match_wins_over_prefixes() {
        let store = MemoryCacheStore::new();
        store.save(&save_request("deps-v1-aaa")).await.unwrap();
        store.save(&save_request("deps-v1-bbb")).await.unwrap();

        let outcome = store
            .restore(&restore_request("deps-v1-aaa", &["deps-v1-", "deps-"]))
            .await
            .unwrap();
        assert!(outcome.exact);
        assert_eq!(outcome.matched_key.as_deref(), Some("deps-v1-aaa"));
    }

    #[tokio::test]
    async fn test_prefix_fallback_returns_most_recent() {
        let store = MemoryCacheStore::new();
        store.save(&save_request("deps-v1-old")).await.unwrap();
        store.save(&save_request("deps-v1-new")).await.unwrap();

        let outcome = store
            .restore(&restore_request("deps-v1-missing", &["deps-v1-"]))
            .await
            .unwrap();
        assert!(outcome.is_hit());
        assert!(!outcome.exact);
        assert_eq!(outcome.matched_key.as_deref(), Some("deps-v1-new"));
    }

    #[tokio::test]
    async fn test_prefixes_tried_in_declared_order() {
        let store = MemoryCacheStore::new();
        store.save(&save_request("deps-v0-xyz")).await.unwrap();
        store.save(&save_request("tools-abc")).await.unwrap();

        // "deps-v1-" has no match; "deps-" does, ahead of "tools-".
        let outcome = store
            .restore(&restore_request("deps-v1-zzz", &["deps-v1-", "deps-", "tools-"]))
            .await
            .unwrap();
        assert_eq!(outcome.matched_key.as_deref(), Some("deps-v0-xyz"));
    }

    #[tokio::test]
    async fn test_miss_is_not_an_error() {
        let store = MemoryCacheStore::new();
        let outcome = store
            .restore(&restore_request("deps-v1-abc", &["deps-"]))
            .await
            .unwrap();
        assert!(!outcome.is_hit());
        assert!(outcome.matched_key.is_none());
    }

    #[tokio::test]
    async fn test_save_after_miss_then_exact_hit() {
        let store = MemoryCacheStore::new();
        let miss = store.restore(&restore_request("deps-v1-abc", &[])).await.unwrap();
        assert!(!miss.is_hit());

        store.save(&save_request("deps-v1-abc")).await.unwrap();
        store.save(&save_request("deps-v1-abc")).await.unwrap(); // overwrite is safe

        let hit = store.restore(&restore_request("deps-v1-abc", &[])).await.unwrap();
        assert!(hit.exact);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_scopes_are_isolated() {
        let store = MemoryCacheStore::new();
        store.save(&save_request("deps-v1-abc")).await.unwrap();

        let mut request = restore_request("deps-v1-abc", &["deps-"]);
        request.scope = "macos".to_string();
        let outcome = store.restore(&request).await.unwrap();
        assert!(!outcome.is_hit());
    }

    #[tokio::test]
    async fn test_fs_store_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(workspace.path().join("target")).unwrap();
        std::fs::write(workspace.path().join("target/dep.rlib"), b"bits").unwrap();

        let store = FsCacheStore::new(root.path());
        store
            .save(&CacheSaveRequest {
                scope: "linux".to_string(),
                key: "deps-v1-abc".to_string(),
                paths: vec![PathBuf::from("target")],
                workspace: workspace.path().to_path_buf(),
            })
            .await
            .unwrap();

        let restored_into = tempfile::tempdir().unwrap();
        let outcome = store
            .restore(&CacheRestoreRequest {
                scope: "linux".to_string(),
                key: "deps-v1-abc".to_string(),
                restore_keys: vec![],
                paths: vec![PathBuf::from("target")],
                workspace: restored_into.path().to_path_buf(),
            })
            .await
            .unwrap();

        assert!(outcome.exact);
        let bits = std::fs::read(restored_into.path().join("target/dep.rlib")).unwrap();
        assert_eq!(bits, b"bits");
    }
}
