//! In-memory artifact store scoped to one workflow run.

use chrono::{DateTime, Utc};
use forge_core::ids::JobId;
use forge_core::ports::{ArtifactFile, ArtifactStore};
use forge_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

/// Write-once artifact store.
///
/// Uploads are first-writer-wins: a second upload under the same name is
/// rejected with [`Error::ArtifactConflict`] and the first upload's content
/// is retained unchanged. Downloads only see artifacts whose producing job
/// was committed as succeeded.
#[derive(Default)]
pub struct MemoryArtifactStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    artifacts: HashMap<String, StoredArtifact>,
    committed: HashSet<JobId>,
}

struct StoredArtifact {
    files: Vec<ArtifactFile>,
    producer: JobId,
    #[allow(dead_code)]
    uploaded_at: DateTime<Utc>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn upload(&self, name: &str, files: Vec<ArtifactFile>, producer: JobId) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.artifacts.contains_key(name) {
            return Err(Error::ArtifactConflict(name.to_string()));
        }
        debug!(artifact = name, files = files.len(), "artifact uploaded");
        inner.artifacts.insert(
            name.to_string(),
            StoredArtifact {
                files,
                producer,
                uploaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<ArtifactFile>> {
        let inner = self.inner.read().await;
        let stored = inner
            .artifacts
            .get(name)
            .ok_or_else(|| Error::ArtifactNotFound(name.to_string()))?;
        if !inner.committed.contains(&stored.producer) {
            // The producing job never reached succeeded; its outputs stay
            // invisible to downstream jobs.
            return Err(Error::ArtifactNotFound(name.to_string()));
        }
        Ok(stored.files.clone())
    }

    async fn commit_job(&self, producer: JobId) -> Result<()> {
        self.inner.write().await.committed.insert(producer);
        Ok(())
    }

    async fn list(&self) -> Vec<String> {
        self.inner.read().await.artifacts.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fileset(contents: &[u8]) -> Vec<ArtifactFile> {
        vec![ArtifactFile::new("bin/app", contents).with_mode(0o755)]
    }

    #[tokio::test]
    async fn test_upload_then_download() {
        let store = MemoryArtifactStore::new();
        let producer = JobId::new();
        store
            .upload("binary-linux", fileset(b"elf"), producer)
            .await
            .unwrap();
        store.commit_job(producer).await.unwrap();

        let files = store.download("binary-linux").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].contents, b"elf");
        assert_eq!(files[0].mode, 0o755);
    }

    #[tokio::test]
    async fn test_second_upload_conflicts_and_first_content_survives() {
        let store = MemoryArtifactStore::new();
        let producer = JobId::new();
        store
            .upload("binary-linux", fileset(b"first"), producer)
            .await
            .unwrap();

        let err = store
            .upload("binary-linux", fileset(b"second"), JobId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ArtifactConflict(name) if name == "binary-linux"));

        store.commit_job(producer).await.unwrap();
        let files = store.download("binary-linux").await.unwrap();
        assert_eq!(files[0].contents, b"first");
    }

    #[tokio::test]
    async fn test_download_missing_artifact() {
        let store = MemoryArtifactStore::new();
        let err = store.download("nope").await.unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound(name) if name == "nope"));
    }

    #[tokio::test]
    async fn test_uncommitted_producer_is_invisible() {
        let store = MemoryArtifactStore::new();
        store
            .upload("binary-linux", fileset(b"elf"), JobId::new())
            .await
            .unwrap();

        // Producer never reached succeeded.
        let err = store.download("binary-linux").await.unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound(_)));
    }
}
