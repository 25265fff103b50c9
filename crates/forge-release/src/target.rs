//! Release target adapters.

use forge_core::ports::{ReleaseBundle, ReleaseTarget};
use forge_core::{Error, Result};
use std::path::PathBuf;
use tracing::info;

/// Writes the bundle under a distribution directory, one subdirectory per
/// tag. Draft bundles land in a `-draft` suffixed directory.
pub struct DirTarget {
    root: PathBuf,
}

impl DirTarget {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl ReleaseTarget for DirTarget {
    async fn publish(&self, bundle: &ReleaseBundle, draft: bool) -> Result<()> {
        let dir = if draft {
            self.root.join(format!("{}-draft", bundle.tag))
        } else {
            self.root.join(&bundle.tag)
        };
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::PublishFailed(format!("Failed to create dist dir: {}", e)))?;

        for asset in &bundle.packages {
            let path = dir.join(&asset.file_name);
            tokio::fs::write(&path, &asset.data)
                .await
                .map_err(|e| Error::PublishFailed(format!("Failed to write asset: {}", e)))?;
            info!(file = %path.display(), "release asset written");
        }
        Ok(())
    }
}

/// Uploads each asset to an HTTP endpoint.
pub struct HttpTarget {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpTarget {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait::async_trait]
impl ReleaseTarget for HttpTarget {
    async fn publish(&self, bundle: &ReleaseBundle, draft: bool) -> Result<()> {
        for asset in &bundle.packages {
            let mut request = self
                .client
                .post(&self.endpoint)
                .query(&[
                    ("tag", bundle.tag.as_str()),
                    ("name", asset.file_name.as_str()),
                    ("draft", if draft { "true" } else { "false" }),
                ])
                .body(asset.data.clone());
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Error::PublishFailed(e.to_string()))?;
            response
                .error_for_status()
                .map_err(|e| Error::PublishFailed(e.to_string()))?;
            info!(name = %asset.file_name, "release asset uploaded");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::ports::PackagedAsset;

    #[tokio::test]
    async fn test_dir_target_writes_assets_per_tag() {
        let root = tempfile::tempdir().unwrap();
        let target = DirTarget::new(root.path());
        let bundle = ReleaseBundle {
            tag: "v1.2.3".to_string(),
            packages: vec![PackagedAsset {
                platform: "linux".to_string(),
                file_name: "app-linux.tar.gz".to_string(),
                data: vec![1, 2, 3],
            }],
        };

        target.publish(&bundle, false).await.unwrap();
        let written = std::fs::read(root.path().join("v1.2.3/app-linux.tar.gz")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);

        target.publish(&bundle, true).await.unwrap();
        assert!(root.path().join("v1.2.3-draft/app-linux.tar.gz").exists());
    }
}
