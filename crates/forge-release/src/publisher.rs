//! The release publisher.

use crate::package;
use forge_core::ports::{ArtifactStore, ReleaseBundle, ReleaseTarget};
use forge_core::run::PackageSummary;
use forge_core::workflow::ReleaseSpec;
use forge_core::{Error, Result};
use std::sync::Arc;
use tracing::info;

/// Collects artifacts, packages every required platform, and publishes the
/// complete bundle. Never publishes partially: any missing artifact or
/// package fails with [`Error::IncompleteRelease`] naming the platform,
/// before the external target is invoked.
pub struct ReleasePublisher {
    artifacts: Arc<dyn ArtifactStore>,
    target: Arc<dyn ReleaseTarget>,
}

impl ReleasePublisher {
    pub fn new(artifacts: Arc<dyn ArtifactStore>, target: Arc<dyn ReleaseTarget>) -> Self {
        Self { artifacts, target }
    }

    pub async fn publish(&self, spec: &ReleaseSpec, tag: &str) -> Result<Vec<PackageSummary>> {
        let mut packages = Vec::with_capacity(spec.platforms.len());
        for platform in &spec.platforms {
            let files = self
                .artifacts
                .download(&platform.artifact)
                .await
                .map_err(|e| e.into_release_error(&platform.label))?;
            let asset = package::package(platform, &files)?;
            info!(
                platform = %platform.label,
                file = %asset.file_name,
                size = asset.data.len(),
                "packaged release asset"
            );
            packages.push(asset);
        }

        // Assert completeness before the external publish call.
        for platform in &spec.platforms {
            if !packages.iter().any(|p| p.platform == platform.label) {
                return Err(Error::IncompleteRelease(platform.label.clone()));
            }
        }

        let bundle = ReleaseBundle {
            tag: tag.to_string(),
            packages,
        };
        self.target.publish(&bundle, spec.draft).await?;
        info!(tag, platforms = bundle.packages.len(), draft = spec.draft, "release published");

        Ok(bundle.packages.iter().map(|p| p.summary()).collect())
    }
}
