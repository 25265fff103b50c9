//! CLI configuration, from `forge.toml` and `FORGE_*` environment variables.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct ForgeConfig {
    /// Root directory for the durable cross-run cache.
    pub cache_dir: PathBuf,
    /// Directory release bundles are written to when no publish URL is set.
    pub dist_dir: PathBuf,
    /// HTTP endpoint to publish release assets to.
    pub publish_url: Option<String>,
    pub publish_token: Option<String>,
}

impl ForgeConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("cache_dir", ".forge/cache")?
            .set_default("dist_dir", ".forge/dist")?
            .add_source(config::File::from(Path::new("forge.toml")).required(false))
            .add_source(config::Environment::with_prefix("FORGE"))
            .build()?
            .try_deserialize()
    }
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".forge/cache"),
            dist_dir: PathBuf::from(".forge/dist"),
            publish_url: None,
            publish_token: None,
        }
    }
}
