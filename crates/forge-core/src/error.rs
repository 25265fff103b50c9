//! Error types for the Forge engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Definition errors
    #[error("Invalid workflow definition: {0}")]
    InvalidWorkflow(String),

    #[error("Dependency cycle detected in stage graph")]
    DependencyCycle,

    #[error("Unknown stage dependency: {0}")]
    UnknownDependency(String),

    // Step errors
    #[error("Step '{step}' failed with exit code {exit_code}")]
    StepFailed { step: String, exit_code: i32 },

    // Artifact errors
    #[error("Artifact already uploaded in this run: {0}")]
    ArtifactConflict(String),

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    // Release errors
    #[error("Release incomplete: no package for required platform '{0}'")]
    IncompleteRelease(String),

    #[error("Release publish failed: {0}")]
    PublishFailed(String),

    // Infrastructure errors
    #[error("Cache storage error: {0}")]
    CacheStorage(String),

    #[error("Executor error: {0}")]
    Executor(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
