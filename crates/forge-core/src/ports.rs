//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the engine core and external
//! adapters: cache storage, artifact transfer, command execution, release
//! publication, and event observation.

use crate::events::Event;
use crate::ids::JobId;
use crate::run::PackageSummary;
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Observer for engine lifecycle events. Delivery is in-process and
/// synchronous; a bus adapter can fan out from here.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that drops every event.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: Event) {}
}

/// Request to restore cached state before a step runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRestoreRequest {
    /// Namespace for cache isolation (carries the job's OS axis).
    pub scope: String,
    /// Primary cache key; an exact match always wins.
    pub key: String,
    /// Fallback prefixes, most specific first.
    pub restore_keys: Vec<String>,
    /// Paths the cached state unpacks into.
    pub paths: Vec<PathBuf>,
    pub workspace: PathBuf,
}

/// Request to save cached state after a step ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSaveRequest {
    pub scope: String,
    pub key: String,
    pub paths: Vec<PathBuf>,
    pub workspace: PathBuf,
}

/// How a restore request resolved. A miss is a cold start, not an error.
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    /// The key that matched (may be a restore-key prefix match).
    pub matched_key: Option<String>,
    pub exact: bool,
}

impl RestoreOutcome {
    pub fn is_hit(&self) -> bool {
        self.matched_key.is_some()
    }
}

/// Cache storage: exact-key match first, then prefix fallback in declared
/// order, newest entry within a prefix. Saves are last-writer-wins on the
/// exact key only.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn restore(&self, request: &CacheRestoreRequest) -> Result<RestoreOutcome>;

    async fn save(&self, request: &CacheSaveRequest) -> Result<()>;
}

/// One file inside an artifact, with its unix mode preserved across the
/// store so packaging semantics survive machine boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub mode: u32,
}

impl ArtifactFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
            mode: 0o644,
        }
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }
}

/// Per-run, write-once artifact transfer between isolated jobs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store a named fileset. Fails with [`Error::ArtifactConflict`] if the
    /// name was already uploaded in this run; the first upload's content is
    /// retained unchanged.
    async fn upload(&self, name: &str, files: Vec<ArtifactFile>, producer: JobId) -> Result<()>;

    /// Fetch a named fileset. Fails with [`Error::ArtifactNotFound`] if the
    /// name is absent or the producing job did not reach succeeded.
    async fn download(&self, name: &str) -> Result<Vec<ArtifactFile>>;

    /// Mark a producer job as succeeded, making its artifacts downloadable.
    async fn commit_job(&self, producer: JobId) -> Result<()>;

    /// Names uploaded so far, in no particular order.
    async fn list(&self) -> Vec<String>;
}

/// Context for one external command invocation.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub command: String,
    pub workspace: PathBuf,
    pub env: HashMap<String, String>,
}

/// Captured output line from a command.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Result of one external command invocation. The engine only schedules and
/// observes exit codes; what the command did is opaque.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub duration_ms: u64,
    pub output: Vec<OutputLine>,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executor for the opaque external commands steps declare.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandOutcome>;
}

/// A packaged per-platform release asset.
#[derive(Debug, Clone)]
pub struct PackagedAsset {
    pub platform: String,
    pub file_name: String,
    pub data: Vec<u8>,
}

impl PackagedAsset {
    pub fn summary(&self) -> PackageSummary {
        PackageSummary {
            platform: self.platform.clone(),
            file_name: self.file_name.clone(),
            size_bytes: self.data.len() as u64,
        }
    }
}

/// The complete set of packages for one release. Always full, never partial:
/// the publisher asserts completeness before constructing this.
#[derive(Debug, Clone)]
pub struct ReleaseBundle {
    pub tag: String,
    pub packages: Vec<PackagedAsset>,
}

/// External distribution target for release bundles.
#[async_trait]
pub trait ReleaseTarget: Send + Sync {
    async fn publish(&self, bundle: &ReleaseBundle, draft: bool) -> Result<()>;
}

impl Error {
    /// Attribute an artifact lookup failure to the release phase.
    pub fn into_release_error(self, platform: &str) -> Error {
        match self {
            Error::ArtifactNotFound(_) => Error::IncompleteRelease(platform.to_string()),
            other => other,
        }
    }
}
