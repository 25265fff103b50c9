//! Shared fixtures and test doubles for Forge integration tests.

use forge_artifact::MemoryArtifactStore;
use forge_cache::MemoryCacheStore;
use forge_core::Result;
use forge_core::ports::{
    CommandContext, CommandOutcome, ReleaseBundle, ReleaseTarget, StepExecutor,
};
use forge_core::workflow::{
    ArchiveFormat, ArtifactDownload, ArtifactUpload, CacheUse, PlatformTarget, ReleaseSpec,
    StageDefinition, StepDefinition, WorkflowDefinition,
};
use forge_scheduler::{RecordingSink, RunCoordinator};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Executor test double: fails scripted commands, succeeds everything else,
/// and records every command it ran.
#[derive(Default)]
pub struct ScriptedExecutor {
    failing: HashSet<String>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn failing(commands: &[&str]) -> Self {
        Self {
            failing: commands.iter().map(|c| c.to_string()).collect(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Commands executed so far, in invocation order.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute(&self, ctx: &CommandContext) -> Result<CommandOutcome> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(ctx.command.clone());
        }
        let exit_code = if self.failing.contains(&ctx.command) { 1 } else { 0 };
        Ok(CommandOutcome {
            exit_code,
            duration_ms: 1,
            output: Vec::new(),
        })
    }
}

/// Release target test double recording every publish call.
#[derive(Default)]
pub struct RecordingTarget {
    bundles: Mutex<Vec<PublishedBundle>>,
}

#[derive(Debug, Clone)]
pub struct PublishedBundle {
    pub tag: String,
    pub files: Vec<(String, String)>,
    pub draft: bool,
}

impl RecordingTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bundles(&self) -> Vec<PublishedBundle> {
        self.bundles.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn was_invoked(&self) -> bool {
        !self.bundles().is_empty()
    }
}

#[async_trait::async_trait]
impl ReleaseTarget for RecordingTarget {
    async fn publish(&self, bundle: &ReleaseBundle, draft: bool) -> Result<()> {
        if let Ok(mut bundles) = self.bundles.lock() {
            bundles.push(PublishedBundle {
                tag: bundle.tag.clone(),
                files: bundle
                    .packages
                    .iter()
                    .map(|p| (p.platform.clone(), p.file_name.clone()))
                    .collect(),
                draft,
            });
        }
        Ok(())
    }
}

/// Everything a test needs to drive and inspect one engine instance.
pub struct Harness {
    pub coordinator: RunCoordinator,
    pub executor: Arc<ScriptedExecutor>,
    pub artifacts: Arc<MemoryArtifactStore>,
    pub cache: Arc<MemoryCacheStore>,
    pub target: Arc<RecordingTarget>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub fn new(executor: ScriptedExecutor, workspace: impl Into<PathBuf>) -> Self {
        let executor = Arc::new(executor);
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let cache = Arc::new(MemoryCacheStore::new());
        let target = Arc::new(RecordingTarget::new());
        let sink = Arc::new(RecordingSink::new());
        let coordinator = RunCoordinator::new(
            cache.clone(),
            artifacts.clone(),
            executor.clone(),
            target.clone(),
            sink.clone(),
        )
        .with_workspace(workspace);
        Self {
            coordinator,
            executor,
            artifacts,
            cache,
            target,
            sink,
        }
    }
}

pub fn step(name: &str, command: &str) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        condition: None,
        cache: None,
        run: Some(command.to_string()),
        upload: None,
        download: None,
    }
}

pub fn cached_step(name: &str, command: &str, key: &str, restore_keys: &[&str]) -> StepDefinition {
    let mut step = step(name, command);
    step.cache = Some(CacheUse {
        key: key.to_string(),
        restore_keys: restore_keys.iter().map(|k| k.to_string()).collect(),
        paths: vec![],
    });
    step
}

pub fn upload_step(name: &str, artifact: &str, paths: &[&str]) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        condition: None,
        cache: None,
        run: None,
        upload: Some(ArtifactUpload {
            name: artifact.to_string(),
            paths: paths.iter().map(PathBuf::from).collect(),
        }),
        download: None,
    }
}

pub fn download_step(name: &str, artifact: &str, dest: &str) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        condition: None,
        cache: None,
        run: None,
        upload: None,
        download: Some(ArtifactDownload {
            name: artifact.to_string(),
            dest: Some(PathBuf::from(dest)),
        }),
    }
}

pub fn stage(name: &str, needs: &[&str], steps: Vec<StepDefinition>) -> StageDefinition {
    StageDefinition {
        name: name.to_string(),
        needs: needs.iter().map(|s| s.to_string()).collect(),
        condition: None,
        matrix: None,
        steps,
    }
}

pub fn workflow(name: &str, stages: Vec<StageDefinition>) -> WorkflowDefinition {
    WorkflowDefinition {
        name: name.to_string(),
        variables: Default::default(),
        stages,
        release: None,
    }
}

pub fn platform(label: &str, artifact: &str) -> PlatformTarget {
    PlatformTarget {
        label: label.to_string(),
        artifact: artifact.to_string(),
        archive: if label == "windows" {
            ArchiveFormat::Zip
        } else {
            ArchiveFormat::TarGz
        },
        executable: label != "windows",
    }
}

pub fn release(needs: &[&str], platforms: Vec<PlatformTarget>) -> ReleaseSpec {
    ReleaseSpec {
        needs: needs.iter().map(|s| s.to_string()).collect(),
        platforms,
        draft: false,
    }
}
