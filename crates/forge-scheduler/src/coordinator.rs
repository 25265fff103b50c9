//! Run coordination.
//!
//! The coordinator owns one `WorkflowRun` from trigger decision to terminal
//! status. It is a pure scheduler: commands, cache blobs, artifact contents
//! and release uploads all live behind ports. Stages with no dependency
//! relation are dispatched concurrently; jobs within a stage run fully in
//! parallel; steps within a job are strictly sequential.

use crate::dag::StageDag;
use crate::matrix::{ExpandedJob, MatrixExpander};
use crate::triggers::{TriggerDecision, TriggerEvaluator};
use chrono::Utc;
use forge_core::condition::EvalContext;
use forge_core::events::*;
use forge_core::ids::{JobId, RunId};
use forge_core::ports::{
    ArtifactFile, ArtifactStore, CacheRestoreRequest, CacheSaveRequest, CacheStore,
    CommandContext, EventSink, ReleaseTarget, StepExecutor,
};
use forge_core::run::{
    CacheOutcome, JobResult, JobStatus, ReleaseResult, RunStatus, StageResult, StageStatus,
    StepResult, StepStatus, TriggerEvent, WorkflowRun,
};
use forge_core::workflow::{StageDefinition, StepDefinition, WorkflowDefinition};
use forge_core::{Error, Result};
use forge_release::ReleasePublisher;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Shared adapter handles, cheap to clone into stage tasks.
#[derive(Clone)]
struct EngineHandles {
    cache: Arc<dyn CacheStore>,
    artifacts: Arc<dyn ArtifactStore>,
    executor: Arc<dyn StepExecutor>,
    release_target: Arc<dyn ReleaseTarget>,
    events: Arc<dyn EventSink>,
}

/// Drives a workflow definition through one complete run.
pub struct RunCoordinator {
    handles: EngineHandles,
    trigger: TriggerEvaluator,
    workspace: PathBuf,
    variables: HashMap<String, String>,
}

impl RunCoordinator {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        artifacts: Arc<dyn ArtifactStore>,
        executor: Arc<dyn StepExecutor>,
        release_target: Arc<dyn ReleaseTarget>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            handles: EngineHandles {
                cache,
                artifacts,
                executor,
                release_target,
                events,
            },
            trigger: TriggerEvaluator::new(),
            workspace: PathBuf::from("."),
            variables: HashMap::new(),
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.variables = variables;
        self
    }

    /// Execute one run for an inbound event.
    ///
    /// Graph-build failures (cycles, unknown dependencies) abort before any
    /// job starts. Everything that happens after that is recorded in the
    /// returned run, attributed to the stage or job that caused it.
    pub async fn execute(
        &self,
        definition: &WorkflowDefinition,
        event: TriggerEvent,
    ) -> Result<WorkflowRun> {
        let dag = StageDag::build(definition)?;
        if let Some(release) = &definition.release {
            for need in &release.needs {
                if definition.stage(need).is_none() {
                    return Err(Error::UnknownDependency(need.clone()));
                }
            }
        }

        let decision = self.trigger.evaluate(&event);
        let run_id = RunId::new();
        let started_at = Utc::now();

        if !decision.fire {
            info!(workflow = %definition.name, git_ref = %event.git_ref, "event does not fire a run");
            return Ok(WorkflowRun {
                id: run_id,
                workflow_name: definition.name.clone(),
                event,
                release_eligible: false,
                status: RunStatus::NotTriggered,
                stages: Vec::new(),
                release: None,
                started_at,
                completed_at: Some(started_at),
                duration_ms: Some(0),
            });
        }

        self.handles.events.emit(Event::RunStarted(RunStartedPayload {
            run_id,
            workflow_name: definition.name.clone(),
            event: event.clone(),
            release_eligible: decision.release_eligible,
            started_at,
        }));

        let mut variables = definition.variables.clone();
        variables.extend(self.variables.clone());

        let mut statuses: HashMap<String, StageStatus> = dag
            .stages()
            .iter()
            .map(|node| (node.name.clone(), StageStatus::Pending))
            .collect();
        let mut results: HashMap<String, StageResult> = HashMap::new();
        let mut running: HashSet<String> = HashSet::new();
        let mut join_set: JoinSet<(String, StageResult)> = JoinSet::new();

        loop {
            // Propagate skip-on-failure transitively before dispatching.
            loop {
                let mut changed = false;
                for node in dag.stages() {
                    if statuses[&node.name] != StageStatus::Pending {
                        continue;
                    }
                    let blocked = dag
                        .predecessors(&node.name)
                        .iter()
                        .any(|pred| statuses[*pred].blocks_dependents());
                    if blocked {
                        statuses.insert(node.name.clone(), StageStatus::SkippedOnFailure);
                        results.insert(
                            node.name.clone(),
                            StageResult::skipped(&node.name, StageStatus::SkippedOnFailure),
                        );
                        self.emit_stage_completed(run_id, &node.name, StageStatus::SkippedOnFailure);
                        changed = true;
                    }
                }
                if !changed {
                    break;
                }
            }

            // Dispatch every ready stage; no artificial ordering among them.
            let satisfied: HashSet<String> = statuses
                .iter()
                .filter(|(_, status)| status.satisfies_dependents())
                .map(|(name, _)| name.clone())
                .collect();
            for node in dag.stages() {
                if statuses[&node.name] != StageStatus::Pending
                    || !dag.is_ready(&node.name, &satisfied)
                {
                    continue;
                }
                statuses.insert(node.name.clone(), StageStatus::Running);
                running.insert(node.name.clone());

                let name = node.name.clone();
                let stage = node.definition.clone();
                let ctx = self.base_context(&event, &statuses);
                let handles = self.handles.clone();
                let workspace = self.workspace.clone();
                let vars = variables.clone();
                join_set.spawn(async move {
                    let result = run_stage(handles, run_id, stage, ctx, workspace, vars).await;
                    (name, result)
                });
            }

            if join_set.is_empty() {
                break;
            }

            match join_set.join_next().await {
                Some(Ok((name, result))) => {
                    running.remove(&name);
                    statuses.insert(name.clone(), result.status);
                    self.emit_stage_completed(run_id, &name, result.status);
                    results.insert(name, result);
                }
                Some(Err(e)) => {
                    return Err(Error::Internal(format!("stage task failed: {}", e)));
                }
                None => break,
            }
        }

        let release = self
            .run_release_phase(definition, &event, decision, run_id, &statuses)
            .await;

        let mut stages: Vec<StageResult> = definition
            .stages
            .iter()
            .filter_map(|s| results.remove(&s.name))
            .collect();
        for stage in &mut stages {
            if stage.status == StageStatus::Failed && stage.error.is_none() {
                stage.error = Some("one or more jobs failed".to_string());
            }
        }

        let any_failed = stages.iter().any(|s| s.status == StageStatus::Failed)
            || release
                .as_ref()
                .is_some_and(|r| r.status == StageStatus::Failed);
        let status = if any_failed {
            RunStatus::Failed
        } else {
            RunStatus::Succeeded
        };

        let completed_at = Utc::now();
        let duration_ms = (completed_at - started_at).num_milliseconds().max(0) as u64;
        self.handles
            .events
            .emit(Event::RunCompleted(RunCompletedPayload {
                run_id,
                workflow_name: definition.name.clone(),
                status,
                duration_ms,
                completed_at,
            }));

        Ok(WorkflowRun {
            id: run_id,
            workflow_name: definition.name.clone(),
            event,
            release_eligible: decision.release_eligible,
            status,
            stages,
            release,
            started_at,
            completed_at: Some(completed_at),
            duration_ms: Some(duration_ms),
        })
    }

    /// Terminal release phase, after every stage reached a terminal state.
    async fn run_release_phase(
        &self,
        definition: &WorkflowDefinition,
        event: &TriggerEvent,
        decision: TriggerDecision,
        run_id: RunId,
        statuses: &HashMap<String, StageStatus>,
    ) -> Option<ReleaseResult> {
        let spec = definition.release.as_ref()?;

        if !decision.release_eligible {
            return Some(ReleaseResult {
                status: StageStatus::Skipped,
                packages: Vec::new(),
                error: None,
            });
        }

        let needs_satisfied = spec.needs.iter().all(|need| {
            statuses
                .get(need)
                .is_some_and(|status| status.satisfies_dependents())
        });
        if !needs_satisfied {
            return Some(ReleaseResult {
                status: StageStatus::SkippedOnFailure,
                packages: Vec::new(),
                error: None,
            });
        }

        let publisher = ReleasePublisher::new(
            self.handles.artifacts.clone(),
            self.handles.release_target.clone(),
        );
        let tag = event.tag().unwrap_or(&event.git_ref).to_string();
        match publisher.publish(spec, &tag).await {
            Ok(packages) => {
                self.handles
                    .events
                    .emit(Event::ReleasePublished(ReleasePublishedPayload {
                        run_id,
                        tag,
                        platforms: packages.iter().map(|p| p.platform.clone()).collect(),
                        draft: spec.draft,
                    }));
                Some(ReleaseResult {
                    status: StageStatus::Succeeded,
                    packages,
                    error: None,
                })
            }
            Err(e) => {
                warn!(error = %e, "release publish failed");
                Some(ReleaseResult {
                    status: StageStatus::Failed,
                    packages: Vec::new(),
                    error: Some(e.to_string()),
                })
            }
        }
    }

    fn base_context(
        &self,
        event: &TriggerEvent,
        statuses: &HashMap<String, StageStatus>,
    ) -> EvalContext {
        let mut ctx = EvalContext::new()
            .with("event.kind", event.kind.as_str())
            .with("event.ref", event.git_ref.clone());
        for (name, status) in statuses {
            if status.is_terminal() {
                ctx.set(format!("stages.{}.status", name), stage_status_str(*status));
            }
        }
        ctx
    }

    fn emit_stage_completed(&self, run_id: RunId, stage: &str, status: StageStatus) {
        self.handles
            .events
            .emit(Event::StageCompleted(StageCompletedPayload {
                run_id,
                stage: stage.to_string(),
                status,
                completed_at: Utc::now(),
            }));
    }
}

fn stage_status_str(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Pending => "pending",
        StageStatus::Running => "running",
        StageStatus::Succeeded => "succeeded",
        StageStatus::Failed => "failed",
        StageStatus::Skipped => "skipped",
        StageStatus::SkippedOnFailure => "skipped_on_failure",
    }
}

async fn run_stage(
    handles: EngineHandles,
    run_id: RunId,
    stage: StageDefinition,
    ctx: EvalContext,
    workspace: PathBuf,
    variables: HashMap<String, String>,
) -> StageResult {
    // A false top-level condition is a legitimate skip, not a failure.
    if let Some(condition) = &stage.condition
        && !ctx.eval(condition)
    {
        return StageResult::skipped(&stage.name, StageStatus::Skipped);
    }

    let started_at = Utc::now();
    handles.events.emit(Event::StageStarted(StageStartedPayload {
        run_id,
        stage: stage.name.clone(),
        started_at,
    }));

    let jobs = MatrixExpander::new().jobs_for(&stage);
    let stage = Arc::new(stage);

    // Empty expansion is valid: the stage trivially succeeds with zero jobs.
    let job_results: Vec<JobResult> = futures::future::join_all(jobs.into_iter().map(|job| {
        run_job(
            handles.clone(),
            run_id,
            stage.clone(),
            job,
            ctx.clone(),
            workspace.clone(),
            variables.clone(),
        )
    }))
    .await;

    let error = job_results
        .iter()
        .find(|job| job.status == JobStatus::Failed)
        .map(|job| {
            format!(
                "job '{}' failed: {}",
                job.display_name,
                job.error.as_deref().unwrap_or("unknown error")
            )
        });
    let status = if error.is_some() {
        StageStatus::Failed
    } else if !job_results.is_empty() && job_results.iter().all(|j| j.status == JobStatus::Skipped)
    {
        StageStatus::Skipped
    } else {
        StageStatus::Succeeded
    };

    let completed_at = Utc::now();
    StageResult {
        name: stage.name.clone(),
        status,
        jobs: job_results,
        error,
        started_at: Some(started_at),
        completed_at: Some(completed_at),
        duration_ms: Some((completed_at - started_at).num_milliseconds().max(0) as u64),
    }
}

async fn run_job(
    handles: EngineHandles,
    run_id: RunId,
    stage: Arc<StageDefinition>,
    job: ExpandedJob,
    mut ctx: EvalContext,
    workspace: PathBuf,
    variables: HashMap<String, String>,
) -> JobResult {
    let started_at = Utc::now();
    handles.events.emit(Event::JobStarted(JobStartedPayload {
        run_id,
        stage: stage.name.clone(),
        job_id: job.id,
        display_name: job.display_name.clone(),
    }));

    for (axis, value) in job.assignment.iter() {
        ctx.set(format!("matrix.{}", axis), value_str(value));
    }
    let scope = job
        .assignment
        .get("os")
        .map(|v| value_str(v))
        .unwrap_or_else(|| "any".to_string());

    let mut env = variables.clone();
    for (axis, value) in job.assignment.iter() {
        env.insert(
            format!("FORGE_MATRIX_{}", axis.to_uppercase().replace('-', "_")),
            value_str(value),
        );
    }

    let mut steps: Vec<StepResult> = Vec::new();
    let mut failure: Option<String> = None;

    // Steps are strictly sequential; a failed step ends the job, a skipped
    // step does not block the next one.
    for step in &stage.steps {
        if let Some(condition) = &step.condition
            && !ctx.eval(condition)
        {
            steps.push(StepResult {
                name: step.name.clone(),
                status: StepStatus::Skipped,
                exit_code: None,
                cache: None,
                duration_ms: 0,
            });
            emit_step_completed(&handles, run_id, &stage.name, job.id, step, StepStatus::Skipped, None);
            continue;
        }

        handles.events.emit(Event::StepStarted(StepStartedPayload {
            run_id,
            stage: stage.name.clone(),
            job_id: job.id,
            step: step.name.clone(),
        }));

        match run_step(&handles, run_id, job.id, step, &scope, &workspace, &env).await {
            Ok(result) => {
                let status = result.status;
                let exit_code = result.exit_code;
                if status == StepStatus::Failed {
                    failure = Some(
                        Error::StepFailed {
                            step: step.name.clone(),
                            exit_code: exit_code.unwrap_or(-1),
                        }
                        .to_string(),
                    );
                }
                steps.push(result);
                emit_step_completed(&handles, run_id, &stage.name, job.id, step, status, exit_code);
                if failure.is_some() {
                    break;
                }
            }
            Err(e) => {
                // Fatal to this job only; sibling jobs keep running.
                steps.push(StepResult {
                    name: step.name.clone(),
                    status: StepStatus::Failed,
                    exit_code: None,
                    cache: None,
                    duration_ms: 0,
                });
                emit_step_completed(
                    &handles,
                    run_id,
                    &stage.name,
                    job.id,
                    step,
                    StepStatus::Failed,
                    None,
                );
                failure = Some(e.to_string());
                break;
            }
        }
    }

    let mut status = if failure.is_some() {
        JobStatus::Failed
    } else if !steps.is_empty() && steps.iter().all(|s| s.status == StepStatus::Skipped) {
        JobStatus::Skipped
    } else {
        JobStatus::Succeeded
    };

    if status == JobStatus::Succeeded
        && let Err(e) = handles.artifacts.commit_job(job.id).await
    {
        failure = Some(e.to_string());
        status = JobStatus::Failed;
    }

    handles.events.emit(Event::JobCompleted(JobCompletedPayload {
        run_id,
        stage: stage.name.clone(),
        job_id: job.id,
        display_name: job.display_name.clone(),
        status,
    }));

    let completed_at = Utc::now();
    JobResult {
        id: job.id,
        stage: stage.name.clone(),
        index: job.index,
        assignment: job.assignment,
        display_name: job.display_name,
        status,
        steps,
        error: failure,
        started_at: Some(started_at),
        completed_at: Some(completed_at),
        duration_ms: Some((completed_at - started_at).num_milliseconds().max(0) as u64),
    }
}

async fn run_step(
    handles: &EngineHandles,
    run_id: RunId,
    job_id: JobId,
    step: &StepDefinition,
    scope: &str,
    workspace: &Path,
    env: &HashMap<String, String>,
) -> Result<StepResult> {
    let start = std::time::Instant::now();

    let mut cache_outcome: Option<CacheOutcome> = None;
    if let Some(cache) = &step.cache {
        let outcome = handles
            .cache
            .restore(&CacheRestoreRequest {
                scope: scope.to_string(),
                key: cache.key.clone(),
                restore_keys: cache.restore_keys.clone(),
                paths: cache.paths.clone(),
                workspace: workspace.to_path_buf(),
            })
            .await?;
        if let Some(matched) = &outcome.matched_key {
            handles.events.emit(Event::CacheHit(CacheHitPayload {
                run_id,
                job_id,
                key: cache.key.clone(),
                matched_key: matched.clone(),
                exact: outcome.exact,
            }));
        } else {
            handles.events.emit(Event::CacheMiss(CacheMissPayload {
                run_id,
                job_id,
                key: cache.key.clone(),
            }));
        }
        cache_outcome = Some(CacheOutcome {
            hit: outcome.is_hit(),
            exact: outcome.exact,
            matched_key: outcome.matched_key,
        });
    }

    let mut exit_code = None;
    if let Some(command) = &step.run {
        let outcome = handles
            .executor
            .execute(&CommandContext {
                command: command.clone(),
                workspace: workspace.to_path_buf(),
                env: env.clone(),
            })
            .await?;
        exit_code = Some(outcome.exit_code);
        if !outcome.success() {
            return Ok(StepResult {
                name: step.name.clone(),
                status: StepStatus::Failed,
                exit_code,
                cache: cache_outcome,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }
    }

    // Refresh the cache only when the primary key was not already present.
    if let Some(cache) = &step.cache
        && cache_outcome.as_ref().is_none_or(|o| !o.exact)
    {
        handles
            .cache
            .save(&CacheSaveRequest {
                scope: scope.to_string(),
                key: cache.key.clone(),
                paths: cache.paths.clone(),
                workspace: workspace.to_path_buf(),
            })
            .await?;
        handles.events.emit(Event::CacheSaved(CacheSavedPayload {
            run_id,
            job_id,
            key: cache.key.clone(),
        }));
    }

    if let Some(upload) = &step.upload {
        let files = read_fileset(workspace, &upload.paths)?;
        handles
            .artifacts
            .upload(&upload.name, files, job_id)
            .await?;
        handles
            .events
            .emit(Event::ArtifactUploaded(ArtifactUploadedPayload {
                run_id,
                job_id,
                name: upload.name.clone(),
                file_count: upload.paths.len(),
            }));
    }

    if let Some(download) = &step.download {
        let files = handles.artifacts.download(&download.name).await?;
        let dest = match &download.dest {
            Some(dir) => workspace.join(dir),
            None => workspace.to_path_buf(),
        };
        write_fileset(&dest, &files)?;
    }

    Ok(StepResult {
        name: step.name.clone(),
        status: StepStatus::Succeeded,
        exit_code,
        cache: cache_outcome,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

fn emit_step_completed(
    handles: &EngineHandles,
    run_id: RunId,
    stage: &str,
    job_id: JobId,
    step: &StepDefinition,
    status: StepStatus,
    exit_code: Option<i32>,
) {
    handles
        .events
        .emit(Event::StepCompleted(StepCompletedPayload {
            run_id,
            stage: stage.to_string(),
            job_id,
            step: step.name.clone(),
            status,
            exit_code,
        }));
}

fn value_str(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Collect artifact files from the workspace, preserving unix modes.
fn read_fileset(workspace: &Path, paths: &[PathBuf]) -> Result<Vec<ArtifactFile>> {
    let mut files = Vec::new();
    for path in paths {
        collect_files(workspace, path, &mut files)?;
    }
    Ok(files)
}

fn collect_files(workspace: &Path, path: &Path, files: &mut Vec<ArtifactFile>) -> Result<()> {
    let abs = workspace.join(path);
    let metadata = std::fs::metadata(&abs).map_err(|e| {
        Error::Internal(format!(
            "Failed to read artifact path {}: {}",
            path.display(),
            e
        ))
    })?;

    if metadata.is_dir() {
        let mut entries: Vec<_> = std::fs::read_dir(&abs)
            .map_err(Error::Io)?
            .filter_map(|entry| entry.ok())
            .collect();
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            collect_files(workspace, &path.join(entry.file_name()), files)?;
        }
        return Ok(());
    }

    let contents = std::fs::read(&abs).map_err(Error::Io)?;
    files.push(ArtifactFile {
        path: path.to_path_buf(),
        contents,
        mode: file_mode(&metadata),
    });
    Ok(())
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0o644
}

/// Write a downloaded fileset under `dest`, restoring unix modes.
fn write_fileset(dest: &Path, files: &[ArtifactFile]) -> Result<()> {
    for file in files {
        let target = dest.join(&file.path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        std::fs::write(&target, &file.contents).map_err(Error::Io)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&target, std::fs::Permissions::from_mode(file.mode))
                .map_err(Error::Io)?;
        }
    }
    Ok(())
}
