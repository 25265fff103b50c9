//! Engine lifecycle events.
//!
//! Every state transition the coordinator makes is mirrored as an event so
//! observers (logging, test assertions, future bus adapters) see the same
//! picture the run report records.

use crate::ids::{JobId, RunId};
use crate::run::{JobStatus, RunStatus, StageStatus, StepStatus, TriggerEvent};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// All events emitted by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Run lifecycle
    RunStarted(RunStartedPayload),
    RunCompleted(RunCompletedPayload),

    // Stage lifecycle
    StageStarted(StageStartedPayload),
    StageCompleted(StageCompletedPayload),

    // Job lifecycle
    JobStarted(JobStartedPayload),
    JobCompleted(JobCompletedPayload),

    // Step lifecycle
    StepStarted(StepStartedPayload),
    StepCompleted(StepCompletedPayload),

    // Cache
    CacheHit(CacheHitPayload),
    CacheMiss(CacheMissPayload),
    CacheSaved(CacheSavedPayload),

    // Artifacts
    ArtifactUploaded(ArtifactUploadedPayload),

    // Release
    ReleasePublished(ReleasePublishedPayload),
}

impl Event {
    /// Dotted subject for routing/filtering.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted(p) => format!("run.started.{}", p.run_id),
            Event::RunCompleted(p) => format!("run.completed.{}", p.run_id),
            Event::StageStarted(p) => format!("run.{}.stage.{}.started", p.run_id, p.stage),
            Event::StageCompleted(p) => format!("run.{}.stage.{}.completed", p.run_id, p.stage),
            Event::JobStarted(p) => format!("run.{}.job.{}.started", p.run_id, p.job_id),
            Event::JobCompleted(p) => format!("run.{}.job.{}.completed", p.run_id, p.job_id),
            Event::StepStarted(p) => format!("run.{}.job.{}.step.started", p.run_id, p.job_id),
            Event::StepCompleted(p) => format!("run.{}.job.{}.step.completed", p.run_id, p.job_id),
            Event::CacheHit(p) => format!("cache.hit.{}", p.run_id),
            Event::CacheMiss(p) => format!("cache.miss.{}", p.run_id),
            Event::CacheSaved(p) => format!("cache.saved.{}", p.run_id),
            Event::ArtifactUploaded(p) => format!("artifact.uploaded.{}", p.run_id),
            Event::ReleasePublished(p) => format!("release.published.{}", p.run_id),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub workflow_name: String,
    pub event: TriggerEvent,
    pub release_eligible: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub workflow_name: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageStartedPayload {
    pub run_id: RunId,
    pub stage: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageCompletedPayload {
    pub run_id: RunId,
    pub stage: String,
    pub status: StageStatus,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStartedPayload {
    pub run_id: RunId,
    pub stage: String,
    pub job_id: JobId,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobCompletedPayload {
    pub run_id: RunId,
    pub stage: String,
    pub job_id: JobId,
    pub display_name: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepStartedPayload {
    pub run_id: RunId,
    pub stage: String,
    pub job_id: JobId,
    pub step: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepCompletedPayload {
    pub run_id: RunId,
    pub stage: String,
    pub job_id: JobId,
    pub step: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheHitPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub key: String,
    pub matched_key: String,
    pub exact: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheMissPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheSavedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactUploadedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub name: String,
    pub file_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReleasePublishedPayload {
    pub run_id: RunId,
    pub tag: String,
    pub platforms: Vec<String>,
    pub draft: bool,
}
