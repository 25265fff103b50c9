//! Run and execution record types.

use crate::ids::{JobId, RunId};
use crate::workflow::Assignment;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The inbound event that may fire a run. Pure data: every trigger decision
/// is re-derivable from the kind and ref alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TriggerEvent {
    pub kind: EventKind,
    #[serde(rename = "ref")]
    pub git_ref: String,
}

impl TriggerEvent {
    pub fn pull_request(git_ref: impl Into<String>) -> Self {
        Self {
            kind: EventKind::PullRequest,
            git_ref: git_ref.into(),
        }
    }

    pub fn push(git_ref: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Push,
            git_ref: git_ref.into(),
        }
    }

    /// The tag name when the ref points into `refs/tags/`.
    pub fn tag(&self) -> Option<&str> {
        self.git_ref.strip_prefix("refs/tags/")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PullRequest,
    Push,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PullRequest => "pull_request",
            EventKind::Push => "push",
        }
    }
}

/// One execution instance of a workflow. Mutated by the coordinator as
/// stages complete; immutable once every stage reached a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowRun {
    pub id: RunId,
    pub workflow_name: String,
    pub event: TriggerEvent,
    pub release_eligible: bool,
    pub status: RunStatus,
    pub stages: Vec<StageResult>,
    pub release: Option<ReleaseResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl WorkflowRun {
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    /// The trigger evaluator decided the event does not fire a run.
    NotTriggered,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::NotTriggered)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StageResult {
    pub name: String,
    pub status: StageStatus,
    pub jobs: Vec<JobResult>,
    /// Set when this stage caused the run to fail.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl StageResult {
    pub fn skipped(name: impl Into<String>, status: StageStatus) -> Self {
        Self {
            name: name.into(),
            status,
            jobs: Vec::new(),
            error: None,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }
}

/// Stage terminal states distinguish "ran and failed" from "never ran
/// because upstream failed" from "condition was false".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Top-level condition evaluated false. Satisfies dependents.
    Skipped,
    /// A transitive dependency failed. Propagates to dependents.
    SkippedOnFailure,
}

impl StageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StageStatus::Pending | StageStatus::Running)
    }

    /// Whether a dependent stage may run once this stage is terminal.
    pub fn satisfies_dependents(&self) -> bool {
        matches!(self, StageStatus::Succeeded | StageStatus::Skipped)
    }

    pub fn blocks_dependents(&self) -> bool {
        matches!(self, StageStatus::Failed | StageStatus::SkippedOnFailure)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub id: JobId,
    pub stage: String,
    pub index: usize,
    pub assignment: Assignment,
    pub display_name: String,
    pub status: JobStatus,
    pub steps: Vec<StepResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub cache: Option<CacheOutcome>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// How a step's cache declaration resolved. A miss is normal control flow.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheOutcome {
    pub hit: bool,
    pub exact: bool,
    pub matched_key: Option<String>,
}

/// Outcome of the terminal release phase.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseResult {
    pub status: StageStatus,
    pub packages: Vec<PackageSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PackageSummary {
    pub platform: String,
    pub file_name: String,
    pub size_bytes: u64,
}
