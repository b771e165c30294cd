//! Execution outcome types
//!
//! StepOutcome is the per-step execution result; PlanOutcome aggregates them
//! once every step has reached a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::StepId;

/// Step lifecycle: `pending -> running -> {completed | failed | skipped}`.
///
/// A pending step may also go straight to `skipped` when it is never
/// dispatched. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Whether the state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Pending, Self::Skipped)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Why a step was skipped instead of attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A direct or transitive dependency failed
    DependencyFailed { step_id: StepId },
    /// The run was cancelled before the step was dispatched
    Cancelled,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DependencyFailed { step_id } => write!(f, "blocked by failed step '{}'", step_id),
            Self::Cancelled => f.write_str("cancelled before dispatch"),
        }
    }
}

/// Structured failure reason recorded for a failed step.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepFailure {
    #[error("tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("step timed out after {timeout_ms}ms")]
    StepTimeout { timeout_ms: u64 },

    #[error("tool '{tool}' {direction} schema validation failed: {reason}")]
    SchemaValidation {
        tool: String,
        direction: String,
        reason: String,
    },

    #[error("unknown tool '{tool}'")]
    UnknownTool { tool: String },

    #[error("input binding failed: {message}")]
    Binding { message: String },
}

/// Execution result of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub tool: String,
    pub status: StepStatus,
    /// Tool output, set when completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure reason, set when failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<StepFailure>,
    /// Blocking reason, set when skipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Wall-clock time spent in the tool, if the step was dispatched.
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// One-line human-readable description.
    pub fn describe(&self) -> String {
        match self.status {
            StepStatus::Completed => format!("{} ({}): completed", self.step_id, self.tool),
            StepStatus::Failed => format!(
                "{} ({}): failed: {}",
                self.step_id,
                self.tool,
                self.failure
                    .as_ref()
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
            StepStatus::Skipped => format!(
                "{} ({}): skipped: {}",
                self.step_id,
                self.tool,
                self.skip_reason
                    .as_ref()
                    .map(|r| r.to_string())
                    .unwrap_or_default()
            ),
            StepStatus::Pending | StepStatus::Running => {
                format!("{} ({}): not finished", self.step_id, self.tool)
            }
        }
    }
}

/// Aggregated result of executing one plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    /// Orchestration run this execution belongs to
    pub run_id: String,
    pub plan_id: String,
    pub goal: String,
    pub revision: u32,
    /// One entry per plan step, in plan declaration order
    pub steps: Vec<StepOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Whether dispatch stopped because of a cancellation signal
    #[serde(default)]
    pub cancelled: bool,
}

impl PlanOutcome {
    pub fn step(&self, id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step_id.as_str() == id)
    }

    /// Output of a completed step.
    pub fn output(&self, id: &str) -> Option<&Value> {
        self.step(id).and_then(|s| s.output.as_ref())
    }

    pub fn status_of(&self, id: &str) -> Option<StepStatus> {
        self.step(id).map(|s| s.status)
    }

    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    pub fn completed_count(&self) -> usize {
        self.count(StepStatus::Completed)
    }

    pub fn failed_steps(&self) -> Vec<&StepOutcome> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .collect()
    }

    pub fn skipped_steps(&self) -> Vec<&StepOutcome> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .collect()
    }

    /// True when every step completed and the run was not cancelled.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.steps.iter().all(StepOutcome::is_completed)
    }

    /// Multi-line summary, one line per step.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "plan {} (revision {}): {} / {} steps completed",
            self.plan_id,
            self.revision,
            self.completed_count(),
            self.steps.len()
        )];
        lines.extend(self.steps.iter().map(|s| format!("- {}", s.describe())));
        if self.cancelled {
            lines.push("- run cancelled".to_string());
        }
        lines.join("\n")
    }
}
