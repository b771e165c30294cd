//! Realtime execution progress reporting

use async_trait::async_trait;
use serde_json::Value;

use crate::types::StepId;

/// Realtime execution progress event.
#[derive(Debug, Clone)]
pub struct ExecutionProgressEvent {
    pub run_id: String,
    pub step_id: Option<StepId>,
    pub tool: Option<String>,
    /// Phase label, e.g. step_started/step_completed/plan_completed.
    pub phase: String,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Extra structured metadata.
    pub metadata: Value,
}

impl ExecutionProgressEvent {
    pub fn new(
        run_id: impl Into<String>,
        step_id: Option<StepId>,
        tool: Option<String>,
        phase: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step_id,
            tool,
            phase: phase.into(),
            message: None,
            metadata: Value::Null,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Sink interface for execution progress reporting.
///
/// Errors are logged by the executor and never affect execution.
#[async_trait]
pub trait ExecutionProgressReporter: Send + Sync {
    async fn report(&self, event: ExecutionProgressEvent) -> Result<(), String>;
}
