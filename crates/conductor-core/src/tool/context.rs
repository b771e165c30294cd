//! ToolContext type definition

use tokio_util::sync::CancellationToken;

use crate::types::StepId;

/// Per-invocation context handed to a tool
///
/// The cancellation token is advisory: the executor never interrupts a tool
/// mid-call, but long-running tools may observe it and stop early.
#[derive(Clone)]
pub struct ToolContext {
    /// Orchestration run ID
    pub run_id: String,
    /// Step being executed
    pub step_id: StepId,
    /// Unique ID of this invocation
    pub execution_id: String,
    pub cancellation_token: CancellationToken,
}

impl ToolContext {
    pub fn new(run_id: impl Into<String>, step_id: impl Into<StepId>) -> Self {
        Self {
            run_id: run_id.into(),
            step_id: step_id.into(),
            execution_id: uuid::Uuid::new_v4().to_string(),
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Completes when the orchestration is cancelled
    pub async fn cancelled(&self) {
        self.cancellation_token.cancelled().await
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("run_id", &self.run_id)
            .field("step_id", &self.step_id)
            .field("execution_id", &self.execution_id)
            .finish_non_exhaustive()
    }
}
