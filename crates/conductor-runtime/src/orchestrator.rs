//! Orchestrator - the plan → act → verify loop
//!
//! One `run` call owns its whole iteration history; nothing survives between
//! runs, so concurrent runs share only the read-only tool catalog.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use conductor_core::executor::{
    truncate_for_log, ExecutionProgressReporter, Executor, ExecutorContext,
};
use conductor_core::normalizer::PlanNormalizer;
use conductor_core::planner::{PlanError, PlanRequest, Planner, PlannerOutput};
use conductor_core::tool::ToolCatalog;
use conductor_core::types::PlanOutcome;
use conductor_core::verifier::{Verdict, Verifier, VerifierGateway, VerifyError};

const MAX_LOG_TEXT_CHARS: usize = 2_000;
const DEFAULT_MAX_ITERATIONS: u32 = 3;
const DEFAULT_MAX_PARALLEL: usize = 4;

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("invalid orchestrator config: {0}")]
    InvalidConfig(String),
    #[error("planning failed: {0}")]
    PlanningFailed(#[from] PlanError),
    #[error("verification failed: {0}")]
    Verification(#[from] VerifyError),
}

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on planner calls per run (>= 1)
    pub max_iterations: u32,
    /// Upper bound for every tool invocation (> 0)
    pub step_timeout: Duration,
    /// Maximum concurrent tool invocations (>= 1)
    pub max_parallel: usize,
}

impl OrchestratorConfig {
    /// The step timeout has no default and must be given explicitly.
    pub fn new(step_timeout: Duration) -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            step_timeout,
            max_parallel: DEFAULT_MAX_PARALLEL,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if self.max_iterations == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if self.step_timeout.is_zero() {
            return Err(OrchestratorError::InvalidConfig(
                "step_timeout must be > 0".to_string(),
            ));
        }
        if self.max_parallel == 0 {
            return Err(OrchestratorError::InvalidConfig(
                "max_parallel must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loop phase, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorPhase {
    Planning,
    Acting,
    Verifying,
    Revising,
    Done,
    Exhausted,
    Cancelled,
}

impl OrchestratorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Acting => "acting",
            Self::Verifying => "verifying",
            Self::Revising => "revising",
            Self::Done => "done",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrchestratorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    /// Goal satisfied, or answered directly
    Done,
    /// Iterations used up without a satisfied verdict
    Exhausted,
    /// Cancellation signal observed
    Cancelled,
}

impl From<OrchestrationStatus> for OrchestratorPhase {
    fn from(status: OrchestrationStatus) -> Self {
        match status {
            OrchestrationStatus::Done => Self::Done,
            OrchestrationStatus::Exhausted => Self::Exhausted,
            OrchestrationStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// What happened in one loop iteration
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub revision: u32,
    /// Empty when the planner answered directly
    pub plan_id: String,
    /// Why the executor refused the plan, if it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub completed_steps: usize,
    pub total_steps: usize,
}

/// Result of one orchestration run
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub run_id: String,
    pub status: OrchestrationStatus,
    /// Accepted outcome (Done), best outcome (Exhausted) or the outcome at
    /// the time of cancellation
    pub outcome: Option<PlanOutcome>,
    /// Planner answer that needed no tool invocation
    pub direct_response: Option<String>,
    /// Reason from the last unsatisfied verdict or rejection
    pub last_reason: Option<String>,
    pub iterations: Vec<IterationRecord>,
}

impl OrchestrationResult {
    pub fn is_done(&self) -> bool {
        self.status == OrchestrationStatus::Done
    }

    /// Number of planner calls made; every call leaves one iteration record
    pub fn planner_calls(&self) -> usize {
        self.iterations.len()
    }
}

/// Input for one run
#[derive(Debug, Clone, Default)]
pub struct OrchestrationRequest {
    pub goal: String,
    /// Caller-supplied planner context
    pub context: HashMap<String, Value>,
}

impl OrchestrationRequest {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            context: HashMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }
}

/// Per-run loop state
struct RunState {
    run_id: String,
    iterations: Vec<IterationRecord>,
    best: Option<PlanOutcome>,
    prior_outcome: Option<PlanOutcome>,
    last_reason: Option<String>,
    feedback_history: Vec<String>,
}

impl RunState {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            iterations: Vec::new(),
            best: None,
            prior_outcome: None,
            last_reason: None,
            feedback_history: Vec::new(),
        }
    }

    fn record_reason(&mut self, reason: String) {
        self.feedback_history.push(reason.clone());
        self.last_reason = Some(reason);
    }

    /// Keep the outcome with the most completed steps; ties go to the newer one.
    fn offer(&mut self, outcome: &PlanOutcome) {
        let replace = self
            .best
            .as_ref()
            .map_or(true, |best| outcome.completed_count() >= best.completed_count());
        if replace {
            self.best = Some(outcome.clone());
        }
    }

    /// The planner needs no further tool work: a direct answer or an empty
    /// workflow. Resolves the run with the best outcome of earlier revisions.
    fn resolve_without_execution(
        mut self,
        revision: u32,
        plan_id: String,
        direct_response: Option<String>,
    ) -> OrchestrationResult {
        self.iterations.push(IterationRecord {
            revision,
            plan_id,
            rejection: None,
            verdict: None,
            completed_steps: 0,
            total_steps: 0,
        });
        self.last_reason = None;
        let best = self.best.take();
        self.finish(OrchestrationStatus::Done, best, direct_response)
    }

    fn finish(
        self,
        status: OrchestrationStatus,
        outcome: Option<PlanOutcome>,
        direct_response: Option<String>,
    ) -> OrchestrationResult {
        tracing::info!(
            run_id = %self.run_id,
            phase = %OrchestratorPhase::from(status),
            iterations = self.iterations.len(),
            "orchestration finished"
        );
        OrchestrationResult {
            run_id: self.run_id,
            status,
            outcome,
            direct_response,
            last_reason: self.last_reason,
            iterations: self.iterations,
        }
    }
}

/// Orchestrator - wires planner + executor + verifier into the loop
pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    executor: Executor,
    verifier: VerifierGateway,
    config: OrchestratorConfig,
    progress_reporter: Option<Arc<dyn ExecutionProgressReporter>>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        planner: Arc<dyn Planner>,
        catalog: Arc<ToolCatalog>,
        verifier: Arc<dyn Verifier>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let executor =
            Executor::new(catalog, config.step_timeout).with_max_parallel(config.max_parallel);
        Ok(Self {
            planner,
            executor,
            verifier: VerifierGateway::new(verifier),
            config,
            progress_reporter: None,
        })
    }

    /// Replace the plan normalizer used before every execution
    pub fn with_normalizer(mut self, normalizer: PlanNormalizer) -> Self {
        self.executor = self.executor.with_normalizer(normalizer);
        self
    }

    /// Attach a realtime execution progress reporter.
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ExecutionProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the loop for `goal` without external cancellation.
    pub async fn run(&self, goal: impl Into<String>) -> Result<OrchestrationResult, OrchestratorError> {
        self.run_with_cancellation(OrchestrationRequest::new(goal), CancellationToken::new())
            .await
    }

    /// Run the loop; cancelling `cancel` ends the run with `Cancelled`.
    pub async fn run_with_cancellation(
        &self,
        request: OrchestrationRequest,
        cancel: CancellationToken,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("orchestration", run_id = %run_id);
        self.drive(RunState::new(run_id), request, cancel)
            .instrument(span)
            .await
    }

    async fn drive(
        &self,
        mut state: RunState,
        request: OrchestrationRequest,
        cancel: CancellationToken,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let goal = request.goal;
        let available_tools = self.executor.catalog().descriptors();
        tracing::info!(
            run_id = %state.run_id,
            goal = %truncate_for_log(&goal, MAX_LOG_TEXT_CHARS),
            tools = available_tools.len(),
            max_iterations = self.config.max_iterations,
            "orchestration started"
        );

        for revision in 0..self.config.max_iterations {
            if cancel.is_cancelled() {
                let best = state.best.clone();
                return Ok(state.finish(OrchestrationStatus::Cancelled, best, None));
            }

            // Planning
            self.enter(&state, OrchestratorPhase::Planning, revision);
            let plan_request = PlanRequest {
                run_id: state.run_id.clone(),
                goal: goal.clone(),
                available_tools: available_tools.clone(),
                context: request.context.clone(),
                revision,
                prior_outcome: state.prior_outcome.take(),
                prior_reason: state.last_reason.clone(),
                feedback_history: state.feedback_history.clone(),
            };
            let planned = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.planner.plan(&plan_request) => Some(result),
            };
            let output = match planned {
                None => {
                    let best = state.best.clone();
                    return Ok(state.finish(OrchestrationStatus::Cancelled, best, None));
                }
                Some(Ok(output)) => output,
                Some(Err(err)) => {
                    tracing::error!(
                        run_id = %state.run_id,
                        revision,
                        error = %err,
                        "planner failed"
                    );
                    return Err(OrchestratorError::PlanningFailed(err));
                }
            };

            let mut plan = match output {
                PlannerOutput::DirectResponse(message) => {
                    tracing::info!(
                        run_id = %state.run_id,
                        revision,
                        response = %truncate_for_log(&message, MAX_LOG_TEXT_CHARS),
                        "planner answered directly"
                    );
                    return Ok(state.resolve_without_execution(
                        revision,
                        String::new(),
                        Some(message),
                    ));
                }
                PlannerOutput::Workflow(plan) => plan,
            };
            if plan.id.trim().is_empty() {
                plan.id = uuid::Uuid::new_v4().to_string();
            }
            if plan.goal.trim().is_empty() {
                plan.goal = goal.clone();
            }
            plan.revision = revision;

            if plan.is_empty() {
                tracing::info!(
                    run_id = %state.run_id,
                    plan_id = %plan.id,
                    revision,
                    "planner returned a workflow without steps"
                );
                return Ok(state.resolve_without_execution(revision, plan.id, None));
            }

            // Acting
            self.enter(&state, OrchestratorPhase::Acting, revision);
            let mut exec_ctx = ExecutorContext::new(state.run_id.clone())
                .with_cancellation_token(cancel.clone());
            if let Some(reporter) = &self.progress_reporter {
                exec_ctx = exec_ctx.with_progress_reporter(reporter.clone());
            }
            let outcome = match self.executor.execute(&plan, &exec_ctx).await {
                Ok(outcome) => outcome,
                Err(rejection) => {
                    let reason = format!("plan rejected: {}", rejection);
                    state.iterations.push(IterationRecord {
                        revision,
                        plan_id: plan.id.clone(),
                        rejection: Some(rejection.to_string()),
                        verdict: None,
                        completed_steps: 0,
                        total_steps: plan.steps.len(),
                    });
                    state.record_reason(reason);
                    self.enter_revising(&state, revision);
                    continue;
                }
            };

            if outcome.cancelled || cancel.is_cancelled() {
                state.iterations.push(IterationRecord {
                    revision,
                    plan_id: plan.id.clone(),
                    rejection: None,
                    verdict: None,
                    completed_steps: outcome.completed_count(),
                    total_steps: outcome.steps.len(),
                });
                return Ok(state.finish(OrchestrationStatus::Cancelled, Some(outcome), None));
            }

            // Verifying
            self.enter(&state, OrchestratorPhase::Verifying, revision);
            let verified = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = self.verifier.verify(&goal, &outcome) => Some(result),
            };
            let verdict = match verified {
                None => {
                    return Ok(state.finish(OrchestrationStatus::Cancelled, Some(outcome), None));
                }
                Some(result) => result?,
            };

            state.iterations.push(IterationRecord {
                revision,
                plan_id: plan.id.clone(),
                rejection: None,
                verdict: Some(verdict.clone()),
                completed_steps: outcome.completed_count(),
                total_steps: outcome.steps.len(),
            });

            if verdict.satisfied {
                return Ok(state.finish(OrchestrationStatus::Done, Some(outcome), None));
            }

            state.record_reason(verdict.reason.unwrap_or_default());
            state.offer(&outcome);
            state.prior_outcome = Some(outcome);
            self.enter_revising(&state, revision);
        }

        tracing::warn!(
            run_id = %state.run_id,
            max_iterations = self.config.max_iterations,
            last_reason = state.last_reason.as_deref().unwrap_or(""),
            "iteration budget exhausted without a satisfied verdict"
        );
        let best = state.best.clone();
        Ok(state.finish(OrchestrationStatus::Exhausted, best, None))
    }

    fn enter(&self, state: &RunState, phase: OrchestratorPhase, revision: u32) {
        tracing::info!(
            run_id = %state.run_id,
            phase = %phase,
            revision,
            "orchestrator phase changed"
        );
    }

    fn enter_revising(&self, state: &RunState, revision: u32) {
        if revision + 1 < self.config.max_iterations {
            self.enter(state, OrchestratorPhase::Revising, revision + 1);
        }
    }
}
