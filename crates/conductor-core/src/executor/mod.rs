//! Executor module
//!
//! The Executor is responsible for:
//! - Preflight normalization (cycles and unknown tools never reach a tool)
//! - DAG-based scheduling with continuous dispatch of ready steps
//! - Bounded parallel execution of independent steps
//! - Per-step timeouts, failure isolation and cooperative cancellation

mod dag;
mod progress;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::binding;
use crate::normalizer::{NormalizedPlan, PlanNormalizer, PlanRejection};
use crate::tool::{ToolCatalog, ToolContext};
use crate::types::{Plan, PlanOutcome, SkipReason, Step, StepFailure, StepId, StepStatus};

pub use dag::{DagNode, ExecutionDag};
pub use progress::{ExecutionProgressEvent, ExecutionProgressReporter};

const MAX_LOG_JSON_CHARS: usize = 8_000;
const MAX_PREVIEW_CHARS: usize = 320;
const DEFAULT_MAX_PARALLEL: usize = 4;

/// Truncate `input` to `max_chars` characters for log output.
pub fn truncate_for_log(input: &str, max_chars: usize) -> String {
    let char_count = input.chars().count();
    if char_count <= max_chars {
        return input.to_string();
    }
    let mut preview: String = input.chars().take(max_chars).collect();
    preview.push_str(&format!("... [truncated, total_chars={}]", char_count));
    preview
}

pub fn truncate_json_for_log(value: &Value, max_chars: usize) -> String {
    truncate_for_log(&value.to_string(), max_chars)
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Executor context, one per plan execution
#[derive(Clone)]
pub struct ExecutorContext {
    /// Orchestration run ID
    pub run_id: String,
    /// Stops dispatch of new steps when cancelled
    pub cancellation_token: CancellationToken,
    /// Optional execution progress reporter.
    pub progress_reporter: Option<Arc<dyn ExecutionProgressReporter>>,
}

impl ExecutorContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            cancellation_token: CancellationToken::new(),
            progress_reporter: None,
        }
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation_token = token;
        self
    }

    /// Attach a realtime execution progress reporter.
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ExecutionProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }
}

/// The executor - runs one plan against the tool catalog
pub struct Executor {
    catalog: Arc<ToolCatalog>,
    normalizer: PlanNormalizer,
    /// Maximum parallel tool invocations
    max_parallel: usize,
    /// Upper bound for every tool invocation
    step_timeout: Duration,
}

impl Executor {
    /// Create a new executor. The step timeout has no default.
    pub fn new(catalog: Arc<ToolCatalog>, step_timeout: Duration) -> Self {
        Self {
            catalog,
            normalizer: PlanNormalizer::new(),
            max_parallel: DEFAULT_MAX_PARALLEL,
            step_timeout,
        }
    }

    /// Set maximum parallel executions (at least 1)
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel = max.max(1);
        self
    }

    /// Replace the preflight normalizer (e.g. one with custom validators)
    pub fn with_normalizer(mut self, normalizer: PlanNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn catalog(&self) -> &Arc<ToolCatalog> {
        &self.catalog
    }

    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Execute a plan. Rejected plans never invoke a tool.
    pub async fn execute(
        &self,
        plan: &Plan,
        ctx: &ExecutorContext,
    ) -> Result<PlanOutcome, PlanRejection> {
        let normalized = match self.normalizer.normalize(plan, &self.catalog) {
            Ok(normalized) => normalized,
            Err(rejection) => {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    plan_id = %plan.id,
                    revision = plan.revision,
                    error = %rejection,
                    "plan rejected before execution"
                );
                return Err(rejection);
            }
        };
        Ok(self.run(normalized, ctx).await)
    }

    async fn run(&self, normalized: NormalizedPlan, ctx: &ExecutorContext) -> PlanOutcome {
        let NormalizedPlan { plan, mut dag } = normalized;
        let started_at = Utc::now();
        let mut outputs: HashMap<StepId, Value> = HashMap::new();
        let mut in_flight = FuturesUnordered::new();
        let mut cancelled = false;

        tracing::info!(
            run_id = %ctx.run_id,
            plan_id = %plan.id,
            revision = plan.revision,
            steps = dag.len(),
            max_parallel = self.max_parallel,
            "plan execution started"
        );
        report_progress(
            ctx,
            ExecutionProgressEvent::new(ctx.run_id.clone(), None, None, "plan_started")
                .with_metadata(json!({
                    "plan_id": plan.id,
                    "revision": plan.revision,
                    "steps": dag.len(),
                })),
        )
        .await;

        loop {
            if !cancelled && ctx.cancellation_token.is_cancelled() {
                cancelled = true;
                let skipped = dag.skip_pending(SkipReason::Cancelled);
                tracing::info!(
                    run_id = %ctx.run_id,
                    plan_id = %plan.id,
                    skipped = skipped.len(),
                    in_flight = in_flight.len(),
                    "cancellation requested, no further steps will be dispatched"
                );
                for step_id in &skipped {
                    report_skipped(&dag, step_id, ctx).await;
                }
            }

            if !cancelled {
                for step_id in dag.ready_steps() {
                    if in_flight.len() >= self.max_parallel {
                        break;
                    }
                    let Some(step) = dag.get_node(&step_id).map(|node| node.step.clone()) else {
                        continue;
                    };
                    if !dag.mark_running(&step_id) {
                        continue;
                    }

                    tracing::info!(
                        run_id = %ctx.run_id,
                        step_id = %step.id,
                        tool = %step.tool,
                        "step execution started"
                    );
                    report_progress(
                        ctx,
                        ExecutionProgressEvent::new(
                            ctx.run_id.clone(),
                            Some(step.id.clone()),
                            Some(step.tool.clone()),
                            "step_started",
                        ),
                    )
                    .await;

                    match binding::resolve_input(&step, &outputs) {
                        Ok(input) => {
                            if tracing::enabled!(tracing::Level::DEBUG) {
                                tracing::debug!(
                                    step_id = %step.id,
                                    tool = %step.tool,
                                    input = %truncate_json_for_log(&input, MAX_LOG_JSON_CHARS),
                                    "step input resolved"
                                );
                            }
                            in_flight.push(self.invoke_step(step, input, ctx));
                        }
                        Err(err) => {
                            let failure = StepFailure::Binding {
                                message: err.to_string(),
                            };
                            handle_failure(&mut dag, &step, failure, ctx).await;
                        }
                    }
                }
            }

            if in_flight.is_empty() {
                if !dag.is_finished() {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        plan_id = %plan.id,
                        "no runnable steps remain, stopping execution"
                    );
                }
                break;
            }

            tokio::select! {
                Some((step, result)) = in_flight.next() => match result {
                    Ok(output) => handle_success(&mut dag, &mut outputs, &step, output, ctx).await,
                    Err(failure) => handle_failure(&mut dag, &step, failure, ctx).await,
                },
                _ = ctx.cancellation_token.cancelled(), if !cancelled => {}
                else => break,
            }
        }

        let outcome = dag.into_outcome(ctx.run_id.clone(), &plan, started_at, cancelled);
        let completed = outcome.count(StepStatus::Completed);
        let failed = outcome.count(StepStatus::Failed);
        let skipped = outcome.count(StepStatus::Skipped);
        tracing::info!(
            run_id = %ctx.run_id,
            plan_id = %outcome.plan_id,
            completed,
            failed,
            skipped,
            cancelled,
            "plan execution finished"
        );
        report_progress(
            ctx,
            ExecutionProgressEvent::new(
                ctx.run_id.clone(),
                None,
                None,
                if cancelled {
                    "plan_cancelled"
                } else {
                    "plan_completed"
                },
            )
            .with_metadata(json!({
                "plan_id": outcome.plan_id,
                "completed": completed,
                "failed": failed,
                "skipped": skipped,
            })),
        )
        .await;

        outcome
    }

    async fn invoke_step(
        &self,
        step: Step,
        input: Value,
        ctx: &ExecutorContext,
    ) -> (Step, Result<Value, StepFailure>) {
        let tool_ctx = ToolContext::new(ctx.run_id.clone(), step.id.clone())
            .with_cancellation_token(ctx.cancellation_token.clone());
        let invocation = self.catalog.invoke(&step.tool, input, tool_ctx);
        let result = match tokio::time::timeout(self.step_timeout, invocation).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(err.to_step_failure()),
            Err(_) => Err(StepFailure::StepTimeout {
                timeout_ms: duration_millis(self.step_timeout),
            }),
        };
        (step, result)
    }
}

async fn handle_success(
    dag: &mut ExecutionDag,
    outputs: &mut HashMap<StepId, Value>,
    step: &Step,
    output: Value,
    ctx: &ExecutorContext,
) {
    let preview = truncate_json_for_log(&output, MAX_PREVIEW_CHARS);
    if !dag.mark_completed(&step.id, output.clone()) {
        return;
    }
    outputs.insert(step.id.clone(), output);

    let elapsed_ms = dag
        .get_node(&step.id)
        .and_then(|node| Some((node.finished_at? - node.started_at?).num_milliseconds()));
    tracing::info!(
        run_id = %ctx.run_id,
        step_id = %step.id,
        tool = %step.tool,
        elapsed_ms = ?elapsed_ms,
        "step execution completed"
    );
    report_progress(
        ctx,
        ExecutionProgressEvent::new(
            ctx.run_id.clone(),
            Some(step.id.clone()),
            Some(step.tool.clone()),
            "step_completed",
        )
        .with_metadata(json!({ "output_preview": preview })),
    )
    .await;
}

async fn handle_failure(
    dag: &mut ExecutionDag,
    step: &Step,
    failure: StepFailure,
    ctx: &ExecutorContext,
) {
    tracing::warn!(
        run_id = %ctx.run_id,
        step_id = %step.id,
        tool = %step.tool,
        error = %failure,
        "step execution failed"
    );
    let message = failure.to_string();
    if !dag.mark_failed(&step.id, failure) {
        return;
    }
    report_progress(
        ctx,
        ExecutionProgressEvent::new(
            ctx.run_id.clone(),
            Some(step.id.clone()),
            Some(step.tool.clone()),
            "step_failed",
        )
        .with_message(message),
    )
    .await;

    for skipped in dag.skip_dependents_of(&step.id) {
        report_skipped(dag, &skipped, ctx).await;
    }
}

async fn report_skipped(dag: &ExecutionDag, step_id: &StepId, ctx: &ExecutorContext) {
    let Some(node) = dag.get_node(step_id) else {
        return;
    };
    let reason = node
        .skip_reason
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    tracing::info!(
        run_id = %ctx.run_id,
        step_id = %step_id,
        tool = %node.step.tool,
        reason = %reason,
        "step skipped"
    );
    report_progress(
        ctx,
        ExecutionProgressEvent::new(
            ctx.run_id.clone(),
            Some(step_id.clone()),
            Some(node.step.tool.clone()),
            "step_skipped",
        )
        .with_message(reason),
    )
    .await;
}

async fn report_progress(ctx: &ExecutorContext, event: ExecutionProgressEvent) {
    if let Some(reporter) = &ctx.progress_reporter {
        if let Err(err) = reporter.report(event).await {
            tracing::warn!("failed to report execution progress: {}", err);
        }
    }
}
