#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Barrier;

use conductor_core::executor::{ExecutionProgressEvent, ExecutionProgressReporter};
use conductor_core::planner::{PlanError, PlanRequest, Planner, PlannerOutput};
use conductor_core::tool::{Tool, ToolCatalog, ToolContext, ToolFailure, ToolInput};
use conductor_core::types::Plan;
use conductor_core::verifier::{Verdict, Verifier, VerifyError, VerifyRequest};
use conductor_runtime::{Orchestrator, OrchestratorConfig};

/// Shared record of tool invocations, in call order.
pub type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn called_tools(log: &CallLog) -> Vec<String> {
    log.lock()
        .expect("call log")
        .iter()
        .map(|(name, _)| name.clone())
        .collect()
}

pub enum Behavior {
    /// Return a fixed value
    Respond(Value),
    /// Return a tool failure
    Fail(String),
    /// Wait on a shared barrier before responding
    Rendezvous(Arc<Barrier>, Value),
    /// Sleep, giving up early when the run is cancelled
    Slow(Duration),
}

pub struct ScriptedTool {
    name: String,
    behavior: Behavior,
    log: CallLog,
}

impl ScriptedTool {
    pub fn new(name: &str, behavior: Behavior, log: &CallLog) -> Arc<dyn Tool> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            log: log.clone(),
        })
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test tool"
    }

    async fn invoke(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, ToolFailure> {
        self.log
            .lock()
            .expect("call log")
            .push((self.name.clone(), input.params.clone()));
        match &self.behavior {
            Behavior::Respond(value) => Ok(value.clone()),
            Behavior::Fail(message) => Err(ToolFailure::new(message.clone())),
            Behavior::Rendezvous(barrier, value) => {
                barrier.wait().await;
                Ok(value.clone())
            }
            Behavior::Slow(duration) => {
                tokio::select! {
                    _ = tokio::time::sleep(*duration) => Ok(json!({"slept": true})),
                    _ = ctx.cancelled() => Err(ToolFailure::new("interrupted by cancellation")),
                }
            }
        }
    }
}

pub fn catalog(tools: Vec<Arc<dyn Tool>>) -> Arc<ToolCatalog> {
    let mut catalog = ToolCatalog::new();
    for tool in tools {
        catalog.register(tool).expect("register tool");
    }
    Arc::new(catalog)
}

/// Planner that replays a script; the last entry repeats once the script
/// runs out.
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<PlannerOutput>>,
    last: Mutex<Option<PlannerOutput>>,
    requests: Mutex<Vec<PlanRequest>>,
}

impl ScriptedPlanner {
    pub fn new(script: Vec<PlannerOutput>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn repeating(plan: Plan) -> Arc<Self> {
        Self::new(vec![PlannerOutput::Workflow(plan)])
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests").len()
    }

    pub fn requests(&self) -> Vec<PlanRequest> {
        self.requests.lock().expect("requests").clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<PlannerOutput, PlanError> {
        self.requests
            .lock()
            .expect("requests")
            .push(request.clone());
        let next = self.script.lock().expect("script").pop_front();
        let mut last = self.last.lock().expect("last");
        match next {
            Some(output) => {
                *last = Some(output.clone());
                Ok(output)
            }
            None => last
                .clone()
                .ok_or_else(|| PlanError::Internal("empty planner script".to_string())),
        }
    }
}

pub struct FailingPlanner;

#[async_trait]
impl Planner for FailingPlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<PlannerOutput, PlanError> {
        Err(PlanError::Unavailable("model endpoint down".to_string()))
    }
}

/// Verifier that replays verdicts and counts its calls; the last verdict
/// repeats.
pub struct ScriptedVerifier {
    verdicts: Mutex<VecDeque<Verdict>>,
    last: Verdict,
    calls: AtomicUsize,
}

impl ScriptedVerifier {
    pub fn new(verdicts: Vec<Verdict>) -> Arc<Self> {
        let last = verdicts.last().cloned().unwrap_or_else(Verdict::satisfied);
        Arc::new(Self {
            verdicts: Mutex::new(verdicts.into()),
            last,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for ScriptedVerifier {
    async fn verify(&self, _request: &VerifyRequest<'_>) -> Result<Verdict, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.verdicts.lock().expect("verdicts").pop_front();
        Ok(next.unwrap_or_else(|| self.last.clone()))
    }
}

/// Verifier whose backing capability is down; counts its calls.
#[derive(Default)]
pub struct FailingVerifier {
    calls: AtomicUsize,
}

impl FailingVerifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Verifier for FailingVerifier {
    async fn verify(&self, _request: &VerifyRequest<'_>) -> Result<Verdict, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(VerifyError::Unavailable("judge model timed out".to_string()))
    }
}

#[derive(Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ExecutionProgressEvent>>,
}

impl CollectingReporter {
    pub fn phases(&self) -> Vec<String> {
        self.events
            .lock()
            .expect("events")
            .iter()
            .map(|event| event.phase.clone())
            .collect()
    }
}

#[async_trait]
impl ExecutionProgressReporter for CollectingReporter {
    async fn report(&self, event: ExecutionProgressEvent) -> Result<(), String> {
        self.events.lock().expect("events").push(event);
        Ok(())
    }
}

pub fn config(max_iterations: u32) -> OrchestratorConfig {
    OrchestratorConfig::new(Duration::from_secs(2)).with_max_iterations(max_iterations)
}

pub fn orchestrator(
    planner: Arc<dyn Planner>,
    catalog: Arc<ToolCatalog>,
    verifier: Arc<dyn Verifier>,
    config: OrchestratorConfig,
) -> Orchestrator {
    Orchestrator::new(planner, catalog, verifier, config).expect("orchestrator")
}
