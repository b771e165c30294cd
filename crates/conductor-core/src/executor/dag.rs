//! Execution DAG
//!
//! Per-run step state owned by the executor loop. Nodes keep plan
//! declaration order so ready sets and outcomes are deterministic.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::normalizer::PlanRejection;
use crate::types::{Plan, PlanOutcome, SkipReason, Step, StepFailure, StepId, StepOutcome, StepStatus};

/// A node in the execution DAG
#[derive(Debug, Clone)]
pub struct DagNode {
    /// The step definition
    pub step: Step,
    pub status: StepStatus,
    /// Steps that depend on this node (reverse dependencies)
    pub dependents: Vec<StepId>,
    pub output: Option<Value>,
    pub failure: Option<StepFailure>,
    pub skip_reason: Option<SkipReason>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DagNode {
    pub fn new(step: Step) -> Self {
        Self {
            step,
            status: StepStatus::Pending,
            dependents: Vec::new(),
            output: None,
            failure: None,
            skip_reason: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn to_outcome(&self) -> StepOutcome {
        StepOutcome {
            step_id: self.step.id.clone(),
            tool: self.step.tool.clone(),
            status: self.status,
            output: self.output.clone(),
            failure: self.failure.clone(),
            skip_reason: self.skip_reason.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// Dependency graph of one plan execution
#[derive(Debug, Clone, Default)]
pub struct ExecutionDag {
    nodes: HashMap<StepId, DagNode>,
    /// Step IDs in plan declaration order
    order: Vec<StepId>,
}

impl ExecutionDag {
    /// Build a DAG from a plan. Cycles are not checked here.
    pub fn from_plan(plan: &Plan) -> Result<Self, PlanRejection> {
        let mut dag = Self::default();

        for step in &plan.steps {
            if dag.nodes.contains_key(&step.id) {
                return Err(PlanRejection::DuplicateStepId(step.id.clone()));
            }
            dag.order.push(step.id.clone());
            dag.nodes.insert(step.id.clone(), DagNode::new(step.clone()));
        }

        for step in &plan.steps {
            for dep_id in &step.depends_on {
                let dep_node =
                    dag.nodes
                        .get_mut(dep_id)
                        .ok_or_else(|| PlanRejection::MissingDependency {
                            step: step.id.clone(),
                            dependency: dep_id.clone(),
                        })?;
                if !dep_node.dependents.contains(&step.id) {
                    dep_node.dependents.push(step.id.clone());
                }
            }
        }

        Ok(dag)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get_node(&self, id: &StepId) -> Option<&DagNode> {
        self.nodes.get(id)
    }

    pub fn status(&self, id: &StepId) -> Option<StepStatus> {
        self.nodes.get(id).map(|n| n.status)
    }

    /// Pending steps whose dependencies have all completed, in declaration order.
    pub fn ready_steps(&self) -> Vec<StepId> {
        self.order
            .iter()
            .filter(|id| {
                self.nodes.get(*id).is_some_and(|node| {
                    node.status == StepStatus::Pending
                        && node.step.depends_on.iter().all(|dep| {
                            self.status(dep) == Some(StepStatus::Completed)
                        })
                })
            })
            .cloned()
            .collect()
    }

    /// Whether every step reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.nodes.values().all(|n| n.status.is_terminal())
    }

    /// Apply a guarded state transition. Illegal moves are logged and ignored.
    fn transition(&mut self, id: &StepId, next: StepStatus) -> Option<&mut DagNode> {
        let node = self.nodes.get_mut(id)?;
        if !node.status.can_transition_to(next) {
            tracing::warn!(
                step_id = %id,
                from = ?node.status,
                to = ?next,
                "ignoring illegal step state transition"
            );
            return None;
        }
        node.status = next;
        Some(node)
    }

    /// Mark a node as running. Returns false if the move was illegal.
    pub fn mark_running(&mut self, id: &StepId) -> bool {
        match self.transition(id, StepStatus::Running) {
            Some(node) => {
                node.started_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn mark_completed(&mut self, id: &StepId, output: Value) -> bool {
        match self.transition(id, StepStatus::Completed) {
            Some(node) => {
                node.output = Some(output);
                node.finished_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    pub fn mark_failed(&mut self, id: &StepId, failure: StepFailure) -> bool {
        match self.transition(id, StepStatus::Failed) {
            Some(node) => {
                node.failure = Some(failure);
                node.finished_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    fn mark_skipped(&mut self, id: &StepId, reason: SkipReason) -> bool {
        match self.transition(id, StepStatus::Skipped) {
            Some(node) => {
                node.skip_reason = Some(reason);
                true
            }
            None => false,
        }
    }

    /// Skip every direct and transitive dependent of `failed`.
    ///
    /// Each skipped step records `failed` as its blocking step. Returns the
    /// skipped IDs in visit order.
    pub fn skip_dependents_of(&mut self, failed: &StepId) -> Vec<StepId> {
        let mut skipped = Vec::new();
        let mut queue: VecDeque<StepId> = self
            .nodes
            .get(failed)
            .map(|n| n.dependents.iter().cloned().collect())
            .unwrap_or_default();

        while let Some(id) = queue.pop_front() {
            if self.status(&id) != Some(StepStatus::Pending) {
                continue;
            }
            let reason = SkipReason::DependencyFailed {
                step_id: failed.clone(),
            };
            if self.mark_skipped(&id, reason) {
                if let Some(node) = self.nodes.get(&id) {
                    queue.extend(node.dependents.iter().cloned());
                }
                skipped.push(id);
            }
        }
        skipped
    }

    /// Skip every step that has not been dispatched yet.
    pub fn skip_pending(&mut self, reason: SkipReason) -> Vec<StepId> {
        let pending: Vec<StepId> = self
            .order
            .iter()
            .filter(|id| self.status(id) == Some(StepStatus::Pending))
            .cloned()
            .collect();
        pending
            .into_iter()
            .filter(|id| self.mark_skipped(id, reason.clone()))
            .collect()
    }

    /// Per-step outcomes in declaration order.
    pub fn step_outcomes(&self) -> Vec<StepOutcome> {
        self.order
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .map(DagNode::to_outcome)
            .collect()
    }

    /// Aggregate the run into a plan outcome.
    pub fn into_outcome(
        self,
        run_id: impl Into<String>,
        plan: &Plan,
        started_at: DateTime<Utc>,
        cancelled: bool,
    ) -> PlanOutcome {
        PlanOutcome {
            run_id: run_id.into(),
            plan_id: plan.id.clone(),
            goal: plan.goal.clone(),
            revision: plan.revision,
            steps: self.step_outcomes(),
            started_at,
            finished_at: Utc::now(),
            cancelled,
        }
    }
}
