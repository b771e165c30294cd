//! Plan Normalizer module
//!
//! Every plan passes through the normalizer before a single tool runs.
//!
//! Responsibilities:
//! - Derive implicit dependencies from placeholders and io_bindings
//! - Validate plan correctness against the tool catalog
//! - Reject dependency cycles
//! - Produce an executable DAG for the executor

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::binding;
use crate::executor::ExecutionDag;
use crate::tool::{ToolCatalog, ToolError};
use crate::types::{Plan, Step, StepId};

/// Reasons a plan is refused before execution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanRejection {
    #[error("plan contains a step with an empty id")]
    EmptyStepId,

    #[error("duplicate step id: {0}")]
    DuplicateStepId(StepId),

    #[error("step '{step}' depends on undefined step '{dependency}'")]
    MissingDependency { step: StepId, dependency: StepId },

    #[error("invalid placeholder in step '{step}': {reason}")]
    InvalidPlaceholder { step: StepId, reason: String },

    #[error("step '{step}' uses unknown tool '{tool}'")]
    UnknownTool { step: StepId, tool: String },

    #[error("step '{step}' input does not match tool '{tool}' schema: {reason}")]
    SchemaValidation {
        step: StepId,
        tool: String,
        reason: String,
    },

    #[error("dependency cycle: {}", format_cycle(.steps))]
    CyclicPlan { steps: Vec<StepId> },
}

fn format_cycle(steps: &[StepId]) -> String {
    let mut parts: Vec<&str> = steps.iter().map(StepId::as_str).collect();
    if let Some(first) = steps.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

/// Extra plan checks run after the built-in ones
pub trait PlanValidator: Send + Sync {
    fn validate(&self, plan: &Plan, catalog: &ToolCatalog) -> Result<(), PlanRejection>;
}

/// Normalized plan ready for execution
#[derive(Debug)]
pub struct NormalizedPlan {
    /// The validated plan with derived dependencies
    pub plan: Plan,
    /// The executable DAG
    pub dag: ExecutionDag,
}

/// Plan normalizer
#[derive(Default)]
pub struct PlanNormalizer {
    validators: Vec<Box<dyn PlanValidator>>,
}

impl PlanNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator
    pub fn add_validator(&mut self, validator: Box<dyn PlanValidator>) {
        self.validators.push(validator);
    }

    /// Normalize a plan
    pub fn normalize(
        &self,
        plan: &Plan,
        catalog: &ToolCatalog,
    ) -> Result<NormalizedPlan, PlanRejection> {
        let mut plan = plan.clone();

        // Step 1: Identity checks (later checks key on step ids)
        check_step_ids(&plan)?;

        // Step 2: Derive depends_on from placeholders and io_bindings
        derive_dependencies(&mut plan)?;

        // Step 3: Built-in validations
        self.validate_basic(&plan, catalog)?;

        // Step 4: Custom validators
        for validator in &self.validators {
            validator.validate(&plan, catalog)?;
        }

        // Step 5: Reject cycles, then build the execution DAG
        detect_cycles(&plan)?;
        let dag = ExecutionDag::from_plan(&plan)?;

        Ok(NormalizedPlan { plan, dag })
    }

    fn validate_basic(&self, plan: &Plan, catalog: &ToolCatalog) -> Result<(), PlanRejection> {
        let step_ids: HashSet<&StepId> = plan.steps.iter().map(|s| &s.id).collect();

        for step in &plan.steps {
            for dep in &step.depends_on {
                if dep == &step.id {
                    return Err(PlanRejection::CyclicPlan {
                        steps: vec![step.id.clone()],
                    });
                }
                if !step_ids.contains(dep) {
                    return Err(PlanRejection::MissingDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }

            if !catalog.contains(&step.tool) {
                return Err(PlanRejection::UnknownTool {
                    step: step.id.clone(),
                    tool: step.tool.clone(),
                });
            }

            // Inputs fed by upstream output are checked at dispatch time.
            if !binding::has_runtime_inputs(step) {
                validate_static_input(step, catalog)?;
            }
        }

        Ok(())
    }
}

fn check_step_ids(plan: &Plan) -> Result<(), PlanRejection> {
    let mut seen_ids = HashSet::new();
    for step in &plan.steps {
        if step.id.as_str().trim().is_empty() {
            return Err(PlanRejection::EmptyStepId);
        }
        if !seen_ids.insert(&step.id) {
            return Err(PlanRejection::DuplicateStepId(step.id.clone()));
        }
    }
    Ok(())
}

fn derive_dependencies(plan: &mut Plan) -> Result<(), PlanRejection> {
    let step_ids: HashSet<StepId> = plan.step_ids().into_iter().collect();

    for step in &mut plan.steps {
        let bound =
            binding::binding_references(step).map_err(|err| PlanRejection::InvalidPlaceholder {
                step: step.id.clone(),
                reason: err.to_string(),
            })?;

        let original_depends_on = step.depends_on.clone();
        let mut depends_on: Vec<StepId> = Vec::with_capacity(step.depends_on.len());
        for dep in step.depends_on.drain(..) {
            if !depends_on.contains(&dep) {
                depends_on.push(dep);
            }
        }

        // Placeholders naming no step of this plan are literal text.
        for reference in binding::placeholder_references(&step.params) {
            if step_ids.contains(&reference.step) && !depends_on.contains(&reference.step) {
                depends_on.push(reference.step);
            }
        }

        for reference in bound {
            if !step_ids.contains(&reference.step) {
                return Err(PlanRejection::InvalidPlaceholder {
                    step: step.id.clone(),
                    reason: format!("io binding references unknown step '{}'", reference.step),
                });
            }
            if !depends_on.contains(&reference.step) {
                depends_on.push(reference.step);
            }
        }
        step.depends_on = depends_on;

        if step.depends_on != original_depends_on {
            tracing::debug!(
                step_id = %step.id,
                tool = %step.tool,
                depends_on = ?step.depends_on,
                "normalizer derived depends_on from step inputs"
            );
        }
    }
    Ok(())
}

fn validate_static_input(step: &Step, catalog: &ToolCatalog) -> Result<(), PlanRejection> {
    let input = binding::resolve_input(step, &HashMap::new()).map_err(|err| {
        PlanRejection::InvalidPlaceholder {
            step: step.id.clone(),
            reason: err.to_string(),
        }
    })?;
    catalog
        .validate_input(&step.tool, &input)
        .map_err(|err| match err {
            ToolError::SchemaValidation { violation, .. } => PlanRejection::SchemaValidation {
                step: step.id.clone(),
                tool: step.tool.clone(),
                reason: violation.to_string(),
            },
            _ => PlanRejection::UnknownTool {
                step: step.id.clone(),
                tool: step.tool.clone(),
            },
        })
}

/// Detect cycles in the dependency graph, reporting the steps on the cycle.
///
/// Iterative DFS, so chain length is not bounded by the call stack.
fn detect_cycles(plan: &Plan) -> Result<(), PlanRejection> {
    let deps: HashMap<&StepId, &[StepId]> = plan
        .steps
        .iter()
        .map(|s| (&s.id, s.depends_on.as_slice()))
        .collect();

    let mut visited: HashSet<&StepId> = HashSet::new();
    // Current DFS path with the next neighbor index to try for each node.
    let mut path: Vec<(&StepId, usize)> = Vec::new();
    let mut on_path: HashMap<&StepId, usize> = HashMap::new();

    for root in plan.steps.iter().map(|s| &s.id) {
        if !visited.insert(root) {
            continue;
        }
        on_path.insert(root, 0);
        path.push((root, 0));

        while let Some(&(node, next)) = path.last() {
            let neighbors = deps.get(node).copied().unwrap_or_default();
            let Some(neighbor) = neighbors.get(next) else {
                on_path.remove(node);
                path.pop();
                continue;
            };
            if let Some(top) = path.last_mut() {
                top.1 += 1;
            }
            if let Some(&pos) = on_path.get(neighbor) {
                return Err(PlanRejection::CyclicPlan {
                    steps: path[pos..].iter().map(|(id, _)| (*id).clone()).collect(),
                });
            }
            if visited.insert(neighbor) {
                on_path.insert(neighbor, path.len());
                path.push((neighbor, 0));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::{Tool, ToolContext, ToolDescriptor, ToolFailure, ToolInput};
    use crate::types::StepIoBinding;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;

    struct SchemaTool {
        name: &'static str,
        input_schema: Value,
    }

    #[async_trait]
    impl Tool for SchemaTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new(self.name, "test tool").with_input_schema(self.input_schema.clone())
        }

        async fn invoke(&self, _input: ToolInput, _ctx: ToolContext) -> Result<Value, ToolFailure> {
            Ok(json!({}))
        }
    }

    fn catalog() -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(Arc::new(SchemaTool {
                name: "create_job",
                input_schema: json!({
                    "type": "object",
                    "properties": { "title": { "type": "string" } },
                    "required": ["title"]
                }),
            }))
            .expect("register create_job");
        catalog
            .register(Arc::new(SchemaTool {
                name: "create_estimate",
                input_schema: json!({
                    "type": "object",
                    "required": ["job_id"]
                }),
            }))
            .expect("register create_estimate");
        catalog
            .register(Arc::new(SchemaTool {
                name: "noop",
                input_schema: Value::Null,
            }))
            .expect("register noop");
        catalog
    }

    fn job() -> Step {
        Step::new("job", "create_job").with_params(json!({"title": "Fence"}))
    }

    #[test]
    fn test_normalizer_derives_depends_on_from_placeholders_and_bindings() {
        let plan = Plan::new(
            "derive deps",
            vec![
                job(),
                Step::new("est", "create_estimate")
                    .with_params(json!({"job_id": "{{job.job_id}}"})),
                Step::new("est2", "create_estimate")
                    .with_io_bindings(vec![StepIoBinding::required("job.job_id", "job_id")]),
            ],
        );
        let normalized = PlanNormalizer::new()
            .normalize(&plan, &catalog())
            .expect("normalize");
        assert_eq!(normalized.plan.steps[1].depends_on, vec!["job"]);
        assert_eq!(normalized.plan.steps[2].depends_on, vec!["job"]);
        assert_eq!(normalized.dag.ready_steps(), vec![StepId::from("job")]);
    }

    #[test]
    fn test_cycle_reports_participating_steps() {
        let plan = Plan::new(
            "cycle",
            vec![
                Step::new("a", "noop").with_depends_on(vec!["c"]),
                Step::new("b", "noop").with_depends_on(vec!["a"]),
                Step::new("c", "noop").with_depends_on(vec!["b"]),
                Step::new("d", "noop"),
            ],
        );
        let err = PlanNormalizer::new()
            .normalize(&plan, &catalog())
            .expect_err("cycle");
        assert_eq!(
            err,
            PlanRejection::CyclicPlan {
                steps: vec!["a".into(), "c".into(), "b".into()]
            }
        );
        assert_eq!(err.to_string(), "dependency cycle: a -> c -> b -> a");
    }

    #[test]
    fn test_long_dependency_chain() {
        const LEN: usize = 20_000;
        let chain = |close_loop: bool| {
            let steps: Vec<Step> = (0..LEN)
                .map(|i| {
                    let step = Step::new(format!("s{}", i), "noop");
                    match i {
                        0 if close_loop => step.with_depends_on([format!("s{}", LEN - 1)]),
                        0 => step,
                        _ => step.with_depends_on([format!("s{}", i - 1)]),
                    }
                })
                .collect();
            Plan::new("chain", steps)
        };

        let normalized = PlanNormalizer::new()
            .normalize(&chain(false), &catalog())
            .expect("acyclic chain");
        assert_eq!(normalized.dag.ready_steps(), vec![StepId::from("s0")]);

        match PlanNormalizer::new().normalize(&chain(true), &catalog()) {
            Err(PlanRejection::CyclicPlan { steps }) => assert_eq!(steps.len(), LEN),
            other => panic!("expected cycle, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let plan = Plan::new("self", vec![Step::new("a", "noop").with_depends_on(vec!["a"])]);
        assert_eq!(
            PlanNormalizer::new().normalize(&plan, &catalog()).expect_err("self"),
            PlanRejection::CyclicPlan {
                steps: vec!["a".into()]
            }
        );
    }

    #[test]
    fn test_rejects_duplicate_empty_and_missing_ids() {
        let normalizer = PlanNormalizer::new();
        let dup = Plan::new("dup", vec![Step::new("a", "noop"), Step::new("a", "noop")]);
        assert!(matches!(
            normalizer.normalize(&dup, &catalog()),
            Err(PlanRejection::DuplicateStepId(id)) if id == "a"
        ));

        let empty = Plan::new("empty", vec![Step::new(" ", "noop")]);
        assert_eq!(
            normalizer.normalize(&empty, &catalog()).expect_err("empty id"),
            PlanRejection::EmptyStepId
        );

        let missing = Plan::new(
            "missing",
            vec![Step::new("a", "noop").with_depends_on(vec!["ghost"])],
        );
        assert!(matches!(
            normalizer.normalize(&missing, &catalog()),
            Err(PlanRejection::MissingDependency { .. })
        ));
    }

    #[test]
    fn test_template_text_is_not_a_dependency() {
        let plan = Plan::new(
            "template",
            vec![
                job(),
                Step::new("mail", "noop").with_params(json!({
                    "body": "Hi {{name}}, job {{job.job_id}} is booked"
                })),
            ],
        );
        let normalized = PlanNormalizer::new()
            .normalize(&plan, &catalog())
            .expect("normalize");
        assert_eq!(normalized.plan.steps[1].depends_on, vec!["job"]);
    }

    #[test]
    fn test_io_binding_to_unknown_step_is_rejected() {
        let plan = Plan::new(
            "bad ref",
            vec![Step::new("est", "create_estimate")
                .with_io_bindings(vec![StepIoBinding::required("job.id", "job_id")])],
        );
        assert!(matches!(
            PlanNormalizer::new().normalize(&plan, &catalog()),
            Err(PlanRejection::InvalidPlaceholder { reason, .. }) if reason.contains("'job'")
        ));
    }

    #[test]
    fn test_unknown_tool_and_static_schema_are_checked() {
        let normalizer = PlanNormalizer::new();
        let unknown = Plan::new("unknown", vec![Step::new("a", "launch_rocket")]);
        assert!(matches!(
            normalizer.normalize(&unknown, &catalog()),
            Err(PlanRejection::UnknownTool { tool, .. }) if tool == "launch_rocket"
        ));

        let bad_input = Plan::new(
            "bad input",
            vec![Step::new("job", "create_job").with_params(json!({"title": 7}))],
        );
        assert!(matches!(
            normalizer.normalize(&bad_input, &catalog()),
            Err(PlanRejection::SchemaValidation { .. })
        ));
    }

    #[test]
    fn test_custom_validator_runs() {
        struct MaxSteps(usize);

        impl PlanValidator for MaxSteps {
            fn validate(&self, plan: &Plan, _catalog: &ToolCatalog) -> Result<(), PlanRejection> {
                match plan.steps.get(self.0) {
                    Some(step) => Err(PlanRejection::InvalidPlaceholder {
                        step: step.id.clone(),
                        reason: "too many steps".to_string(),
                    }),
                    None => Ok(()),
                }
            }
        }

        let mut normalizer = PlanNormalizer::new();
        normalizer.add_validator(Box::new(MaxSteps(1)));
        let plan = Plan::new("two", vec![Step::new("a", "noop"), Step::new("b", "noop")]);
        assert!(normalizer.normalize(&plan, &catalog()).is_err());
    }
}
