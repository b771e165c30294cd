//! Plan type definitions

use serde::{Deserialize, Serialize};

use super::{Step, StepId};

/// A planner-produced collection of steps for one goal.
///
/// The step dependency graph must be acyclic; the executor rejects the
/// plan otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Unique identifier for this plan
    #[serde(default = "new_plan_id")]
    pub id: String,
    /// The goal this plan is meant to satisfy
    #[serde(default)]
    pub goal: String,
    /// Steps, in planner declaration order
    #[serde(default)]
    pub steps: Vec<Step>,
    /// 0 for the first plan, incremented on every revision
    #[serde(default)]
    pub revision: u32,
    /// Optional planner confidence (0.0 - 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

fn new_plan_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Plan {
    pub fn new(goal: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            id: new_plan_id(),
            goal: goal.into(),
            steps,
            revision: 0,
            confidence: None,
        }
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id.as_str() == id)
    }

    pub fn step_ids(&self) -> Vec<StepId> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    /// Distinct tool names in declaration order.
    pub fn tools(&self) -> Vec<&str> {
        let mut tools: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !tools.contains(&step.tool.as_str()) {
                tools.push(step.tool.as_str());
            }
        }
        tools
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_deserialize_assigns_id_and_revision_zero() {
        let plan: Plan = serde_json::from_value(json!({
            "goal": "create a job",
            "steps": [{"id": "s1", "tool": "create_job"}]
        }))
        .expect("plan");
        assert!(!plan.id.is_empty());
        assert_eq!(plan.revision, 0);
        assert_eq!(plan.get_step("s1").map(|s| s.tool.as_str()), Some("create_job"));
    }

    #[test]
    fn test_plan_tools_are_distinct_in_declaration_order() {
        let plan = Plan::new(
            "estimates",
            vec![
                Step::new("a", "create_job"),
                Step::new("b", "create_estimate"),
                Step::new("c", "create_job"),
            ],
        );
        assert_eq!(plan.tools(), vec!["create_job", "create_estimate"]);
    }
}
