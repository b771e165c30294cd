//! Decoding of text-producing planners

use serde::Deserialize;
use serde_json::Value;

use super::{PlanError, PlannerOutput};
use crate::types::{Plan, Step};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireOutput {
    Workflow {
        #[serde(default)]
        goal: String,
        #[serde(default)]
        steps: Vec<Step>,
        #[serde(default)]
        confidence: Option<f32>,
    },
    DirectResponse {
        message: String,
    },
}

/// Outermost `{...}` span of `text`, if any.
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

/// Decode planner text into a [`PlannerOutput`].
///
/// Accepts `{"type": "WORKFLOW", "steps": [...]}`,
/// `{"type": "DIRECT_RESPONSE", "message": "..."}`, or an untagged plan
/// object with a `steps` array. Surrounding prose and code fences are ignored.
pub fn parse_planner_output(text: &str) -> Result<PlannerOutput, PlanError> {
    let json_str = extract_json(text)
        .ok_or_else(|| PlanError::Generation("planner output did not contain JSON".to_string()))?;
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| PlanError::Generation(format!("invalid planner JSON: {}", e)))?;

    if value.get("type").is_none() && value.get("steps").is_some() {
        let plan = serde_json::from_value::<Plan>(value)
            .map_err(|e| PlanError::Generation(format!("invalid plan JSON: {}", e)))?;
        return Ok(PlannerOutput::Workflow(plan));
    }

    let wire = serde_json::from_value::<WireOutput>(value)
        .map_err(|e| PlanError::Generation(format!("invalid planner output: {}", e)))?;
    Ok(match wire {
        WireOutput::Workflow {
            goal,
            steps,
            confidence,
        } => {
            let mut plan = Plan::new(goal, steps);
            plan.confidence = confidence;
            PlannerOutput::Workflow(plan)
        }
        WireOutput::DirectResponse { message } => PlannerOutput::DirectResponse(message),
    })
}
