//! Planner module
//!
//! The Planner is an external capability that turns a goal into either a
//! Plan or a direct answer. The engine treats it as opaque: it only sees
//! the request it builds here and the output it gets back.
//!
//! The Planner does NOT handle:
//! - Placeholder resolution
//! - Parallel/timeout strategies
//! - Runtime error recovery

mod parse;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::tool::ToolDescriptor;
use crate::types::{Plan, PlanOutcome};

pub use parse::{extract_json, parse_planner_output};

/// Planner errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to generate plan: {0}")]
    Generation(String),

    #[error("planner unavailable: {0}")]
    Unavailable(String),

    #[error("no suitable tools found for goal")]
    NoSuitableTools,

    #[error("internal error: {0}")]
    Internal(String),
}

/// What the planner produced for one request
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// Steps to execute
    Workflow(Plan),
    /// Answer that needs no tool invocation
    DirectResponse(String),
}

/// Planner trait - produces plans from goals
///
/// Implementations can use different model backends or planning strategies.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlanRequest) -> Result<PlannerOutput, PlanError>;
}

/// Input handed to the planner
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Orchestration run ID
    pub run_id: String,
    /// The user's goal, unchanged across revisions
    pub goal: String,
    /// Catalog descriptors the plan may use
    pub available_tools: Vec<ToolDescriptor>,
    /// Caller-supplied context (customer id, locale, ...)
    pub context: HashMap<String, Value>,
    /// 0 for the first request, incremented on every revision
    pub revision: u32,
    /// Outcome of the previous iteration, if any
    pub prior_outcome: Option<PlanOutcome>,
    /// Why the previous iteration was not accepted
    pub prior_reason: Option<String>,
    /// Every earlier reason, oldest first
    pub feedback_history: Vec<String>,
}

impl PlanRequest {
    pub fn new(goal: impl Into<String>, available_tools: Vec<ToolDescriptor>) -> Self {
        Self {
            goal: goal.into(),
            available_tools,
            ..Self::default()
        }
    }

    pub fn is_revision(&self) -> bool {
        self.revision > 0
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.available_tools.iter().find(|t| t.name == name)
    }

    /// Plain-text tool listing for prompt construction.
    pub fn render_tool_catalog(&self) -> String {
        self.available_tools
            .iter()
            .map(|tool| {
                let required = tool.required_inputs();
                if required.is_empty() {
                    format!("- {}: {}", tool.name, tool.description)
                } else {
                    format!(
                        "- {}: {} (required inputs: {})",
                        tool.name,
                        tool.description,
                        required.join(", ")
                    )
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
