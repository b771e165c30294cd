//! Step type definitions
//!
//! A Step is one tool invocation inside a Plan.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Strongly-typed Step ID, unique within its plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct StepId(pub String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for StepId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&StepId> for StepId {
    fn from(value: &StepId) -> Self {
        value.clone()
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for StepId {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Copies a value out of a dependency's output into a top-level input key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepIoBinding {
    /// Source reference, `<step_id>` or `<step_id>.<path>` (e.g. "s1.job_id")
    pub from: String,
    /// Target key in this step's params
    pub to: String,
    /// Whether a missing source value fails the step
    #[serde(default = "default_true")]
    pub required: bool,
}

impl StepIoBinding {
    pub fn required(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            required: true,
        }
    }

    pub fn optional(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            required: false,
        }
    }

    /// Step ID referenced by `from`.
    pub fn source_step(&self) -> StepId {
        match self.from.split_once('.') {
            Some((step, _)) => StepId::from(step.trim()),
            None => StepId::from(self.from.trim()),
        }
    }
}

fn default_true() -> bool {
    true
}

/// A single step in a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique identifier within the plan
    pub id: StepId,
    /// Name of the catalog tool to invoke
    #[serde(alias = "action")]
    pub tool: String,
    /// IDs of steps that must complete before this one
    #[serde(default)]
    pub depends_on: Vec<StepId>,
    /// Explicit upstream output -> input bindings
    #[serde(default)]
    pub io_bindings: Vec<StepIoBinding>,
    /// Tool arguments; string values may hold `{{step_id.path}}` placeholders
    #[serde(default)]
    pub params: Value,
}

impl Step {
    /// Create a step invoking `tool`
    pub fn new(id: impl Into<StepId>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            depends_on: Vec::new(),
            io_bindings: Vec::new(),
            params: Value::Null,
        }
    }

    pub fn with_depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_io_bindings(mut self, io_bindings: Vec<StepIoBinding>) -> Self {
        self.io_bindings = io_bindings;
        self
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Whether this step can run without waiting on any other step.
    pub fn is_root(&self) -> bool {
        self.depends_on.is_empty()
    }
}
