//! Tool abstraction module
//!
//! This module defines the Tool trait and the read-only catalog the executor
//! invokes tools through:
//! - Tool: one named, side-effecting business operation
//! - ToolDescriptor: name, description and input/output schemas
//! - ToolCatalog: name-keyed registry with schema-checked invocation

mod catalog;
mod context;
pub mod schema;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use catalog::{ToolCatalog, ToolError};
pub use context::ToolContext;

// Re-export CancellationToken for tool implementations
pub use tokio_util::sync::CancellationToken;

/// Tool trait - a catalog entry the executor can invoke
///
/// Tools are opaque to the executor. Implementations must be safe to call
/// concurrently from several steps.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    /// Human-readable description (shown to planners)
    fn description(&self) -> &str;

    /// Descriptor with input/output schemas. Read once at registration.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name(), self.description())
    }

    /// Invoke the tool with already validated input
    async fn invoke(&self, input: ToolInput, ctx: ToolContext) -> Result<Value, ToolFailure>;
}

/// Immutable description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema for the resolved input. `null` accepts anything.
    #[serde(default)]
    pub input_schema: Value,
    /// JSON schema for the output. `null` accepts anything.
    #[serde(default)]
    pub output_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: Value::Null,
            output_schema: Value::Null,
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }

    /// Required top-level input fields, in schema order.
    pub fn required_inputs(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|v| v.as_array())
            .map(|fields| fields.iter().filter_map(|f| f.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Input handed to a tool invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    /// Resolved parameters (placeholders substituted)
    #[serde(default)]
    pub params: Value,
}

impl ToolInput {
    pub fn new(params: Value) -> Self {
        Self { params }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str())
    }

    /// Get a parameter by JSON pointer (e.g., "/job/id")
    pub fn get_param(&self, pointer: &str) -> Option<&Value> {
        self.params.pointer(pointer)
    }
}

/// Error returned by a tool implementation.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolFailure {
    pub message: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ToolFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an underlying cause.
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
