//! Tool catalog - read-only, name-keyed tool registry

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::schema;
use super::{Tool, ToolContext, ToolDescriptor, ToolFailure, ToolInput};
use crate::types::StepFailure;

/// Catalog errors
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("tool '{tool}' {direction} schema validation failed: {violation}")]
    SchemaValidation {
        tool: String,
        direction: &'static str,
        violation: schema::SchemaViolation,
    },

    #[error("tool '{tool}' execution failed: {source}")]
    Execution {
        tool: String,
        #[source]
        source: ToolFailure,
    },
}

impl ToolError {
    /// Per-step failure record for this error.
    pub fn to_step_failure(&self) -> StepFailure {
        match self {
            Self::DuplicateTool(tool) | Self::UnknownTool(tool) => {
                StepFailure::UnknownTool { tool: tool.clone() }
            }
            Self::SchemaValidation {
                tool,
                direction,
                violation,
            } => StepFailure::SchemaValidation {
                tool: tool.clone(),
                direction: direction.to_string(),
                reason: violation.to_string(),
            },
            Self::Execution { tool, source } => StepFailure::ToolExecution {
                tool: tool.clone(),
                message: source.to_string(),
            },
        }
    }
}

struct CatalogEntry {
    tool: Arc<dyn Tool>,
    descriptor: ToolDescriptor,
}

/// Registry of invocable tools
///
/// Built once at startup, then shared behind an `Arc`. Every method after
/// registration takes `&self`, so concurrent invocations need no locking.
#[derive(Default)]
pub struct ToolCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let descriptor = tool.descriptor();
        if self.entries.contains_key(&descriptor.name) {
            return Err(ToolError::DuplicateTool(descriptor.name));
        }
        tracing::debug!(tool = %descriptor.name, "tool registered");
        self.entries
            .insert(descriptor.name.clone(), CatalogEntry { tool, descriptor });
        Ok(())
    }

    /// Builder-style registration.
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, ToolError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, ToolError> {
        self.entries
            .get(name)
            .map(|entry| &entry.descriptor)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .entries
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Check `input` against the tool's input schema without invoking it.
    pub fn validate_input(&self, name: &str, input: &Value) -> Result<(), ToolError> {
        let descriptor = self.lookup(name)?;
        schema::validate(input, &descriptor.input_schema).map_err(|violation| {
            ToolError::SchemaValidation {
                tool: name.to_string(),
                direction: "input",
                violation,
            }
        })
    }

    /// Validate input, call the tool, validate its output.
    pub async fn invoke(
        &self,
        name: &str,
        input: Value,
        ctx: ToolContext,
    ) -> Result<Value, ToolError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        self.validate_input(name, &input)?;

        let output = entry
            .tool
            .invoke(ToolInput::new(input), ctx)
            .await
            .map_err(|source| ToolError::Execution {
                tool: name.to_string(),
                source,
            })?;

        schema::validate(&output, &entry.descriptor.output_schema).map_err(|violation| {
            ToolError::SchemaValidation {
                tool: name.to_string(),
                direction: "output",
                violation,
            }
        })?;
        Ok(output)
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CreateJobTool {
        calls: Arc<AtomicUsize>,
        output: Value,
    }

    impl CreateJobTool {
        fn new(output: Value) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                output,
            }
        }
    }

    #[async_trait]
    impl Tool for CreateJobTool {
        fn name(&self) -> &str {
            "create_job"
        }

        fn description(&self) -> &str {
            "Create a job for a client"
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor::new(self.name(), self.description())
                .with_input_schema(json!({
                    "type": "object",
                    "properties": { "title": { "type": "string" } },
                    "required": ["title"]
                }))
                .with_output_schema(json!({
                    "type": "object",
                    "properties": { "job_id": { "type": "string" } },
                    "required": ["job_id"]
                }))
        }

        async fn invoke(&self, _input: ToolInput, _ctx: ToolContext) -> Result<Value, ToolFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.output.clone())
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "send_estimate"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn invoke(&self, _input: ToolInput, _ctx: ToolContext) -> Result<Value, ToolFailure> {
            Err(ToolFailure::with_source(
                "mail gateway rejected the message",
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            ))
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new("run-1", "s1")
    }

    #[test]
    fn test_register_rejects_duplicate_names() {
        let mut catalog = ToolCatalog::new();
        catalog
            .register(Arc::new(CreateJobTool::new(json!({"job_id": "j1"}))))
            .expect("first registration");
        let err = catalog
            .register(Arc::new(CreateJobTool::new(json!({"job_id": "j2"}))))
            .expect_err("duplicate");
        assert!(matches!(err, ToolError::DuplicateTool(name) if name == "create_job"));
    }

    #[test]
    fn test_lookup_unknown_tool_fails() {
        let catalog = ToolCatalog::new();
        assert!(matches!(
            catalog.lookup("create_job"),
            Err(ToolError::UnknownTool(_))
        ));
    }

    #[test]
    fn test_invoke_validates_input_before_calling_tool() {
        tokio_test::block_on(async {
            let tool = Arc::new(CreateJobTool::new(json!({"job_id": "j1"})));
            let calls = tool.calls.clone();
            let catalog = ToolCatalog::new().with_tool(tool).expect("catalog");

            let err = catalog
                .invoke("create_job", json!({"name": "missing title"}), ctx())
                .await
                .expect_err("schema mismatch");
            assert!(matches!(
                err,
                ToolError::SchemaValidation {
                    direction: "input",
                    ..
                }
            ));
            assert_eq!(calls.load(Ordering::SeqCst), 0);

            let output = catalog
                .invoke("create_job", json!({"title": "Fence"}), ctx())
                .await
                .expect("invoke");
            assert_eq!(output, json!({"job_id": "j1"}));
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        });
    }

    #[test]
    fn test_invoke_validates_output() {
        tokio_test::block_on(async {
            let catalog = ToolCatalog::new()
                .with_tool(Arc::new(CreateJobTool::new(json!({"id": 5}))))
                .expect("catalog");
            let err = catalog
                .invoke("create_job", json!({"title": "Fence"}), ctx())
                .await
                .expect_err("bad output");
            assert!(matches!(
                err,
                ToolError::SchemaValidation {
                    direction: "output",
                    ..
                }
            ));
        });
    }

    #[test]
    fn test_execution_error_carries_underlying_cause() {
        tokio_test::block_on(async {
            let catalog = ToolCatalog::new()
                .with_tool(Arc::new(BrokenTool))
                .expect("catalog");
            let err = catalog
                .invoke("send_estimate", json!({}), ctx())
                .await
                .expect_err("tool failure");

            let failure = err.to_step_failure();
            assert_eq!(
                failure,
                StepFailure::ToolExecution {
                    tool: "send_estimate".to_string(),
                    message: "mail gateway rejected the message".to_string(),
                }
            );
            let source = std::error::Error::source(&err).expect("tool failure source");
            assert!(std::error::Error::source(source).is_some());
        });
    }

    #[test]
    fn test_descriptors_sorted_by_name() {
        let catalog = ToolCatalog::new()
            .with_tool(Arc::new(BrokenTool))
            .and_then(|c| c.with_tool(Arc::new(CreateJobTool::new(json!({"job_id": "j"})))))
            .expect("catalog");
        let names: Vec<_> = catalog.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["create_job", "send_estimate"]);
        assert_eq!(
            catalog.lookup("create_job").expect("lookup").required_inputs(),
            vec!["title"]
        );
    }
}
