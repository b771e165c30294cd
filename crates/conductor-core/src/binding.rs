//! Step input binding
//!
//! Resolves references to upstream step outputs into concrete tool input.
//! Two forms are supported:
//! - placeholders inside `params` strings: `{{s1}}`, `{{s1.job_id}}`,
//!   `{{s1.items.0.id}}`
//! - explicit `io_bindings` that copy a value into a top-level input key
//!
//! A string that is exactly one placeholder is replaced by the referenced
//! value with its JSON type intact; placeholders embedded in longer text are
//! interpolated (strings verbatim, other values as compact JSON).
//!
//! A `{{...}}` span is a reference only when its head names a step of the
//! plan. Any other span, and an unterminated `{{`, is literal text, so
//! template markup such as `"Hi {{name}}"` reaches the tool unchanged.
//! io_bindings stay strict: a binding source must name a plan step.

use std::collections::HashMap;
use std::ops::Range;

use serde_json::Value;
use thiserror::Error;

use crate::types::{Step, StepId};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Binding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("malformed output reference '{0}'")]
    Malformed(String),

    #[error("no output available for step '{0}'")]
    MissingOutput(StepId),

    #[error("step '{step}' output has no value at '{path}'")]
    MissingPath { step: StepId, path: String },

    #[error("params must be an object when using io_bindings")]
    NonObjectParams,
}

/// A parsed `{{step.path}}` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRef {
    pub step: StepId,
    pub path: Vec<String>,
}

impl OutputRef {
    /// Parse `s1` or `s1.a.b`.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        let mut parts = reference.split('.');
        let step = parts.next().filter(|s| !s.is_empty())?;
        let path: Vec<String> = parts.map(|p| p.to_string()).collect();
        if path.iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self {
            step: StepId::from(step),
            path,
        })
    }

    /// Look up the referenced value in completed step outputs.
    pub fn resolve<'a>(
        &self,
        outputs: &'a HashMap<StepId, Value>,
    ) -> Result<&'a Value, BindingError> {
        let mut current = outputs
            .get(&self.step)
            .ok_or_else(|| BindingError::MissingOutput(self.step.clone()))?;
        for segment in &self.path {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| BindingError::MissingPath {
                step: self.step.clone(),
                path: self.path.join("."),
            })?;
        }
        Ok(current)
    }
}

/// Output references made by `{{...}}` spans anywhere in `params`.
///
/// Spans that do not parse as `step` or `step.path` are skipped.
pub fn placeholder_references(params: &Value) -> Vec<OutputRef> {
    let mut refs = Vec::new();
    collect_placeholders(params, &mut refs);
    refs
}

/// Output references declared by the step's io_bindings.
pub fn binding_references(step: &Step) -> Result<Vec<OutputRef>, BindingError> {
    step.io_bindings
        .iter()
        .map(|binding| {
            OutputRef::parse(&binding.from)
                .ok_or_else(|| BindingError::Malformed(binding.from.clone()))
        })
        .collect()
}

/// Every output reference used by a step (placeholders, then io_bindings).
pub fn step_references(step: &Step) -> Result<Vec<OutputRef>, BindingError> {
    let mut refs = placeholder_references(&step.params);
    refs.extend(binding_references(step)?);
    Ok(refs)
}

/// Whether the step's input may depend on upstream output.
pub fn has_runtime_inputs(step: &Step) -> bool {
    !step.io_bindings.is_empty() || contains_placeholder(&step.params)
}

fn contains_placeholder(value: &Value) -> bool {
    match value {
        Value::String(text) => !placeholder_spans(text).is_empty(),
        Value::Array(items) => items.iter().any(contains_placeholder),
        Value::Object(map) => map.values().any(contains_placeholder),
        _ => false,
    }
}

fn collect_placeholders(value: &Value, refs: &mut Vec<OutputRef>) {
    match value {
        Value::String(text) => refs.extend(
            placeholder_spans(text)
                .into_iter()
                .filter_map(|(_, inner)| OutputRef::parse(inner)),
        ),
        Value::Array(items) => items.iter().for_each(|v| collect_placeholders(v, refs)),
        Value::Object(map) => map.values().for_each(|v| collect_placeholders(v, refs)),
        _ => {}
    }
}

/// Byte range and inner text of every closed `{{...}}` span in `text`.
/// An unterminated `{{` ends the scan.
fn placeholder_spans(text: &str) -> Vec<(Range<usize>, &str)> {
    let mut spans = Vec::new();
    let mut offset = 0;
    while let Some(found) = text[offset..].find(OPEN) {
        let inner_start = offset + found + OPEN.len();
        let Some(len) = text[inner_start..].find(CLOSE) else {
            break;
        };
        let inner_end = inner_start + len;
        spans.push((offset + found..inner_end + CLOSE.len(), &text[inner_start..inner_end]));
        offset = inner_end + CLOSE.len();
    }
    spans
}

/// Produce the concrete input for `step` from completed upstream outputs.
///
/// Omitted (`null`) params resolve to an empty object.
pub fn resolve_input(step: &Step, outputs: &HashMap<StepId, Value>) -> Result<Value, BindingError> {
    let mut params = match substitute(&step.params, outputs)? {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };

    for binding in &step.io_bindings {
        let reference = OutputRef::parse(&binding.from)
            .ok_or_else(|| BindingError::Malformed(binding.from.clone()))?;
        let value = match reference.resolve(outputs) {
            Ok(value) => value.clone(),
            Err(err) if binding.required => return Err(err),
            Err(_) => {
                tracing::debug!(
                    step_id = %step.id,
                    from = %binding.from,
                    to = %binding.to,
                    "optional io binding missing"
                );
                continue;
            }
        };
        match &mut params {
            Value::Object(map) => {
                map.insert(binding.to.clone(), value);
            }
            _ => return Err(BindingError::NonObjectParams),
        }
    }

    Ok(params)
}

fn substitute(value: &Value, outputs: &HashMap<StepId, Value>) -> Result<Value, BindingError> {
    match value {
        Value::String(text) => substitute_text(text, outputs),
        Value::Array(items) => items
            .iter()
            .map(|v| substitute(v, outputs))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| substitute(v, outputs).map(|v| (k.clone(), v)))
            .collect::<Result<serde_json::Map<_, _>, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn substitute_text(text: &str, outputs: &HashMap<StepId, Value>) -> Result<Value, BindingError> {
    // Only spans naming an available step output are references.
    let references: Vec<(Range<usize>, OutputRef)> = placeholder_spans(text)
        .into_iter()
        .filter_map(|(range, inner)| OutputRef::parse(inner).map(|r| (range, r)))
        .filter(|(_, reference)| outputs.contains_key(&reference.step))
        .collect();
    if references.is_empty() {
        return Ok(Value::String(text.to_string()));
    }

    let leading = text.len() - text.trim_start().len();
    let trailing = text.trim_end().len();
    if let [(range, reference)] = references.as_slice() {
        if range.start == leading && range.end == trailing {
            return reference.resolve(outputs).cloned();
        }
    }

    let mut rendered = String::with_capacity(text.len());
    let mut cursor = 0;
    for (range, reference) in &references {
        rendered.push_str(&text[cursor..range.start]);
        match reference.resolve(outputs)? {
            Value::String(s) => rendered.push_str(s),
            other => rendered.push_str(&other.to_string()),
        }
        cursor = range.end;
    }
    rendered.push_str(&text[cursor..]);
    Ok(Value::String(rendered))
}
