//! Minimal JSON-Schema checker used for tool inputs and outputs.
//!
//! Supported keywords: `type`, `const`, `enum`, `required`, `properties`,
//! `additionalProperties: false`, `items`, `minLength`, `minimum`, `maximum`.
//! A `null` schema accepts every value.

use serde_json::Value;
use std::fmt;

/// First schema violation found, with its JSON path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.message)
    }
}

impl std::error::Error for SchemaViolation {}

/// Validate `value` against `schema`.
pub fn validate(value: &Value, schema: &Value) -> Result<(), SchemaViolation> {
    if schema.is_null() {
        return Ok(());
    }
    validate_at(value, schema, "$")
}

fn validate_at(value: &Value, schema: &Value, path: &str) -> Result<(), SchemaViolation> {
    let schema_obj = schema
        .as_object()
        .ok_or_else(|| SchemaViolation::new(path, "has a schema that is not an object"))?;

    if let Some(type_spec) = schema_obj.get("type") {
        check_type(value, type_spec, path)?;
    }

    if let Some(constant) = schema_obj.get("const") {
        if value != constant {
            return Err(SchemaViolation::new(
                path,
                format!("expected const {}", constant),
            ));
        }
    }

    if let Some(variants) = schema_obj.get("enum").and_then(|v| v.as_array()) {
        if !variants.iter().any(|candidate| candidate == value) {
            return Err(SchemaViolation::new(
                path,
                "is not one of the allowed enum values",
            ));
        }
    }

    if let (Some(min_len), Some(text)) = (
        schema_obj.get("minLength").and_then(|v| v.as_u64()),
        value.as_str(),
    ) {
        if (text.chars().count() as u64) < min_len {
            return Err(SchemaViolation::new(
                path,
                format!("is shorter than {} characters", min_len),
            ));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema_obj.get("minimum").and_then(|v| v.as_f64()) {
            if number < min {
                return Err(SchemaViolation::new(path, format!("is below minimum {}", min)));
            }
        }
        if let Some(max) = schema_obj.get("maximum").and_then(|v| v.as_f64()) {
            if number > max {
                return Err(SchemaViolation::new(path, format!("is above maximum {}", max)));
            }
        }
    }

    if let Some(required) = schema_obj.get("required").and_then(|v| v.as_array()) {
        let object = value
            .as_object()
            .ok_or_else(|| SchemaViolation::new(path, "must be an object"))?;
        for key in required.iter().filter_map(|v| v.as_str()) {
            if !object.contains_key(key) {
                return Err(SchemaViolation::new(
                    path,
                    format!("is missing required field '{}'", key),
                ));
            }
        }
    }

    if let Some(properties) = schema_obj.get("properties").and_then(|v| v.as_object()) {
        let object = value
            .as_object()
            .ok_or_else(|| SchemaViolation::new(path, "must be an object"))?;
        for (key, property_schema) in properties {
            if let Some(child) = object.get(key) {
                validate_at(child, property_schema, &format!("{}.{}", path, key))?;
            }
        }

        if schema_obj.get("additionalProperties").and_then(|v| v.as_bool()) == Some(false) {
            if let Some(unknown) = object.keys().find(|k| !properties.contains_key(*k)) {
                return Err(SchemaViolation::new(
                    path,
                    format!("contains unknown field '{}'", unknown),
                ));
            }
        }
    }

    if let Some(item_schema) = schema_obj.get("items") {
        let array = value
            .as_array()
            .ok_or_else(|| SchemaViolation::new(path, "must be an array"))?;
        for (idx, item) in array.iter().enumerate() {
            validate_at(item, item_schema, &format!("{}[{}]", path, idx))?;
        }
    }

    Ok(())
}

fn check_type(value: &Value, type_spec: &Value, path: &str) -> Result<(), SchemaViolation> {
    let matches = |t: &str| match t {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => false,
    };

    match type_spec {
        Value::String(type_name) if matches(type_name.as_str()) => Ok(()),
        Value::String(type_name) => Err(SchemaViolation::new(
            path,
            format!("expected type '{}'", type_name),
        )),
        Value::Array(types) if types.iter().filter_map(|t| t.as_str()).any(matches) => Ok(()),
        Value::Array(_) => Err(SchemaViolation::new(
            path,
            "did not match any allowed type",
        )),
        _ => Err(SchemaViolation::new(
            path,
            "has a schema.type that is neither a string nor an array",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "minLength": 1 },
                "hours": { "type": "number", "minimum": 0 },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["title"],
            "additionalProperties": false
        })
    }

    #[test]
    fn test_null_schema_accepts_anything() {
        assert!(validate(&json!([1, "x"]), &Value::Null).is_ok());
    }

    #[test]
    fn test_valid_object_passes() {
        let value = json!({"title": "Roof repair", "hours": 4.5, "tags": ["urgent"]});
        assert!(validate(&value, &job_schema()).is_ok());
    }

    #[test]
    fn test_missing_required_field_reports_path() {
        let err = validate(&json!({"hours": 1}), &job_schema()).expect_err("missing title");
        assert_eq!(err.path, "$");
        assert!(err.message.contains("'title'"));
    }

    #[test]
    fn test_nested_type_mismatch_reports_nested_path() {
        let err = validate(&json!({"title": "x", "tags": ["ok", 3]}), &job_schema())
            .expect_err("bad tag");
        assert_eq!(err.path, "$.tags[1]");
    }

    #[test]
    fn test_unknown_field_rejected_when_additional_properties_false() {
        let err = validate(&json!({"title": "x", "colour": "red"}), &job_schema())
            .expect_err("unknown field");
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_numeric_bounds_and_min_length() {
        assert!(validate(&json!({"title": "x", "hours": -1}), &job_schema()).is_err());
        assert!(validate(&json!({"title": ""}), &job_schema()).is_err());
    }

    #[test]
    fn test_type_union() {
        let schema = json!({"type": ["string", "null"]});
        assert!(validate(&json!(null), &schema).is_ok());
        assert!(validate(&json!("a"), &schema).is_ok());
        assert!(validate(&json!(1), &schema).is_err());
    }
}
