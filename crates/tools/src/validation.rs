//! Parameter validation against a tool's declared schema.
//!
//! Only the subset the catalog declares is enforced: `required` field
//! presence and the primitive `type` tag of each known property. A property
//! may list several tags (`["integer", "string"]`) when its tool accepts
//! either form. Values are never coerced.

use agentexec_core::error::ToolError;
use serde_json::Value;

/// Check `params` against `schema`.
///
/// Required fields are checked first, in declaration order, then every
/// supplied field that the schema knows about. Unknown fields and unknown
/// type tags pass.
pub fn validate_parameters(schema: &Value, params: &Value) -> Result<(), ToolError> {
    let empty = serde_json::Map::new();
    let params = match params {
        Value::Object(map) => map,
        Value::Null => &empty,
        other => {
            return Err(ToolError::Validation(format!(
                "Parameters must be a JSON object, got {}",
                type_name(other)
            )));
        }
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !params.contains_key(field) {
                return Err(ToolError::Validation(format!(
                    "Missing required parameter: {field}"
                )));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };

    for (field, value) in params {
        let Some(declared) = properties.get(field).and_then(|p| p.get("type")) else {
            continue;
        };
        let accepted: Vec<&str> = match declared {
            Value::String(tag) => vec![tag.as_str()],
            Value::Array(tags) => tags.iter().filter_map(Value::as_str).collect(),
            _ => continue,
        };
        if accepted.is_empty() || accepted.iter().any(|tag| matches_type(tag, value)) {
            continue;
        }
        return Err(ToolError::Validation(format!(
            "Parameter {field} must be of type {}",
            accepted.join(" or ")
        )));
    }

    Ok(())
}

/// Whether `value` satisfies a JSON-schema primitive type tag.
pub fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
