//! Turning a tool call's raw argument payload into a parameter object.
//!
//! Models sometimes send a JSON object, sometimes a JSON-encoded string,
//! and sometimes loose text like `action=list; max_results=5`. Parsing is
//! two-stage: strict JSON first, then a permissive key/value and phrase
//! decoder. Only when both fail is an [`ArgsParseError`] produced, and its
//! message is meant to be shown to the model as the tool's observation.

use serde_json::{Map, Value};
use thiserror::Error;

/// Both parse stages failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgsParseError {
    /// Nothing was supplied at all.
    #[error("Invalid JSON input for {tool}: expected a JSON string or keyword arguments.")]
    Missing { tool: String },

    #[error(
        "Invalid JSON input for {tool}: {reason}. Provide JSON like {{\"action\": \"list_events\", \"max_results\": 5}}."
    )]
    Unparseable { tool: String, reason: String },
}

/// Parse a structured or string-encoded argument value.
///
/// Objects pass through untouched; strings go through [`parse_tool_input`];
/// `null` is reported as missing.
pub fn parse_tool_value(tool: &str, value: Value) -> Result<Map<String, Value>, ArgsParseError> {
    match value {
        Value::Object(map) => Ok(map),
        Value::String(raw) => parse_tool_input(tool, &raw),
        Value::Null => Err(ArgsParseError::Missing {
            tool: tool.to_string(),
        }),
        other => Err(ArgsParseError::Unparseable {
            tool: tool.to_string(),
            reason: format!("expected a JSON object, got {other}"),
        }),
    }
}

/// Parse a raw argument string.
///
/// A blank payload means "no arguments". A JSON object is used as-is and
/// a JSON string is unwrapped once and parsed again.
pub fn parse_tool_input(tool: &str, raw: &str) -> Result<Map<String, Value>, ArgsParseError> {
    parse_with_depth(tool, raw, 0)
}

fn parse_with_depth(tool: &str, raw: &str, depth: u8) -> Result<Map<String, Value>, ArgsParseError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }

    let reason = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(Value::String(inner)) if depth == 0 => return parse_with_depth(tool, &inner, 1),
        Ok(other) => format!("expected a JSON object, got {other}"),
        Err(e) => e.to_string(),
    };

    parse_freeform(raw).ok_or_else(|| ArgsParseError::Unparseable {
        tool: tool.to_string(),
        reason,
    })
}

/// Permissive decoder for loose text.
///
/// First collects `key=value` or `key:value` pairs separated by `;`,
/// newlines or commas outside brackets and quotes. A value that reads as a
/// JSON literal other than `null` is decoded; anything else stays the raw
/// string. Failing that, a handful of calendar phrases map to
/// canonical actions. Returns `None` when nothing was recognised.
pub fn parse_freeform(raw: &str) -> Option<Map<String, Value>> {
    let mut pairs = Map::new();
    for part in split_pairs(raw) {
        if part.trim().is_empty() {
            continue;
        }
        let Some((key, value)) = part.split_once('=').or_else(|| part.split_once(':')) else {
            continue;
        };
        pairs.insert(key.trim().to_string(), literal(value.trim()));
    }
    if !pairs.is_empty() {
        return Some(pairs);
    }

    let simple = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    if simple.is_empty() {
        return Some(Map::new());
    }

    let action = match simple.as_str() {
        "list events" | "list_events" | "list upcoming events" | "show events" => "list_events",
        s if s.starts_with("create event") => "create_event",
        s if s.starts_with("get event") || s.starts_with("find event") => "get_event",
        _ => return None,
    };

    let mut map = Map::new();
    map.insert("action".into(), Value::String(action.into()));
    Some(map)
}

fn split_pairs(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        if quoted {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => quoted = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => quoted = true,
            '[' | '{' => depth += 1,
            ']' | '}' => depth = depth.saturating_sub(1),
            ';' | '\n' | ',' if depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

fn literal(value: &str) -> Value {
    match serde_json::from_str::<Value>(value) {
        Ok(v @ (Value::Number(_) | Value::Bool(_) | Value::String(_) | Value::Array(_) | Value::Object(_))) => v,
        _ => Value::String(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_object_wins() {
        let map = parse_tool_input("gmail", r#"{"action": "send", "max_results": 5}"#).unwrap();
        assert_eq!(map["action"], "send");
        assert_eq!(map["max_results"], 5);
    }

    #[test]
    fn blank_payload_is_empty_object() {
        assert!(parse_tool_input("csv", "   ").unwrap().is_empty());
    }

    #[test]
    fn double_encoded_json_is_unwrapped() {
        let raw = serde_json::to_string(r#"{"action": "read"}"#).unwrap();
        let map = parse_tool_input("gmail", &raw).unwrap();
        assert_eq!(map["action"], "read");
    }

    #[test]
    fn key_value_pairs_are_accepted() {
        let map = parse_tool_input("google_calendar", "action=list_events; max_results: 5\ncalendar_id = work").unwrap();
        assert_eq!(map["action"], "list_events");
        assert_eq!(map["max_results"], 5);
        assert_eq!(map["calendar_id"], "work");
    }

    #[test]
    fn freeform_values_keep_json_literal_types() {
        let map = parse_freeform(r#"cc=["a@x.io", "b@x.io"]; is_html=true; to="c@x.io, d@x.io"; note=5 apples"#)
            .unwrap();
        assert_eq!(map["cc"], json!(["a@x.io", "b@x.io"]));
        assert_eq!(map["is_html"], true);
        assert_eq!(map["to"], "c@x.io, d@x.io");
        assert_eq!(map["note"], "5 apples");
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn equals_takes_precedence_over_colon() {
        let map = parse_freeform("time_min=2024-01-01T10:00:00Z").unwrap();
        assert_eq!(map["time_min"], "2024-01-01T10:00:00Z");
    }

    #[test]
    fn phrases_map_to_calendar_actions() {
        let cases = [
            ("List   Upcoming Events", "list_events"),
            ("show events", "list_events"),
            ("create event tomorrow at noon", "create_event"),
            ("find event standup", "get_event"),
        ];
        for (raw, action) in cases {
            let map = parse_tool_input("google_calendar", raw).unwrap();
            assert_eq!(map["action"], action, "input: {raw}");
        }
    }

    #[test]
    fn unrecognised_text_is_a_parse_error() {
        let err = parse_tool_input("gmail", "please do something nice").unwrap_err();
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid JSON input for gmail: "));
        assert!(msg.contains(r#"Provide JSON like {"action": "list_events", "max_results": 5}."#));
    }

    #[test]
    fn non_object_json_is_a_parse_error() {
        let err = parse_tool_input("csv", "42").unwrap_err();
        assert!(err.to_string().contains("expected a JSON object"));
    }

    #[test]
    fn structured_values() {
        assert_eq!(
            parse_tool_value("json", json!({"a": 1})).unwrap()["a"],
            1
        );
        assert_eq!(
            parse_tool_value("json", Value::Null).unwrap_err().to_string(),
            "Invalid JSON input for json: expected a JSON string or keyword arguments."
        );
        assert_eq!(
            parse_tool_value("json", json!("action=read")).unwrap()["action"],
            "read"
        );
    }
}
