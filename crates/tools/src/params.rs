//! Loose readers over a parameter object.
//!
//! Models fill tool arguments inconsistently (numbers as strings, lists as
//! comma-joined text, booleans as "yes"), so the built-in tools read their
//! fields through these helpers instead of deserialising strictly.

use serde_json::{Map, Value};

pub type Params = Map<String, Value>;

/// Whether a value counts as "provided": not null, not empty, not false or zero.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// First truthy field among `keys`, rendered as a trimmed string.
pub fn text(params: &Params, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .filter(|v| is_truthy(Some(v)))
        .find_map(scalar_text)
}

/// Strings as-is, numbers and booleans rendered; containers are not text.
pub fn scalar_text(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

/// Copy `from` into `to` when `to` is not already provided.
pub fn alias(params: &mut Params, from: &str, to: &str) {
    if is_truthy(params.get(to)) {
        return;
    }
    if let Some(value) = params.get(from).filter(|v| is_truthy(Some(v))).cloned() {
        params.insert(to.to_string(), value);
    }
}

/// "true", "1", "yes", "y", "on" (any case) and `true` are true.
pub fn coerce_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "1" | "yes" | "y" | "on"
        ),
        other => is_truthy(other),
    }
}

/// A list of strings from either an array or a comma-separated string.
///
/// Blank entries are dropped; array entries are themselves comma-split.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect(),
        Some(Value::Array(items)) => items
            .iter()
            .flat_map(|item| match item {
                Value::String(_) => string_list(Some(item)),
                other => scalar_text(other).into_iter().collect(),
            })
            .collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
        None => Vec::new(),
    }
}

/// An integer field that may arrive as a number or a numeric string.
///
/// `Ok(None)` when absent or null; `Err(())` when present but not an integer.
pub fn integer(params: &Params, key: &str) -> Result<Option<i64>, ()> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(Some)
            .ok_or(()),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| ()),
        Some(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn truthiness_follows_emptiness() {
        assert!(!is_truthy(Some(&json!(""))));
        assert!(!is_truthy(Some(&json!([]))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(is_truthy(Some(&json!("x"))));
        assert!(is_truthy(Some(&json!({"a": 1}))));
    }

    #[test]
    fn text_picks_first_provided_key() {
        let p = params(json!({"body": "", "message": "hi", "content": "later"}));
        assert_eq!(text(&p, &["body", "message", "content"]).as_deref(), Some("hi"));
        assert_eq!(text(&p, &["missing"]), None);
    }

    #[test]
    fn alias_does_not_overwrite() {
        let mut p = params(json!({"maxResults": 3, "message_id": "m1", "messageId": "m2"}));
        alias(&mut p, "maxResults", "max_results");
        alias(&mut p, "messageId", "message_id");
        assert_eq!(p["max_results"], 3);
        assert_eq!(p["message_id"], "m1");
    }

    #[test]
    fn bool_coercion() {
        assert!(coerce_bool(Some(&json!("Yes"))));
        assert!(coerce_bool(Some(&json!(true))));
        assert!(!coerce_bool(Some(&json!("nope"))));
        assert!(!coerce_bool(None));
    }

    #[test]
    fn lists_from_strings_and_arrays() {
        assert_eq!(string_list(Some(&json!("a@x.io, b@x.io ,"))), vec!["a@x.io", "b@x.io"]);
        assert_eq!(string_list(Some(&json!(["INBOX", "", "a,b"]))), vec!["INBOX", "a", "b"]);
        assert!(string_list(None).is_empty());
    }

    #[test]
    fn integers_from_numbers_and_strings() {
        let p = params(json!({"a": 5, "b": " 7 ", "c": "seven", "d": 2.0, "e": null}));
        assert_eq!(integer(&p, "a"), Ok(Some(5)));
        assert_eq!(integer(&p, "b"), Ok(Some(7)));
        assert_eq!(integer(&p, "c"), Err(()));
        assert_eq!(integer(&p, "d"), Ok(Some(2)));
        assert_eq!(integer(&p, "e"), Ok(None));
        assert_eq!(integer(&p, "zzz"), Ok(None));
    }
}
