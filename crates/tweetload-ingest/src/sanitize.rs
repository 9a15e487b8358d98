//! Text sanitation for row files
//!
//! PostgreSQL text columns cannot hold NUL, and the bulk transfer rejects the
//! whole file when one shows up. Everything that ends up in a textual column
//! passes through here first.

use serde_json::{Map, Value};

/// Characters stripped from every string value.
pub const DISALLOWED: &[char] = &['\u{0}'];

/// Remove disallowed characters from a string.
pub fn sanitize_str(s: &str) -> String {
    if s.contains(DISALLOWED) {
        s.chars().filter(|c| !DISALLOWED.contains(c)).collect()
    } else {
        s.to_string()
    }
}

/// Render any JSON value as safe text.
///
/// Absent and `null` values become the empty string. Strings are stripped.
/// Numbers and booleans use their JSON spelling. Arrays and objects are
/// stripped recursively (keys included) and then serialised as compact JSON.
pub fn sanitize_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => sanitize_str(s),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => {
            // Serialising a tree of plain values cannot fail
            serde_json::to_string(&strip_nested(nested)).unwrap_or_default()
        }
    }
}

fn strip_nested(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(strip_nested).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (sanitize_str(k), strip_nested(v)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_strips_nul() {
        assert_eq!(sanitize_str("a\u{0}b\u{0}"), "ab");
        assert_eq!(sanitize_str("plain"), "plain");
    }

    #[test]
    fn test_absent_and_null_are_empty() {
        assert_eq!(sanitize_value(None), "");
        assert_eq!(sanitize_value(Some(&Value::Null)), "");
    }

    #[test]
    fn test_scalars() {
        assert_eq!(sanitize_value(Some(&json!(42))), "42");
        assert_eq!(sanitize_value(Some(&json!(true))), "true");
        assert_eq!(sanitize_value(Some(&json!("x\u{0}y"))), "xy");
    }

    #[test]
    fn test_nested_structures_are_stripped_before_serialising() {
        let value = json!({"k\u{0}": ["a\u{0}", {"n": 1}], "z": null});
        let text = sanitize_value(Some(&value));
        assert!(!text.contains('\u{0}'));
        assert!(!text.contains("\\u0000"));
        let back: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(back, json!({"k": ["a", {"n": 1}], "z": null}));
    }

    proptest! {
        #[test]
        fn prop_sanitize_removes_exactly_the_disallowed(s in "(\\PC|\\x00){0,64}") {
            let occurrences = s.chars().filter(|c| *c == '\u{0}').count();
            let out = sanitize_str(&s);
            prop_assert_eq!(out.chars().count(), s.chars().count() - occurrences);
            prop_assert!(!out.contains('\0'));
        }

        #[test]
        fn prop_sanitize_value_is_total(s in ".*", n in any::<i64>(), b in any::<bool>()) {
            let value = json!({"s": s, "n": n, "b": b, "list": [s, null]});
            let out = sanitize_value(Some(&value));
            prop_assert!(!out.contains('\0'));
        }
    }
}
