//! Type-aware equality for tool-call arguments.

use serde_json::{Map, Value};

/// Default numeric tolerance for argument comparison.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Compare two argument values.
///
/// Numbers compare within `tolerance` regardless of integer/float
/// representation; strings are case-sensitive; arrays and objects recurse.
pub fn values_equal(expected: &Value, actual: &Value, tolerance: f64) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() <= tolerance,
            _ => false,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(x, y)| values_equal(x, y, tolerance))
        }
        (Value::Object(a), Value::Object(b)) => first_mismatch(a, b, tolerance).is_none(),
        _ => expected == actual,
    }
}

/// First key, in sorted order, whose value differs between two mappings.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyMismatch {
    Missing { key: String },
    Unexpected { key: String },
    Differs {
        key: String,
        expected: Value,
        actual: Value,
    },
}

impl KeyMismatch {
    pub fn key(&self) -> &str {
        match self {
            KeyMismatch::Missing { key }
            | KeyMismatch::Unexpected { key }
            | KeyMismatch::Differs { key, .. } => key,
        }
    }
}

impl std::fmt::Display for KeyMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMismatch::Missing { key } => write!(f, "missing `{key}`"),
            KeyMismatch::Unexpected { key } => write!(f, "unexpected `{key}`"),
            KeyMismatch::Differs {
                key,
                expected,
                actual,
            } => write!(f, "`{key}` expected {expected}, got {actual}"),
        }
    }
}

pub fn first_mismatch(
    expected: &Map<String, Value>,
    actual: &Map<String, Value>,
    tolerance: f64,
) -> Option<KeyMismatch> {
    let mut keys: Vec<&String> = expected.keys().chain(actual.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter().find_map(|key| match (expected.get(key), actual.get(key)) {
        (Some(_), None) => Some(KeyMismatch::Missing { key: key.clone() }),
        (None, Some(_)) => Some(KeyMismatch::Unexpected { key: key.clone() }),
        (Some(e), Some(a)) if !values_equal(e, a, tolerance) => Some(KeyMismatch::Differs {
            key: key.clone(),
            expected: e.clone(),
            actual: a.clone(),
        }),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn numbers_use_tolerance_across_representations() {
        assert!(values_equal(&json!(50), &json!(50.0), DEFAULT_TOLERANCE));
        assert!(values_equal(&json!(0.1), &json!(0.1000000001), DEFAULT_TOLERANCE));
        assert!(!values_equal(&json!(0.1), &json!(0.1001), DEFAULT_TOLERANCE));
    }

    #[test]
    fn strings_are_case_sensitive() {
        assert!(!values_equal(&json!("AAPL"), &json!("aapl"), DEFAULT_TOLERANCE));
        assert!(!values_equal(&json!("1"), &json!(1), DEFAULT_TOLERANCE));
    }

    #[test]
    fn nested_structures_recurse() {
        let a = json!({"symbols": ["AAPL", "MSFT"], "window": {"days": 50}});
        let b = json!({"window": {"days": 50.0}, "symbols": ["AAPL", "MSFT"]});
        assert!(values_equal(&a, &b, DEFAULT_TOLERANCE));

        let c = json!({"symbols": ["MSFT", "AAPL"], "window": {"days": 50}});
        assert!(!values_equal(&a, &c, DEFAULT_TOLERANCE));
    }

    #[test]
    fn first_mismatch_reports_sorted_first_key() {
        let expected = obj(json!({"symbol": "AAPL", "days": 50, "adjusted": true}));
        let actual = obj(json!({"symbol": "MSFT", "days": 20, "adjusted": true}));
        let m = first_mismatch(&expected, &actual, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(m.key(), "days");
        assert!(m.to_string().contains("expected 50"));

        let missing = first_mismatch(&expected, &obj(json!({})), DEFAULT_TOLERANCE).unwrap();
        assert!(matches!(missing, KeyMismatch::Missing { .. }));

        let extra = obj(json!({"symbol": "AAPL", "days": 50, "adjusted": true, "z": 1}));
        let unexpected = first_mismatch(&expected, &extra, DEFAULT_TOLERANCE).unwrap();
        assert_eq!(
            unexpected,
            KeyMismatch::Unexpected {
                key: "z".to_string()
            }
        );
    }
}
