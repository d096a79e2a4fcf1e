//! Ordering and numeric helpers over raw JSON prop values.

use serde_json::Value;
use std::cmp::Ordering;

/// Rank of a JSON kind when comparing values of different kinds.
fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Bool(_) => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) => 3,
        Value::Object(_) => 4,
        Value::Null => 5,
    }
}

/// Total order over raw stored values.
///
/// Numbers compare numerically, strings by bytes, booleans `false < true`.
/// Mixed kinds order by kind; `null` (absent) sorts last.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Render an `f64` as a JSON number, keeping whole values integral.
///
/// Non-finite results become `null`.
#[must_use]
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

/// Loose equality: numbers compare by value (`1 == 1.0`), everything else structurally.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_compare_numerically() {
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
    }

    #[test]
    fn null_sorts_last() {
        assert_eq!(compare_values(&Value::Null, &json!("a")), Ordering::Greater);
        assert_eq!(compare_values(&json!(true), &Value::Null), Ordering::Less);
    }

    #[test]
    fn whole_numbers_stay_integral() {
        assert_eq!(number_value(6.0), json!(6));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::INFINITY), Value::Null);
    }

    #[test]
    fn loose_equality_spans_number_forms() {
        assert!(values_equal(&json!(1), &json!(1.0)));
        assert!(!values_equal(&json!("1"), &json!(1)));
    }
}
