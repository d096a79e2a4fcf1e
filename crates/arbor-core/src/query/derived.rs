//! Derived-value expressions.
//!
//! `add` is numeric when its first operand resolves to a number and string
//! concatenation otherwise. The other operators are numeric only; a
//! non-numeric operand yields `null`.

use super::engine::Row;
use super::filter::resolve_prop;
use super::types::Expr;
use crate::passport::Passport;
use crate::types::{GraphError, number_value};
use serde_json::Value;

/// Evaluate an expression against one row.
pub(super) fn evaluate(
    passport: &Passport<'_>,
    row: &Row,
    expr: &Expr,
) -> Result<Value, GraphError> {
    let operands = match expr {
        Expr::Value(value) => return Ok(value.clone()),
        Expr::Prop(prop) => {
            return Ok(resolve_prop(passport, row, prop)?
                .values
                .into_iter()
                .next()
                .unwrap_or(Value::Null));
        }
        Expr::Add(items) | Expr::Subtract(items) | Expr::Multiply(items) | Expr::Divide(items) => {
            items
                .iter()
                .map(|item| evaluate(passport, row, item))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    if let Expr::Add(_) = expr
        && !operands.first().is_some_and(Value::is_number)
    {
        return Ok(Value::String(operands.iter().map(render).collect()));
    }

    let Some(numbers) = operands
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<f64>>>()
    else {
        return Ok(Value::Null);
    };
    let Some((first, rest)) = numbers.split_first() else {
        return Ok(Value::Null);
    };
    let result = rest.iter().fold(*first, |acc, n| match expr {
        Expr::Add(_) => acc + n,
        Expr::Subtract(_) => acc - n,
        Expr::Multiply(_) => acc * n,
        _ => acc / n,
    });
    Ok(number_value(result))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::storage::MemoryStore;
    use crate::types::{NodeRecord, Record};
    use serde_json::{Map, json};

    fn row(props: Value) -> Row {
        let original: Map<String, Value> = serde_json::from_value(props).expect("props");
        let mut node = NodeRecord::new("1", "User");
        node.props = original.clone();
        Row {
            record: Record::Node(node),
            now: original.clone(),
            original,
        }
    }

    fn eval(expr: Value, props: Value) -> Value {
        let mut store = MemoryStore::new();
        let passport = Passport::build(Cache::new(&mut store), None, None, None).expect("build");
        let expr: Expr = serde_json::from_value(expr).expect("expr");
        evaluate(&passport, &row(props), &expr).expect("evaluate")
    }

    #[test]
    fn arithmetic_nests() {
        let expr = json!({ "multiply": [
            { "add": [ { "prop": { "prop": "a" } }, { "value": 2 } ] },
            { "value": 3 }
        ]});
        assert_eq!(eval(expr, json!({ "a": 4 })), json!(18));
    }

    #[test]
    fn add_concatenates_text() {
        let expr = json!({ "add": [
            { "prop": { "prop": "first" } }, { "value": " " }, { "prop": { "prop": "last" } }
        ]});
        assert_eq!(
            eval(expr, json!({ "first": "Ada", "last": "Lovelace" })),
            json!("Ada Lovelace")
        );
    }

    #[test]
    fn non_numeric_operands_yield_null() {
        let expr = json!({ "subtract": [ { "value": 5 }, { "value": "x" } ] });
        assert_eq!(eval(expr, json!({})), Value::Null);
        let expr = json!({ "divide": [ { "value": 1 }, { "value": 0 } ] });
        assert_eq!(eval(expr, json!({})), Value::Null);
    }
}
