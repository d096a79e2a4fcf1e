//! Predicate evaluation.
//!
//! Operands resolve to value sets: a prop reached through a to-many
//! relationship yields every value found. A comparison holds when any pair
//! of left/right values satisfies it.

use super::engine::{Row, neighbours, relationship_prop};
use super::types::{Comparison, Filter, Operand, PropRef, QueryOptions, Symbol};
use crate::passport::Passport;
use crate::primitives::NODE_UID_PROP;
use crate::schema::{DataType, parse_iso};
use crate::types::{GraphError, NodeRecord, Record, values_equal};
use serde_json::Value;
use std::cmp::Ordering;

/// Values an operand resolved to.
#[derive(Debug, Default)]
pub(super) struct Resolved {
    pub values: Vec<Value>,
    /// The operand is a `hash` prop: equality means signature verification.
    pub hash: bool,
}

/// Apply `filterBy`, then `findBy` (first match only).
pub(super) fn apply(
    passport: &Passport<'_>,
    rows: Vec<Row>,
    options: &QueryOptions,
) -> Result<Vec<Row>, GraphError> {
    let public_key = options.public_key.as_deref();
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        let passes = match &options.filter_by {
            Some(filter) => matches(passport, &row, filter, public_key)?,
            None => true,
        };
        if passes {
            kept.push(row);
        }
    }

    let Some(find) = &options.find_by else {
        return Ok(kept);
    };
    for row in kept {
        if matches(passport, &row, find, public_key)? {
            return Ok(vec![row]);
        }
    }
    Ok(Vec::new())
}

/// Evaluate a predicate tree against one row.
pub(super) fn matches(
    passport: &Passport<'_>,
    row: &Row,
    filter: &Filter,
    public_key: Option<&str>,
) -> Result<bool, GraphError> {
    match filter {
        Filter::And(parts) => {
            for part in parts {
                if !matches(passport, row, part, public_key)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Filter::Or(parts) => {
            for part in parts {
                if matches(passport, row, part, public_key)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Filter::Defined(prop) => Ok(!resolve_prop(passport, row, prop)?.values.is_empty()),
        Filter::Undefined(prop) => Ok(resolve_prop(passport, row, prop)?.values.is_empty()),
        Filter::Is(comparison) => compare(passport, row, comparison, public_key),
    }
}

fn compare(
    passport: &Passport<'_>,
    row: &Row,
    comparison: &Comparison,
    public_key: Option<&str>,
) -> Result<bool, GraphError> {
    let left = resolve(passport, row, &comparison.left)?;
    let right = resolve(passport, row, &comparison.right)?;

    if matches!(comparison.symbol, Symbol::Equals | Symbol::NotEquals) && (left.hash || right.hash)
    {
        let (hashed, plain) = if left.hash {
            (&left, &right)
        } else {
            (&right, &left)
        };
        let verified = verify_any(passport, hashed, plain, public_key);
        return Ok(match comparison.symbol {
            Symbol::Equals => verified,
            _ => !verified && can_verify(passport, public_key),
        });
    }

    Ok(left
        .values
        .iter()
        .any(|l| right.values.iter().any(|r| holds(comparison.symbol, l, r))))
}

fn can_verify(passport: &Passport<'_>, public_key: Option<&str>) -> bool {
    passport.signer.is_some() && public_key.is_some()
}

/// Signature check for `hash` equality. Fails closed.
fn verify_any(
    passport: &Passport<'_>,
    hashed: &Resolved,
    plain: &Resolved,
    public_key: Option<&str>,
) -> bool {
    let (Some(signer), Some(public_key)) = (passport.signer.as_ref(), public_key) else {
        tracing::warn!("hash comparison without a signer and public key; excluding row");
        return false;
    };
    hashed.values.iter().filter_map(Value::as_str).any(|signature| {
        plain
            .values
            .iter()
            .filter_map(Value::as_str)
            .any(|plaintext| signer.verify(public_key, plaintext, signature))
    })
}

/// Whether `symbol` holds between two single values.
fn holds(symbol: Symbol, left: &Value, right: &Value) -> bool {
    match symbol {
        Symbol::Equals => values_equal(left, right),
        Symbol::NotEquals => !values_equal(left, right),
        Symbol::GreaterThan => ordered(left, right) == Some(Ordering::Greater),
        Symbol::LessThan => ordered(left, right) == Some(Ordering::Less),
        Symbol::GreaterThanOrEqual => {
            matches!(ordered(left, right), Some(Ordering::Greater | Ordering::Equal))
        }
        Symbol::LessThanOrEqual => {
            matches!(ordered(left, right), Some(Ordering::Less | Ordering::Equal))
        }
        Symbol::StartsWith => texts(left, right).is_some_and(|(l, r)| l.starts_with(r)),
        Symbol::EndsWith => texts(left, right).is_some_and(|(l, r)| l.ends_with(r)),
        Symbol::Contains => contains(left, right),
        Symbol::DoesNotContain => !contains(left, right),
        Symbol::IsoIsBefore => instants(left, right).is_some_and(|(l, r)| l < r),
        Symbol::IsoIsAfter => instants(left, right).is_some_and(|(l, r)| l > r),
    }
}

/// Ordering between two numbers or two strings; nothing across kinds.
fn ordered(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

fn texts<'v>(left: &'v Value, right: &'v Value) -> Option<(&'v str, &'v str)> {
    Some((left.as_str()?, right.as_str()?))
}

fn contains(left: &Value, right: &Value) -> bool {
    match left {
        Value::String(text) => right.as_str().is_some_and(|needle| text.contains(needle)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, right)),
        _ => false,
    }
}

fn instants(
    left: &Value,
    right: &Value,
) -> Option<(time::OffsetDateTime, time::OffsetDateTime)> {
    Some((parse_iso(left.as_str()?)?, parse_iso(right.as_str()?)?))
}

// =============================================================================
// OPERANDS
// =============================================================================

fn resolve(passport: &Passport<'_>, row: &Row, operand: &Operand) -> Result<Resolved, GraphError> {
    Ok(match operand {
        Operand::Value(value) => Resolved {
            values: vec![value.clone()],
            hash: false,
        },
        Operand::Response(pointer) => Resolved {
            values: passport.response_value(pointer).cloned().into_iter().collect(),
            hash: false,
        },
        Operand::Prop(prop) => resolve_prop(passport, row, prop)?,
    })
}

/// Resolve a prop of the row, or of the nodes reached by walking
/// `relationships` from it.
pub(super) fn resolve_prop(
    passport: &Passport<'_>,
    row: &Row,
    prop: &PropRef,
) -> Result<Resolved, GraphError> {
    if prop.relationships.is_empty() {
        let hash = passport
            .schema()
            .value_prop(row.record.type_name(), &prop.prop)
            .is_some_and(|def| def.data_type == DataType::Hash);
        return Ok(Resolved {
            values: row
                .original
                .get(&prop.prop)
                .filter(|v| !v.is_null())
                .cloned()
                .into_iter()
                .collect(),
            hash,
        });
    }

    let Record::Node(start) = &row.record else {
        return Ok(Resolved::default());
    };
    let mut frontier: Vec<NodeRecord> = vec![start.clone()];
    for step in &prop.relationships {
        let mut next = Vec::new();
        for node in &frontier {
            let def = relationship_prop(passport, &node.node, step)?;
            next.extend(neighbours(passport, node, def)?.into_iter().map(|(_, n)| n));
        }
        frontier = next;
    }

    let hash = frontier.first().is_some_and(|node| {
        passport
            .schema()
            .value_prop(&node.node, &prop.prop)
            .is_some_and(|def| def.data_type == DataType::Hash)
    });
    let values = frontier
        .iter()
        .filter_map(|node| {
            if prop.prop == NODE_UID_PROP {
                Some(Value::from(node.uid.as_str()))
            } else {
                node.props.get(&prop.prop).cloned()
            }
        })
        .collect();
    Ok(Resolved { values, hash })
}
