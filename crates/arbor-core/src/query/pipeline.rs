//! Post-processing pipeline.
//!
//! Steps run in [`FlowStep::DEFAULT`] order unless `flow` lists them
//! explicitly. A response-collapsing aggregate ends the pipeline.

use super::derived;
use super::engine::Row;
use super::filter::resolve_prop;
use super::types::{ComputeAs, FlowStep, QueryOptions, SortHow};
use crate::passport::Passport;
use crate::types::{GraphError, compare_values, number_value};
use serde_json::Value;

/// Result of the pipeline.
#[derive(Debug)]
pub(super) enum Shaped {
    Rows(Vec<Row>),
    /// A single scalar or row replaced the result.
    Collapsed { now: Value, original: Value },
}

/// Run every step over the filtered rows.
///
/// `presorted` skips the sort step when candidates came from a sort index.
pub(super) fn run(
    passport: &Passport<'_>,
    mut rows: Vec<Row>,
    options: &QueryOptions,
    presorted: bool,
) -> Result<Shaped, GraphError> {
    let steps = options.flow.as_deref().unwrap_or(FlowStep::DEFAULT.as_slice());
    for step in steps {
        match step {
            FlowStep::Sort => {
                if let Some(sort) = &options.sort
                    && !presorted
                {
                    rows.sort_by(|x, y| {
                        compare_values(
                            x.original.get(&sort.prop).unwrap_or(&Value::Null),
                            y.original.get(&sort.prop).unwrap_or(&Value::Null),
                        )
                    });
                    if sort.how == SortHow::Dsc {
                        rows.reverse();
                    }
                }
            }
            FlowStep::Limit => {
                if let Some(limit) = options.limit {
                    rows = rows
                        .into_iter()
                        .skip(limit.skip.unwrap_or(0))
                        .take(limit.count.unwrap_or(usize::MAX))
                        .collect();
                }
            }
            FlowStep::Derived => {
                for row in &mut rows {
                    for (name, expr) in &options.derived {
                        let value = derived::evaluate(passport, row, expr)?;
                        set(row, name, value);
                    }
                }
            }
            FlowStep::AggregateAsProp => aggregate_as_prop(&mut rows, options),
            FlowStep::AggregateAsResponse => {
                if let Some(collapsed) = aggregate_as_response(&rows, options) {
                    return Ok(collapsed);
                }
            }
            FlowStep::Copy => {
                for row in &mut rows {
                    for (key, source) in &options.copy {
                        let value = resolve_prop(passport, row, source)?
                            .values
                            .into_iter()
                            .next()
                            .unwrap_or(Value::Null);
                        set(row, key, value);
                    }
                }
            }
        }
    }
    Ok(Shaped::Rows(rows))
}

fn set(row: &mut Row, key: &str, value: Value) {
    row.original.insert(key.to_string(), value.clone());
    row.now.insert(key.to_string(), value);
}

// =============================================================================
// AGGREGATES
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Stat {
    Sum,
    Avg,
    Min,
    Max,
}

/// Numeric values of `prop` across rows, from the original view.
fn numbers<'r>(rows: &'r [Row], prop: &'r str) -> impl Iterator<Item = f64> + 'r {
    rows.iter()
        .filter_map(move |row| row.original.get(prop).and_then(Value::as_f64))
}

fn stat(rows: &[Row], prop: &str, stat: Stat) -> Value {
    let values: Vec<f64> = numbers(rows, prop).collect();
    if values.is_empty() {
        return match stat {
            Stat::Sum => Value::from(0),
            _ => Value::Null,
        };
    }
    let result = match stat {
        Stat::Sum => values.iter().sum::<f64>(),
        Stat::Avg => values.iter().sum::<f64>() / values.len() as f64,
        Stat::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        Stat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    };
    number_value(result)
}

fn aggregate_as_prop(rows: &mut [Row], options: &QueryOptions) {
    let mut annotations = Vec::new();
    if let Some(name) = &options.count_as_prop {
        annotations.push((name.clone(), Value::from(rows.len())));
    }
    let computed: [(&Option<ComputeAs>, Stat); 4] = [
        (&options.sum_as_prop, Stat::Sum),
        (&options.avg_as_prop, Stat::Avg),
        (&options.min_amount_as_prop, Stat::Min),
        (&options.max_amount_as_prop, Stat::Max),
    ];
    for (compute, kind) in computed {
        if let Some(compute) = compute {
            annotations.push((
                compute.new_prop.clone(),
                stat(rows, &compute.compute_prop, kind),
            ));
        }
    }
    for row in rows.iter_mut() {
        for (name, value) in &annotations {
            set(row, name, value.clone());
        }
    }
}

fn aggregate_as_response(rows: &[Row], options: &QueryOptions) -> Option<Shaped> {
    let scalar = |value: Value| Shaped::Collapsed {
        now: value.clone(),
        original: value,
    };
    if options.count_as_response {
        return Some(scalar(Value::from(rows.len())));
    }
    for (prop, kind) in [
        (&options.sum_as_response, Stat::Sum),
        (&options.avg_as_response, Stat::Avg),
        (&options.min_amount_as_response, Stat::Min),
        (&options.max_amount_as_response, Stat::Max),
    ] {
        if let Some(prop) = prop {
            return Some(scalar(stat(rows, prop, kind)));
        }
    }
    for (prop, wanted) in [
        (&options.min_node_as_response, std::cmp::Ordering::Less),
        (&options.max_node_as_response, std::cmp::Ordering::Greater),
    ] {
        let Some(prop) = prop else {
            continue;
        };
        let best = rows
            .iter()
            .filter(|row| row.original.get(prop).is_some_and(|v| !v.is_null()))
            .reduce(|best, row| {
                let order = compare_values(
                    row.original.get(prop).unwrap_or(&Value::Null),
                    best.original.get(prop).unwrap_or(&Value::Null),
                );
                if order == wanted { row } else { best }
            });
        return Some(match best {
            Some(row) => Shaped::Collapsed {
                now: Value::Object(row.now.clone()),
                original: Value::Object(row.original.clone()),
            },
            None => scalar(Value::Null),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeRecord, Record};
    use serde_json::{Map, json};

    fn rows(ages: &[i64]) -> Vec<Row> {
        ages.iter()
            .enumerate()
            .map(|(i, age)| {
                let mut original = Map::new();
                original.insert("uid".into(), json!(i.to_string()));
                original.insert("age".into(), json!(age));
                Row {
                    record: Record::Node(NodeRecord::new(i.to_string(), "User")),
                    now: original.clone(),
                    original,
                }
            })
            .collect()
    }

    #[test]
    fn stats_read_the_original_view() {
        let mut rows = rows(&[3, 1, 2]);
        for row in &mut rows {
            row.now.remove("age");
        }
        assert_eq!(stat(&rows, "age", Stat::Sum), json!(6));
        assert_eq!(stat(&rows, "age", Stat::Avg), json!(2));
        assert_eq!(stat(&rows, "age", Stat::Min), json!(1));
        assert_eq!(stat(&rows, "age", Stat::Max), json!(3));
        assert_eq!(stat(&[], "age", Stat::Sum), json!(0));
        assert_eq!(stat(&[], "age", Stat::Avg), Value::Null);
    }

    #[test]
    fn max_node_collapses_to_that_row() {
        let options = QueryOptions {
            max_node_as_response: Some("age".into()),
            ..QueryOptions::default()
        };
        let collapsed = aggregate_as_response(&rows(&[3, 7, 2]), &options);
        assert!(matches!(
            &collapsed,
            Some(Shaped::Collapsed { original, .. }) if original["uid"] == json!("1")
        ));
    }

    #[test]
    fn count_as_prop_annotates_every_row() {
        let mut rows = rows(&[1, 2]);
        let options = QueryOptions {
            count_as_prop: Some("total".into()),
            ..QueryOptions::default()
        };
        aggregate_as_prop(&mut rows, &options);
        assert!(rows.iter().all(|row| row.now["total"] == json!(2)));
    }
}
