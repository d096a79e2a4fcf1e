//! Batched sort-index rebuilds.
//!
//! A sort index is the exact id set of its type ordered ascending by the raw
//! stored value of one prop. Writes only mark `(type, prop)` pairs as
//! pending; the rebuild happens once per pair, at end of request or right
//! before a query reads the index.

use crate::cache::Cache;
use crate::passport::Passport;
use crate::primitives::{sort_index_key, type_index_key};
use crate::types::{GraphError, compare_values};
use serde_json::Value;

/// Rebuild one sort index from the current type index.
///
/// The sort is stable: ties keep type-index order.
pub fn rebuild(
    cache: &mut Cache<'_>,
    type_name: &str,
    prop: &str,
) -> Result<Vec<String>, GraphError> {
    let members = cache.ids(&type_index_key(type_name))?;
    let records = cache.records(&members)?;

    let mut keyed: Vec<(&String, Value)> = members
        .iter()
        .filter_map(|uid| {
            let record = records.get(uid)?;
            Some((uid, record.props().get(prop).cloned().unwrap_or(Value::Null)))
        })
        .collect();
    keyed.sort_by(|(_, x), (_, y)| compare_values(x, y));

    let ordered: Vec<String> = keyed.into_iter().map(|(uid, _)| uid.clone()).collect();
    cache.put_ids(&sort_index_key(type_name, prop), &ordered)?;
    Ok(ordered)
}

/// Rebuild every pending sort index.
pub fn flush(passport: &mut Passport<'_>) -> Result<(), GraphError> {
    let pending = std::mem::take(&mut passport.sort_pending);
    for (type_name, prop) in &pending {
        let ordered = rebuild(&mut passport.cache, type_name, prop)?;
        tracing::debug!(
            type_name = %type_name,
            prop = %prop,
            members = ordered.len(),
            "sort index rebuilt"
        );
    }
    Ok(())
}

/// Rebuild one sort index now if it is pending.
pub fn flush_one(
    passport: &mut Passport<'_>,
    type_name: &str,
    prop: &str,
) -> Result<(), GraphError> {
    if passport
        .sort_pending
        .remove(&(type_name.to_string(), prop.to_string()))
    {
        rebuild(&mut passport.cache, type_name, prop)?;
    }
    Ok(())
}
