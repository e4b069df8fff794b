//! Query execution with eager loading
//!
//! `fetch` runs the compiled main statement, then every follow-up load with
//! `$parent_keys` bound to the key values collected from the rows it feeds.
//! Related nodes are attached under the relation name: to each result row for
//! top-level loads, and to the related node itself for nested ones. Inline
//! loads already arrive as columns of the main statement.
use std::collections::{HashMap, HashSet};

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::cypher_generator::compiler::compile;
use crate::cypher_generator::eager_load::{
    FollowUpQuery, PARENT_KEYS_PARAM, PARENT_KEY_COLUMN, RELATED_COLUMN,
};
use crate::cypher_generator::query_descriptor::QueryDescriptor;
use crate::driver::result_set::Row;
use crate::transaction::{AccessMode, MapperError, TransactionCoordinator};

pub async fn fetch(
    coordinator: &TransactionCoordinator,
    query: &QueryDescriptor,
) -> Result<Vec<Row>, MapperError> {
    let compiled = compile(query)?;
    let mut rows = coordinator
        .execute(&compiled.statement, AccessMode::Read)
        .await?
        .into_rows();

    for follow_up in &compiled.follow_ups {
        load_into(coordinator, &mut rows, Some(compiled.root_column()), follow_up).await?;
    }
    log::debug!(
        "fetched {} {} row(s) with {} follow-up load(s)",
        rows.len(),
        query.labels.join(":"),
        compiled.follow_ups.len()
    );
    Ok(rows)
}

/// Key of one target: read from the node in `node_column`, or from the
/// target itself when it is a node
fn key_of(target: &Row, node_column: Option<&str>, key: &str) -> Option<Value> {
    let node = match node_column {
        Some(column) => target.get(column)?.as_object()?,
        None => target,
    };
    node.get(key).filter(|v| !v.is_null()).cloned()
}

/// `Value` is not `Hash`; its compact JSON text stands in as the lookup key
fn lookup_key(value: &Value) -> String {
    value.to_string()
}

/// Distinct non-null keys in first-seen order
fn parent_keys(targets: &[Row], node_column: Option<&str>, key: &str) -> Vec<Value> {
    let mut seen = HashSet::new();
    targets
        .iter()
        .filter_map(|t| key_of(t, node_column, key))
        .filter(|value| seen.insert(lookup_key(value)))
        .collect()
}

fn load_into<'a>(
    coordinator: &'a TransactionCoordinator,
    targets: &'a mut [Row],
    node_column: Option<&'a str>,
    follow_up: &'a FollowUpQuery,
) -> BoxFuture<'a, Result<(), MapperError>> {
    Box::pin(async move {
        let keys = parent_keys(targets, node_column, &follow_up.root_key);

        let mut by_owner: HashMap<String, Vec<usize>> = HashMap::new();
        let mut related: Vec<Row> = Vec::new();
        if !keys.is_empty() {
            let mut statement = follow_up.statement.clone();
            statement
                .params
                .insert(PARENT_KEYS_PARAM.to_string(), Value::Array(keys));
            let result = coordinator.execute(&statement, AccessMode::Read).await?;

            for mut row in result.into_rows() {
                let owner = row.remove(PARENT_KEY_COLUMN).unwrap_or(Value::Null);
                match row.remove(RELATED_COLUMN) {
                    Some(Value::Object(node)) => {
                        by_owner.entry(lookup_key(&owner)).or_default().push(related.len());
                        related.push(node);
                    }
                    // OPTIONAL patterns yield null for parents without matches
                    Some(Value::Null) | None => {}
                    Some(other) => {
                        log::warn!(
                            "eager load '{}' returned a non-node value: {}",
                            follow_up.relation,
                            other
                        );
                    }
                }
            }
        }

        for nested in &follow_up.nested {
            load_into(coordinator, &mut related, None, nested).await?;
        }

        for target in targets.iter_mut() {
            let indices = key_of(target, node_column, &follow_up.root_key)
                .and_then(|key| by_owner.get(&lookup_key(&key)))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let mut matches = indices.iter().map(|&i| Value::Object(related[i].clone()));

            let attached = if follow_up.single_valued {
                matches.next().unwrap_or(Value::Null)
            } else {
                Value::Array(matches.collect())
            };
            target.insert(follow_up.relation.clone(), attached);
        }
        Ok(())
    })
}
