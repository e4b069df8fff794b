//! Normalized query results
//!
//! Every backend returns rows as JSON maps keyed by column name, plus a
//! summary with write counters. Timing in the summary is informational and
//! ignored when comparing results.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cypher_generator::statement::Params;

pub type Row = Params;

/// Write counters, named as the Neo4j HTTP API reports them
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counters {
    pub contains_updates: bool,
    pub nodes_created: u64,
    pub nodes_deleted: u64,
    pub relationships_created: u64,
    #[serde(alias = "relationship_deleted")]
    pub relationships_deleted: u64,
    pub properties_set: u64,
    pub labels_added: u64,
    pub labels_removed: u64,
    pub indexes_added: u64,
    pub indexes_removed: u64,
    pub constraints_added: u64,
    pub constraints_removed: u64,
}

impl Counters {
    pub fn merge(&mut self, other: &Counters) {
        self.contains_updates |= other.contains_updates;
        self.nodes_created += other.nodes_created;
        self.nodes_deleted += other.nodes_deleted;
        self.relationships_created += other.relationships_created;
        self.relationships_deleted += other.relationships_deleted;
        self.properties_set += other.properties_set;
        self.labels_added += other.labels_added;
        self.labels_removed += other.labels_removed;
        self.indexes_added += other.indexes_added;
        self.indexes_removed += other.indexes_removed;
        self.constraints_added += other.constraints_added;
        self.constraints_removed += other.constraints_removed;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSummary {
    pub counters: Counters,
    pub database: Option<String>,
    /// Server or client-side time until the result was available
    pub elapsed_ms: Option<u64>,
}

impl PartialEq for ResultSummary {
    fn eq(&self, other: &Self) -> bool {
        self.counters == other.counters && self.database == other.database
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    columns: Vec<String>,
    rows: Vec<Row>,
    summary: ResultSummary,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        ResultSet {
            columns,
            rows,
            summary: ResultSummary::default(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from positional rows, the shape the HTTP API returns
    pub fn from_positional(columns: Vec<String>, data: Vec<Vec<Value>>) -> Self {
        let rows = data
            .into_iter()
            .map(|values| columns.iter().cloned().zip(values).collect::<Row>())
            .collect();
        ResultSet::new(columns, rows)
    }

    /// One-row result, handy for scripted responses
    pub fn single(column: &str, value: Value) -> Self {
        let mut row = Row::new();
        row.insert(column.to_string(), value);
        ResultSet::new(vec![column.to_string()], vec![row])
    }

    pub fn with_summary(mut self, summary: ResultSummary) -> Self {
        self.summary = summary;
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn to_list(&self) -> Vec<Row> {
        self.rows.clone()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn summary(&self) -> &ResultSummary {
        &self.summary
    }

    pub fn summary_mut(&mut self) -> &mut ResultSummary {
        &mut self.summary
    }

    /// Value of `column` in the first row
    pub fn scalar(&self, column: &str) -> Option<&Value> {
        self.first().and_then(|row| row.get(column))
    }

    /// Every row's value for `column`, skipping rows without it
    pub fn column_values(&self, column: &str) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.get(column).cloned())
            .collect()
    }

    /// The `affected` count mutation statements return; 0 when absent
    pub fn affected(&self) -> i64 {
        self.scalar(crate::relationship::mutations::AFFECTED_COLUMN)
            .and_then(Value::as_i64)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positional_rows_become_maps() {
        let rs = ResultSet::from_positional(
            vec!["name".to_string(), "age".to_string()],
            vec![vec![json!("Ann"), json!(31)], vec![json!("Bo"), json!(25)]],
        );
        assert_eq!(rs.count(), 2);
        assert_eq!(rs.first().unwrap()["name"], json!("Ann"));
        assert_eq!(rs.column_values("age"), vec![json!(31), json!(25)]);
    }

    #[test]
    fn test_equality_ignores_timing() {
        let a = ResultSet::single("affected", json!(1)).with_summary(ResultSummary {
            elapsed_ms: Some(3),
            ..ResultSummary::default()
        });
        let b = ResultSet::single("affected", json!(1)).with_summary(ResultSummary {
            elapsed_ms: Some(90),
            ..ResultSummary::default()
        });
        assert_eq!(a, b);
        assert_eq!(a.affected(), 1);
    }

    #[test]
    fn test_counters_accept_http_spelling() {
        let counters: Counters =
            serde_json::from_value(json!({"relationship_deleted": 2, "nodes_created": 1})).unwrap();
        assert_eq!(counters.relationships_deleted, 2);
        assert_eq!(counters.nodes_created, 1);
    }
}
