/// Graph objects produced by relationship planning
///
/// A `GraphNode` identifies a node by labels and key properties; a
/// `GraphEdge` describes a typed, directed edge with its properties. The
/// mutation builders render both into Cypher patterns.
use serde::Serialize;
use serde_json::Value;

use crate::cypher_generator::identifiers::{label_expression, quote_identifier, ParamAllocator};
use crate::cypher_generator::statement::Params;

use super::descriptor::EdgeDirection;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub labels: Vec<String>,
    pub properties: Params,
}

impl GraphNode {
    pub fn new(label: impl Into<String>) -> Self {
        GraphNode {
            labels: vec![label.into()],
            properties: Params::new(),
        }
    }

    /// Node identified by a single key property
    pub fn keyed(label: impl Into<String>, key: &str, value: Value) -> Self {
        let mut node = GraphNode::new(label);
        node.properties.insert(key.to_string(), value);
        node
    }

    /// `(alias:Label)` followed by `WHERE alias.key = $p AND ...` conditions
    pub fn match_clause(&self, alias: &str, params: &mut ParamAllocator) -> String {
        let pattern = format!("({}{})", alias, label_expression(&self.labels));
        if self.properties.is_empty() {
            return format!("MATCH {}", pattern);
        }
        let conditions: Vec<String> = self
            .properties
            .iter()
            .map(|(key, value)| {
                format!("{}.{} = {}", alias, quote_identifier(key), params.bind(value.clone()))
            })
            .collect();
        format!("MATCH {} WHERE {}", pattern, conditions.join(" AND "))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub edge_type: String,
    #[serde(skip)]
    pub direction: EdgeDirection,
    pub properties: Params,
}

impl GraphEdge {
    pub fn new(edge_type: impl Into<String>, direction: EdgeDirection) -> Self {
        GraphEdge {
            edge_type: edge_type.into(),
            direction,
            properties: Params::new(),
        }
    }

    pub fn with_properties(mut self, properties: Params) -> Self {
        self.properties = properties;
        self
    }

    /// `(from)-[alias:TYPE]->(to)` oriented by the edge direction
    pub fn pattern(&self, parent_alias: &str, edge_alias: &str, child_alias: &str) -> String {
        let rel = format!("[{}:{}]", edge_alias, quote_identifier(&self.edge_type));
        match self.direction {
            EdgeDirection::ParentToChild => {
                format!("({})-{}->({})", parent_alias, rel, child_alias)
            }
            EdgeDirection::ChildToParent => {
                format!("({})<-{}-({})", parent_alias, rel, child_alias)
            }
        }
    }
}
