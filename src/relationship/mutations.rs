/// Cypher mutations for relationship persistence
///
/// Each builder returns one self-contained statement ending in
/// `RETURN ... AS affected`, so the caller can tell whether the write found
/// its endpoints. Keys and properties are always bound as parameters.
use serde_json::Value;

use crate::cypher_generator::identifiers::{label_expression, quote_identifier, ParamAllocator};
use crate::cypher_generator::statement::{CypherStatement, Params};

use super::descriptor::RelationshipDescriptor;
use super::graph_objects::{GraphEdge, GraphNode};

/// Column every mutation returns
pub const AFFECTED_COLUMN: &str = "affected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    SetForeignKey,
    ClearForeignKey,
    MergePivot,
    DeletePivot,
    MergeEdge,
    DeleteEdge,
}

impl MutationKind {
    pub fn writes_foreign_key(self) -> bool {
        matches!(
            self,
            MutationKind::SetForeignKey
                | MutationKind::ClearForeignKey
                | MutationKind::MergePivot
                | MutationKind::DeletePivot
        )
    }

    pub fn writes_edge(self) -> bool {
        matches!(self, MutationKind::MergeEdge | MutationKind::DeleteEdge)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub statement: CypherStatement,
    /// Zero affected rows means an endpoint is missing and the write must fail
    pub requires_match: bool,
    pub node: GraphNode,
    pub edge: Option<GraphEdge>,
}

fn child_node(rel: &RelationshipDescriptor, child: &Value) -> GraphNode {
    GraphNode::keyed(rel.child_label(), rel.child_key(), child.clone())
}

fn parent_node(rel: &RelationshipDescriptor, parent: &Value) -> GraphNode {
    GraphNode::keyed(rel.parent_label(), rel.parent_key(), parent.clone())
}

/// `SET child.<fk> = parent.<key>` (plus the morph discriminator).
///
/// The parent is matched first, so a missing parent yields zero affected rows.
pub fn set_foreign_key(rel: &RelationshipDescriptor, parent: &Value, child: &Value) -> Mutation {
    let mut params = ParamAllocator::new();
    let node = child_node(rel, child);
    let mut text = format!(
        "{} {}",
        parent_node(rel, parent).match_clause("p", &mut params),
        node.match_clause("c", &mut params)
    );

    let mut assignments = vec![format!(
        "c.{} = p.{}",
        quote_identifier(rel.foreign_key()),
        quote_identifier(rel.parent_key())
    )];
    if let (Some(type_key), Some(type_value)) = (rel.morph_type_key(), rel.morph_type_value()) {
        assignments.push(format!(
            "c.{} = {}",
            quote_identifier(type_key),
            params.bind(Value::String(type_value.to_string()))
        ));
    }
    text.push_str(&format!(
        " SET {} RETURN count(c) AS {}",
        assignments.join(", "),
        AFFECTED_COLUMN
    ));

    Mutation {
        kind: MutationKind::SetForeignKey,
        statement: CypherStatement::with_params(text, params.into_params()),
        requires_match: true,
        node,
        edge: None,
    }
}

/// `REMOVE child.<fk>`; restricted to the given parent when one is known
pub fn clear_foreign_key(rel: &RelationshipDescriptor, parent: Option<&Value>, child: &Value) -> Mutation {
    let mut params = ParamAllocator::new();
    let mut filter = child_node(rel, child);
    if let Some(parent) = parent {
        filter
            .properties
            .insert(rel.foreign_key().to_string(), parent.clone());
        if let (Some(type_key), Some(type_value)) = (rel.morph_type_key(), rel.morph_type_value()) {
            filter
                .properties
                .insert(type_key.to_string(), Value::String(type_value.to_string()));
        }
    }
    let mut removals = vec![format!("c.{}", quote_identifier(rel.foreign_key()))];
    if let Some(type_key) = rel.morph_type_key() {
        removals.push(format!("c.{}", quote_identifier(type_key)));
    }
    let text = format!(
        "{} REMOVE {} RETURN count(c) AS {}",
        filter.match_clause("c", &mut params),
        removals.join(", "),
        AFFECTED_COLUMN
    );

    Mutation {
        kind: MutationKind::ClearForeignKey,
        statement: CypherStatement::with_params(text, params.into_params()),
        requires_match: false,
        node: child_node(rel, child),
        edge: None,
    }
}

fn pivot_node(rel: &RelationshipDescriptor, parent: &Value, child: &Value) -> GraphNode {
    let label = rel
        .pivot_label()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}{}", rel.parent_label(), rel.child_label()));
    let mut node = GraphNode::keyed(label, rel.foreign_key(), parent.clone());
    let related = rel.related_key().unwrap_or(rel.child_key());
    node.properties.insert(related.to_string(), child.clone());
    node
}

/// Pivot node carrying both keys and the pivot properties.
///
/// Both endpoints are matched before the pivot is written; the pivot keys
/// are copied from the matched nodes.
pub fn merge_pivot(
    rel: &RelationshipDescriptor,
    parent: &Value,
    child: &Value,
    properties: &Params,
) -> Mutation {
    let mut params = ParamAllocator::new();
    let node = pivot_node(rel, parent, child);
    let verb = if rel.allow_duplicate_edges() { "CREATE" } else { "MERGE" };
    let related = rel.related_key().unwrap_or(rel.child_key());
    let mut text = format!(
        "{} {} {} (pv{} {{{}: p.{}, {}: c.{}}})",
        parent_node(rel, parent).match_clause("p", &mut params),
        child_node(rel, child).match_clause("c", &mut params),
        verb,
        label_expression(&node.labels),
        quote_identifier(rel.foreign_key()),
        quote_identifier(rel.parent_key()),
        quote_identifier(related),
        quote_identifier(rel.child_key())
    );
    if !properties.is_empty() {
        text.push_str(&format!(
            " SET pv += {}",
            params.bind(Value::Object(properties.clone()))
        ));
    }
    text.push_str(&format!(" RETURN count(pv) AS {}", AFFECTED_COLUMN));

    Mutation {
        kind: MutationKind::MergePivot,
        statement: CypherStatement::with_params(text, params.into_params()),
        requires_match: true,
        node,
        edge: None,
    }
}

pub fn delete_pivot(rel: &RelationshipDescriptor, parent: &Value, child: &Value) -> Mutation {
    let mut params = ParamAllocator::new();
    let node = pivot_node(rel, parent, child);
    let text = format!(
        "{} WITH collect(pv) AS found FOREACH (x IN found | DETACH DELETE x) RETURN size(found) AS {}",
        node.match_clause("pv", &mut params),
        AFFECTED_COLUMN
    );

    Mutation {
        kind: MutationKind::DeletePivot,
        statement: CypherStatement::with_params(text, params.into_params()),
        requires_match: false,
        node,
        edge: None,
    }
}

/// Typed edge between parent and child.
///
/// With `replace_existing` any edge of the same type from a different parent
/// into the child is deleted first, keeping single-parent relationships
/// single-valued.
pub fn merge_edge(
    rel: &RelationshipDescriptor,
    parent: &Value,
    child: &Value,
    properties: &Params,
    replace_existing: bool,
) -> Mutation {
    let mut params = ParamAllocator::new();
    let edge = GraphEdge::new(rel.edge_type(), rel.direction()).with_properties(properties.clone());
    let parent = parent_node(rel, parent);
    let child = child_node(rel, child);

    let mut text = format!(
        "{} {}",
        parent.match_clause("p", &mut params),
        child.match_clause("c", &mut params)
    );
    if replace_existing {
        let other = format!("other{}", label_expression(&parent.labels));
        text.push_str(&format!(
            " OPTIONAL MATCH {} WHERE other <> p DELETE stale WITH DISTINCT p, c",
            edge.pattern(&other, "stale", "c")
        ));
    }
    let verb = if rel.allow_duplicate_edges() && !replace_existing {
        "CREATE"
    } else {
        "MERGE"
    };
    text.push_str(&format!(" {} {}", verb, edge.pattern("p", "r", "c")));
    if !properties.is_empty() {
        text.push_str(&format!(
            " SET r += {}",
            params.bind(Value::Object(properties.clone()))
        ));
    }
    text.push_str(&format!(" RETURN count(r) AS {}", AFFECTED_COLUMN));

    Mutation {
        kind: MutationKind::MergeEdge,
        statement: CypherStatement::with_params(text, params.into_params()),
        requires_match: true,
        node: child,
        edge: Some(edge),
    }
}

/// Delete edges of the relationship's type into the child, optionally only
/// those coming from one parent
pub fn delete_edge(rel: &RelationshipDescriptor, parent: Option<&Value>, child: &Value) -> Mutation {
    let mut params = ParamAllocator::new();
    let edge = GraphEdge::new(rel.edge_type(), rel.direction());
    let child = child_node(rel, child);
    let parent_pattern = format!("p{}", label_expression(&[rel.parent_label().to_string()]));

    let mut text = format!(
        "{} MATCH {}",
        child.match_clause("c", &mut params),
        edge.pattern(&parent_pattern, "r", "c")
    );
    if let Some(parent) = parent {
        text.push_str(&format!(
            " WHERE p.{} = {}",
            quote_identifier(rel.parent_key()),
            params.bind(parent.clone())
        ));
    }
    text.push_str(&format!(
        " WITH collect(r) AS found FOREACH (x IN found | DELETE x) RETURN size(found) AS {}",
        AFFECTED_COLUMN
    ));

    Mutation {
        kind: MutationKind::DeleteEdge,
        statement: CypherStatement::with_params(text, params.into_params()),
        requires_match: false,
        node: child,
        edge: Some(edge),
    }
}
