/// Eager-load planning
///
/// Each eager load compiles one of two ways:
///
/// - **inline**: an `OPTIONAL MATCH` traversal plus `collect()` appended to the
///   main statement. Used for unlimited, non-nested loads over edge storage
///   (`native_edge` or `hybrid`).
/// - **follow-up**: a separate statement keyed by the parent identifiers,
///   bound at load time as `$parent_keys`. Used for foreign-key storage, for
///   limited loads and for loads with nested loads. Nested loads are always
///   follow-ups of their own parent follow-up.
///
/// A load's `limit` caps the related rows across *all* parents of that load
/// (a single `LIMIT` on the follow-up), the same as a flat relational query
/// would. It is never a per-parent cap.
use serde_json::Value;

use crate::relationship::descriptor::{RelationshipDescriptor, RelationshipKind};
use crate::relationship::graph_objects::GraphEdge;

use super::clause_translator::ClauseTranslator;
use super::errors::CypherGeneratorError;
use super::identifiers::{label_expression, property_ref, quote_identifier, ParamAllocator};
use super::query_descriptor::{EagerLoad, SortKey, ROOT_ALIAS};
use super::statement::CypherStatement;

/// Placeholder bound to the list of parent keys of a follow-up
pub const PARENT_KEYS_PARAM: &str = "parent_keys";
/// Column of a follow-up row holding the key of the parent it belongs to
pub const PARENT_KEY_COLUMN: &str = "parent_key";
/// Column of a follow-up row holding the related node
pub const RELATED_COLUMN: &str = "related";

const RELATED_ALIAS: &str = "r";
const ORIGIN_ALIAS: &str = "o";
const PIVOT_ALIAS: &str = "pv";

#[derive(Debug, Clone, PartialEq)]
pub enum EagerPlan {
    Inline(InlineLoad),
    FollowUp(FollowUpQuery),
}

/// Traversal rendered into the main statement
#[derive(Debug, Clone, PartialEq)]
pub struct InlineLoad {
    pub name: String,
    alias: String,
    pattern: String,
    condition: Option<String>,
    order: Option<String>,
    single_valued: bool,
}

impl InlineLoad {
    /// Result column the collection is returned under
    pub fn column(&self) -> String {
        quote_identifier(&self.name)
    }

    /// `OPTIONAL MATCH ... WITH <carried>, collect(..) AS <name>`
    pub fn render(&self, carried: &[String]) -> String {
        let carried = carried.join(", ");
        let mut out = format!("OPTIONAL MATCH {}", self.pattern);
        if let Some(condition) = &self.condition {
            out.push_str(&format!(" WHERE {}", condition));
        }
        if let Some(order) = &self.order {
            out.push_str(&format!(" WITH {}, {} ORDER BY {}", carried, self.alias, order));
        }
        let collected = if self.single_valued {
            format!("head(collect({}))", self.alias)
        } else {
            format!("collect({})", self.alias)
        };
        out.push_str(&format!(" WITH {}, {} AS {}", carried, collected, self.column()));
        out
    }
}

/// Statement run after the main query, once per load
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpQuery {
    pub relation: String,
    /// `$parent_keys` is bound to an empty list until load time
    pub statement: CypherStatement,
    /// Property of the parent rows whose values fill `$parent_keys`
    pub root_key: String,
    /// Attach a single node (or null) instead of a list
    pub single_valued: bool,
    pub nested: Vec<FollowUpQuery>,
}

/// Key property on the declaring side, and the target label
fn root_side(rel: &RelationshipDescriptor) -> (&str, &str) {
    if rel.kind().declared_on_child() {
        (rel.foreign_key(), rel.parent_label())
    } else {
        (rel.parent_key(), rel.child_label())
    }
}

fn order_clause(order_by: &[SortKey], alias: &str) -> Option<String> {
    if order_by.is_empty() {
        return None;
    }
    let keys: Vec<String> = order_by
        .iter()
        .map(|key| {
            let owner = key.column.alias.as_deref().unwrap_or(alias);
            format!("{} {}", property_ref(owner, &key.column.property), key.order)
        })
        .collect();
    Some(keys.join(", "))
}

fn filter_condition(
    load: &EagerLoad,
    alias: &str,
    params: &mut ParamAllocator,
) -> Result<Option<String>, CypherGeneratorError> {
    if load.predicates.is_empty() {
        return Ok(None);
    }
    let mut translator = ClauseTranslator::new(alias, params);
    let fragments = translator.translate_all(&load.predicates)?;
    Ok(Some(ClauseTranslator::join(&fragments, &load.predicates)))
}

fn uses_inline(load: &EagerLoad) -> bool {
    load.relation.storage().uses_edges() && load.limit.is_none() && load.nested.is_empty()
}

/// Plan the `index`-th load of a query; inline loads bind into `params`
pub fn plan_eager_load(
    load: &EagerLoad,
    index: usize,
    params: &mut ParamAllocator,
) -> Result<EagerPlan, CypherGeneratorError> {
    if uses_inline(load) {
        plan_inline(load, index, params).map(EagerPlan::Inline)
    } else {
        plan_follow_up(load).map(EagerPlan::FollowUp)
    }
}

fn plan_inline(
    load: &EagerLoad,
    index: usize,
    params: &mut ParamAllocator,
) -> Result<InlineLoad, CypherGeneratorError> {
    let rel = &load.relation;
    let alias = format!("e{}", index);
    let (_, target_label) = root_side(rel);
    let target = format!("{}{}", alias, label_expression(&[target_label.to_string()]));
    let edge = GraphEdge::new(rel.edge_type(), rel.direction());
    let pattern = if rel.kind().declared_on_child() {
        edge.pattern(&target, "", ROOT_ALIAS)
    } else {
        edge.pattern(ROOT_ALIAS, "", &target)
    };

    Ok(InlineLoad {
        name: load.name().to_string(),
        condition: filter_condition(load, &alias, params)?,
        order: order_clause(&load.order_by, &alias),
        single_valued: rel.kind().is_single_valued(),
        alias,
        pattern,
    })
}

/// Compile `load` as a statement keyed by `$parent_keys`
pub fn plan_follow_up(load: &EagerLoad) -> Result<FollowUpQuery, CypherGeneratorError> {
    let rel = &load.relation;
    let mut params = ParamAllocator::new();
    let keys = params.bind_named(PARENT_KEYS_PARAM, Value::Array(Vec::new()))?;
    let (fk_root_key, target_label) = root_side(rel);
    let related = format!("{}{}", RELATED_ALIAS, label_expression(&[target_label.to_string()]));

    let (root_key, (mut text, key_expr)) = if rel.storage().uses_edges() {
        (edge_origin(rel).1, edge_follow_up(rel, &related, &keys))
    } else {
        (fk_root_key, foreign_key_follow_up(rel, &related, &keys, &mut params))
    };

    if let Some(condition) = filter_condition(load, RELATED_ALIAS, &mut params)? {
        text.push_str(&format!(" AND ({})", condition));
    }
    text.push_str(&format!(
        " RETURN {} AS {}, {} AS {}",
        key_expr, PARENT_KEY_COLUMN, RELATED_ALIAS, RELATED_COLUMN
    ));
    if let Some(order) = order_clause(&load.order_by, RELATED_ALIAS) {
        text.push_str(&format!(" ORDER BY {}", order));
    }
    if let Some(limit) = load.limit {
        text.push_str(&format!(" LIMIT {}", limit));
    }

    let nested = load
        .nested
        .iter()
        .map(plan_follow_up)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CypherGeneratorError::eager_load_with_context(load.name(), e.to_string()))?;

    Ok(FollowUpQuery {
        relation: load.name().to_string(),
        statement: CypherStatement::with_params(text, params.into_params()),
        root_key: root_key.to_string(),
        single_valued: rel.kind().is_single_valued(),
        nested,
    })
}

/// Traverse the typed edge from the declaring side to the related nodes
fn edge_follow_up(rel: &RelationshipDescriptor, related: &str, keys: &str) -> (String, String) {
    let edge = GraphEdge::new(rel.edge_type(), rel.direction());
    let (origin_label, origin_key) = edge_origin(rel);
    let origin = format!("{}{}", ORIGIN_ALIAS, label_expression(&[origin_label.to_string()]));
    let pattern = if rel.kind().declared_on_child() {
        edge.pattern(related, "", &origin)
    } else {
        edge.pattern(&origin, "", related)
    };
    let key_expr = property_ref(ORIGIN_ALIAS, origin_key);
    (format!("MATCH {} WHERE {} IN {}", pattern, key_expr, keys), key_expr)
}

/// Label and key of the declaring side when the link is an edge
fn edge_origin(rel: &RelationshipDescriptor) -> (&str, &str) {
    if rel.kind().declared_on_child() {
        (rel.child_label(), rel.child_key())
    } else {
        (rel.parent_label(), rel.parent_key())
    }
}

/// Look the related nodes up by key properties
fn foreign_key_follow_up(
    rel: &RelationshipDescriptor,
    related: &str,
    keys: &str,
    params: &mut ParamAllocator,
) -> (String, String) {
    match rel.kind() {
        RelationshipKind::ManyToOne => {
            let key_expr = property_ref(RELATED_ALIAS, rel.parent_key());
            (format!("MATCH ({}) WHERE {} IN {}", related, key_expr, keys), key_expr)
        }
        RelationshipKind::ManyToMany => {
            let pivot_label = rel.pivot_label().unwrap_or_default().to_string();
            let related_key = rel.related_key().unwrap_or(rel.child_key());
            let key_expr = property_ref(PIVOT_ALIAS, rel.foreign_key());
            (
                format!(
                    "MATCH ({}{}) WHERE {} IN {} MATCH ({}) WHERE {} = {}",
                    PIVOT_ALIAS,
                    label_expression(&[pivot_label]),
                    key_expr,
                    keys,
                    related,
                    property_ref(RELATED_ALIAS, rel.child_key()),
                    property_ref(PIVOT_ALIAS, related_key)
                ),
                key_expr,
            )
        }
        RelationshipKind::OneToMany | RelationshipKind::MorphOne | RelationshipKind::MorphMany => {
            let key_expr = property_ref(RELATED_ALIAS, rel.foreign_key());
            let mut text = format!("MATCH ({}) WHERE {} IN {}", related, key_expr, keys);
            if let (Some(type_key), Some(type_value)) = (rel.morph_type_key(), rel.morph_type_value()) {
                text.push_str(&format!(
                    " AND {} = {}",
                    property_ref(RELATED_ALIAS, type_key),
                    params.bind(Value::String(type_value.to_string()))
                ));
            }
            (text, key_expr)
        }
    }
}
