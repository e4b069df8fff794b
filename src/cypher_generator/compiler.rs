/// Query compiler
///
/// Assembles one statement from a `QueryDescriptor`:
///
/// ```text
/// MATCH (n:Label) [WHERE <fragments joined by connectors>]
/// [WITH n ORDER BY .. SKIP .. LIMIT ..  OPTIONAL MATCH .. collect() ..]   inline eager loads
/// RETURN [DISTINCT] <projections | aggregates | n> [ORDER BY ..] [SKIP ..] [LIMIT ..]
/// ```
///
/// Follow-up eager loads come back separately in `CompiledQuery::follow_ups`.
use super::clause_translator::ClauseTranslator;
use super::eager_load::{plan_eager_load, EagerPlan, FollowUpQuery, InlineLoad};
use super::errors::CypherGeneratorError;
use super::identifiers::{label_expression, property_ref, quote_identifier, ParamAllocator};
use super::query_descriptor::{Projection, QueryDescriptor, SortKey, ROOT_ALIAS};
use super::statement::CypherStatement;

/// Alias of a lone unnamed aggregate
pub const AGGREGATE_COLUMN: &str = "aggregate";
pub const EXISTS_COLUMN: &str = "exists";

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub statement: CypherStatement,
    /// One fragment per top-level predicate, in order
    pub where_fragments: Vec<String>,
    /// Names of loads returned as columns of the main statement
    pub inline_loads: Vec<String>,
    pub follow_ups: Vec<FollowUpQuery>,
}

impl CompiledQuery {
    /// Result column holding the root nodes
    pub fn root_column(&self) -> &'static str {
        ROOT_ALIAS
    }
}

struct ReturnItem {
    expression: String,
    alias: String,
}

fn projection_items(query: &QueryDescriptor) -> Result<Vec<ReturnItem>, CypherGeneratorError> {
    let aggregate_count = query
        .projections
        .iter()
        .filter(|p| matches!(p, Projection::Aggregate { .. }))
        .count();

    query
        .projections
        .iter()
        .map(|projection| match projection {
            Projection::Column { column, alias } => {
                let owner = column.alias.as_deref().unwrap_or(ROOT_ALIAS);
                Ok(ReturnItem {
                    expression: property_ref(owner, &column.property),
                    alias: alias.clone().unwrap_or_else(|| column.property.clone()),
                })
            }
            Projection::Aggregate {
                function,
                column,
                alias,
            } => {
                let argument = match column {
                    Some(column) => property_ref(column.alias.as_deref().unwrap_or(ROOT_ALIAS), &column.property),
                    None => ROOT_ALIAS.to_string(),
                };
                let alias = match (alias, column) {
                    (Some(alias), _) => alias.clone(),
                    (None, _) if aggregate_count == 1 => AGGREGATE_COLUMN.to_string(),
                    (None, Some(column)) => format!("{}_{}", function.name(), column.property),
                    (None, None) => function.name().to_string(),
                };
                Ok(ReturnItem {
                    expression: format!("{}({})", function.name(), argument),
                    alias,
                })
            }
        })
        .collect()
}

/// `ORDER BY` keys, preferring a projected alias for the same property
fn order_keys(order_by: &[SortKey], items: &[ReturnItem]) -> Option<String> {
    if order_by.is_empty() {
        return None;
    }
    let keys: Vec<String> = order_by
        .iter()
        .map(|key| {
            let owner = key.column.alias.as_deref().unwrap_or(ROOT_ALIAS);
            let expression = property_ref(owner, &key.column.property);
            let target = items
                .iter()
                .find(|item| item.expression == expression)
                .map(|item| quote_identifier(&item.alias))
                .unwrap_or(expression);
            format!("{} {}", target, key.order)
        })
        .collect();
    Some(keys.join(", "))
}

fn pagination(query: &QueryDescriptor) -> String {
    let mut out = String::new();
    if let Some(skip) = query.skip {
        out.push_str(&format!(" SKIP {}", skip));
    }
    if let Some(limit) = query.limit {
        out.push_str(&format!(" LIMIT {}", limit));
    }
    out
}

/// Compile a query description into a single statement.
///
/// # Example
/// ```ignore
/// let compiled = compile(
///     &QueryDescriptor::new("User")
///         .filter(Predicate::gt("age", 25))
///         .order_by_desc("created_at")
///         .limit(10),
/// )?;
/// assert_eq!(
///     compiled.statement.text,
///     "MATCH (n:User) WHERE n.age > $p0 RETURN n ORDER BY n.created_at DESC LIMIT 10"
/// );
/// ```
pub fn compile(query: &QueryDescriptor) -> Result<CompiledQuery, CypherGeneratorError> {
    if query.labels.is_empty() || query.labels.iter().any(|l| l.is_empty()) {
        return Err(CypherGeneratorError::MissingLabel);
    }
    if !query.eager_loads.is_empty() && (query.exists || !query.projections.is_empty()) {
        let relation = query.eager_loads[0].name().to_string();
        return Err(CypherGeneratorError::eager_load_with_context(
            relation,
            "eager loading needs whole nodes; drop projections, aggregates and exists",
        ));
    }

    let mut params = ParamAllocator::new();
    for (name, value) in &query.bindings {
        params.bind_named(name, value.clone())?;
    }

    let mut text = format!("MATCH ({}{})", ROOT_ALIAS, label_expression(&query.labels));

    let fragments = ClauseTranslator::new(ROOT_ALIAS, &mut params).translate_all(&query.predicates)?;
    if !fragments.is_empty() {
        text.push_str(" WHERE ");
        text.push_str(&ClauseTranslator::join(&fragments, &query.predicates));
    }

    let mut inline: Vec<InlineLoad> = Vec::new();
    let mut follow_ups = Vec::new();
    for (index, load) in query.eager_loads.iter().enumerate() {
        match plan_eager_load(load, index, &mut params)? {
            EagerPlan::Inline(plan) => inline.push(plan),
            EagerPlan::FollowUp(plan) => follow_ups.push(plan),
        }
    }

    if query.exists {
        text.push_str(&format!(" RETURN count({}) > 0 AS {}", ROOT_ALIAS, EXISTS_COLUMN));
    } else if !inline.is_empty() {
        let order = order_keys(&query.order_by, &[]);
        let page = pagination(query);
        if !page.is_empty() {
            // Paginate the roots before traversing so LIMIT counts parents
            text.push_str(&format!(" WITH {}", ROOT_ALIAS));
            if let Some(order) = &order {
                text.push_str(&format!(" ORDER BY {}", order));
            }
            text.push_str(&page);
        }
        let mut carried = vec![ROOT_ALIAS.to_string()];
        for load in &inline {
            text.push(' ');
            text.push_str(&load.render(&carried));
            carried.push(load.column());
        }
        text.push_str(&format!(" RETURN {}", carried.join(", ")));
        if let Some(order) = order {
            text.push_str(&format!(" ORDER BY {}", order));
        }
    } else {
        let items = projection_items(query)?;
        let returned = if items.is_empty() {
            ROOT_ALIAS.to_string()
        } else {
            items
                .iter()
                .map(|item| format!("{} AS {}", item.expression, quote_identifier(&item.alias)))
                .collect::<Vec<_>>()
                .join(", ")
        };
        text.push_str(" RETURN ");
        if query.distinct {
            text.push_str("DISTINCT ");
        }
        text.push_str(&returned);
        if let Some(order) = order_keys(&query.order_by, &items) {
            text.push_str(&format!(" ORDER BY {}", order));
        }
        text.push_str(&pagination(query));
    }

    log::debug!("Compiled Cypher: {}", text);
    Ok(CompiledQuery {
        statement: CypherStatement::with_params(text, params.into_params()),
        where_fragments: fragments.into_iter().map(|f| f.text).collect(),
        inline_loads: inline.into_iter().map(|l| l.name).collect(),
        follow_ups,
    })
}
