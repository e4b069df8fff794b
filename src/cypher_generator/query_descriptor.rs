/// Query descriptors
///
/// A `QueryDescriptor` is the relational-style description of a read: target
/// label(s), filters, sort keys, pagination, projections and eager loads. It
/// is built incrementally by the caller and only read by the compiler.
use std::fmt;

use serde_json::Value;

use crate::relationship::descriptor::RelationshipDescriptor;

use super::predicate::{ColumnRef, Predicate};
use super::statement::Params;

/// Pattern variable of the root node
pub const ROOT_ALIAS: &str = "n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortOrder::Asc => f.write_str("ASC"),
            SortOrder::Desc => f.write_str("DESC"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: ColumnRef,
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
}

impl AggregateFunction {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Collect => "collect",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Column {
        column: ColumnRef,
        alias: Option<String>,
    },
    /// `column: None` aggregates whole nodes (`count(n)`)
    Aggregate {
        function: AggregateFunction,
        column: Option<ColumnRef>,
        alias: Option<String>,
    },
}

/// Relation to load alongside the root rows
#[derive(Debug, Clone, PartialEq)]
pub struct EagerLoad {
    pub relation: RelationshipDescriptor,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<SortKey>,
    /// Cap on related rows across all parents of one load, not per parent
    pub limit: Option<u64>,
    pub nested: Vec<EagerLoad>,
}

impl EagerLoad {
    pub fn new(relation: RelationshipDescriptor) -> Self {
        EagerLoad {
            relation,
            predicates: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            nested: Vec::new(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, column: impl Into<ColumnRef>, order: SortOrder) -> Self {
        self.order_by.push(SortKey {
            column: column.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with(mut self, nested: EagerLoad) -> Self {
        self.nested.push(nested);
        self
    }

    /// Name the loaded rows are attached under
    pub fn name(&self) -> &str {
        self.relation.name()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDescriptor {
    pub labels: Vec<String>,
    pub predicates: Vec<Predicate>,
    pub order_by: Vec<SortKey>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub projections: Vec<Projection>,
    pub distinct: bool,
    /// Return only whether any row matches
    pub exists: bool,
    pub eager_loads: Vec<EagerLoad>,
    /// Values for `Operand::Parameter` placeholders
    pub bindings: Params,
}

impl QueryDescriptor {
    pub fn new(label: impl Into<String>) -> Self {
        QueryDescriptor {
            labels: vec![label.into()],
            ..Default::default()
        }
    }

    /// Additional label the node must carry
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Add `predicate`, joined to the previous one with OR
    pub fn or_filter(mut self, predicate: Predicate) -> Self {
        if let Some(last) = self.predicates.last_mut() {
            last.set_connector(super::predicate::Connector::Or);
        }
        self.predicates.push(predicate);
        self
    }

    pub fn order_by(mut self, column: impl Into<ColumnRef>, order: SortOrder) -> Self {
        self.order_by.push(SortKey {
            column: column.into(),
            order,
        });
        self
    }

    pub fn order_by_desc(self, column: impl Into<ColumnRef>) -> Self {
        self.order_by(column, SortOrder::Desc)
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Page `page` (1-based) of `per_page` rows
    pub fn paginate(self, page: u64, per_page: u64) -> Self {
        self.skip(page.saturating_sub(1) * per_page).limit(per_page)
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ColumnRef>,
    {
        self.projections
            .extend(columns.into_iter().map(|c| Projection::Column {
                column: c.into(),
                alias: None,
            }));
        self
    }

    pub fn select_as(mut self, column: impl Into<ColumnRef>, alias: impl Into<String>) -> Self {
        self.projections.push(Projection::Column {
            column: column.into(),
            alias: Some(alias.into()),
        });
        self
    }

    pub fn aggregate(mut self, function: AggregateFunction, column: Option<ColumnRef>, alias: Option<String>) -> Self {
        self.projections.push(Projection::Aggregate {
            function,
            column,
            alias,
        });
        self
    }

    pub fn count(self) -> Self {
        self.aggregate(AggregateFunction::Count, None, None)
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn exists(mut self) -> Self {
        self.exists = true;
        self
    }

    pub fn with(mut self, load: EagerLoad) -> Self {
        self.eager_loads.push(load);
        self
    }

    /// Bind a value for a `$name` placeholder referenced by a predicate
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bindings.insert(name.into(), value.into());
        self
    }

    pub fn has_aggregates(&self) -> bool {
        self.projections
            .iter()
            .any(|p| matches!(p, Projection::Aggregate { .. }))
    }
}
