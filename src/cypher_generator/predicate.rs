/// Predicate model for query filters
///
/// A predicate is a single column condition, a parenthesized group of
/// predicates, or a raw caller-supplied fragment. Each carries the boolean
/// connector that joins it to the *next* sibling.
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use super::errors::CypherGeneratorError;
use super::statement::Params;

/// Boolean connector to the next sibling predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    pub fn keyword(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// Plain comparison, also used as the inner comparison of temporal operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Comparison {
    /// Cypher token for the comparison. Inequality is `<>`, not `!=`.
    pub fn token(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Neq => "<>",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
        }
    }
}

impl FromStr for Comparison {
    type Err = CypherGeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "=" | "==" | "eq" => Ok(Comparison::Eq),
            "!=" | "<>" | "neq" => Ok(Comparison::Neq),
            ">" | "gt" => Ok(Comparison::Gt),
            ">=" | "gte" => Ok(Comparison::Gte),
            "<" | "lt" => Ok(Comparison::Lt),
            "<=" | "lte" => Ok(Comparison::Lte),
            other => Err(CypherGeneratorError::UnknownOperator(other.to_string())),
        }
    }
}

/// Component extracted from a temporal value before comparing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalPart {
    Date,
    Year,
    Month,
    Day,
    Time,
}

impl TemporalPart {
    pub fn name(self) -> &'static str {
        match self {
            TemporalPart::Date => "date",
            TemporalPart::Year => "year",
            TemporalPart::Month => "month",
            TemporalPart::Day => "day",
            TemporalPart::Time => "time",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Like,
    NotLike,
    ILike,
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    Between,
    NotBetween,
    IsNull,
    NotNull,
    Temporal(TemporalPart, Comparison),
}

impl Operator {
    /// Operators that only test for the absence/presence of a value
    pub fn is_null_check(self) -> bool {
        matches!(self, Operator::IsNull | Operator::NotNull)
    }

    /// Negated operators get an explicit `IS NOT NULL` guard
    pub fn is_negated(self) -> bool {
        matches!(
            self,
            Operator::Neq | Operator::NotIn | Operator::NotLike | Operator::NotBetween
        )
    }

    pub fn comparison(self) -> Option<Comparison> {
        match self {
            Operator::Eq => Some(Comparison::Eq),
            Operator::Neq => Some(Comparison::Neq),
            Operator::Gt => Some(Comparison::Gt),
            Operator::Gte => Some(Comparison::Gte),
            Operator::Lt => Some(Comparison::Lt),
            Operator::Lte => Some(Comparison::Lte),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Eq => f.write_str("eq"),
            Operator::Neq => f.write_str("neq"),
            Operator::Gt => f.write_str("gt"),
            Operator::Gte => f.write_str("gte"),
            Operator::Lt => f.write_str("lt"),
            Operator::Lte => f.write_str("lte"),
            Operator::In => f.write_str("in"),
            Operator::NotIn => f.write_str("not_in"),
            Operator::Like => f.write_str("like"),
            Operator::NotLike => f.write_str("not_like"),
            Operator::ILike => f.write_str("ilike"),
            Operator::Contains => f.write_str("contains"),
            Operator::StartsWith => f.write_str("starts_with"),
            Operator::EndsWith => f.write_str("ends_with"),
            Operator::Regex => f.write_str("regex"),
            Operator::Between => f.write_str("between"),
            Operator::NotBetween => f.write_str("not_between"),
            Operator::IsNull => f.write_str("null"),
            Operator::NotNull => f.write_str("not_null"),
            Operator::Temporal(part, cmp) => write!(f, "{}{}", part.name(), cmp.token()),
        }
    }
}

impl FromStr for Operator {
    type Err = CypherGeneratorError;

    /// Accepts symbolic (`>=`, `<>`) and word forms (`gte`, `not in`).
    /// Anything else is a programmer error and fails immediately.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', " ");
        let op = match normalized.as_str() {
            "=" | "==" | "eq" => Operator::Eq,
            "!=" | "<>" | "neq" => Operator::Neq,
            ">" | "gt" => Operator::Gt,
            ">=" | "gte" => Operator::Gte,
            "<" | "lt" => Operator::Lt,
            "<=" | "lte" => Operator::Lte,
            "in" => Operator::In,
            "not in" => Operator::NotIn,
            "like" => Operator::Like,
            "not like" => Operator::NotLike,
            "ilike" => Operator::ILike,
            "contains" => Operator::Contains,
            "starts with" => Operator::StartsWith,
            "ends with" => Operator::EndsWith,
            "=~" | "regex" | "regexp" => Operator::Regex,
            "between" => Operator::Between,
            "not between" => Operator::NotBetween,
            "null" | "is null" => Operator::IsNull,
            "not null" | "is not null" => Operator::NotNull,
            "date" => Operator::Temporal(TemporalPart::Date, Comparison::Eq),
            "year" => Operator::Temporal(TemporalPart::Year, Comparison::Eq),
            "month" => Operator::Temporal(TemporalPart::Month, Comparison::Eq),
            "day" => Operator::Temporal(TemporalPart::Day, Comparison::Eq),
            "time" => Operator::Temporal(TemporalPart::Time, Comparison::Eq),
            _ => return Err(CypherGeneratorError::UnknownOperator(s.to_string())),
        };
        Ok(op)
    }
}

/// Reference to a property, optionally qualified with a pattern variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub alias: Option<String>,
    pub property: String,
}

impl ColumnRef {
    pub fn new(property: impl Into<String>) -> Self {
        ColumnRef {
            alias: None,
            property: property.into(),
        }
    }

    pub fn qualified(alias: impl Into<String>, property: impl Into<String>) -> Self {
        ColumnRef {
            alias: Some(alias.into()),
            property: property.into(),
        }
    }
}

/// `"age"` is unqualified, `"u.age"` is qualified with `u`
impl From<&str> for ColumnRef {
    fn from(s: &str) -> Self {
        match s.split_once('.') {
            Some((alias, property)) if !alias.is_empty() && !property.is_empty() => {
                ColumnRef::qualified(alias, property)
            }
            _ => ColumnRef::new(s),
        }
    }
}

impl From<String> for ColumnRef {
    fn from(s: String) -> Self {
        ColumnRef::from(s.as_str())
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}.{}", alias, self.property),
            None => f.write_str(&self.property),
        }
    }
}

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Bound as a fresh parameter
    Literal(Value),
    /// Refers to a parameter the caller binds under this name
    Parameter(String),
    /// Column-to-column comparison
    Column(ColumnRef),
    /// Inclusive bounds for between / not between
    Range(Value, Value),
    /// Null checks take no operand
    None,
}

impl Operand {
    pub fn is_null_literal(&self) -> bool {
        matches!(self, Operand::Literal(Value::Null))
    }
}

macro_rules! literal_operand_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Operand {
                fn from(value: $ty) -> Self {
                    Operand::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_operand_from!(i32, i64, u32, u64, f64, bool, &str, String, Value);

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Condition {
        column: ColumnRef,
        operator: Operator,
        operand: Operand,
        connector: Connector,
    },
    Group {
        predicates: Vec<Predicate>,
        negated: bool,
        connector: Connector,
    },
    Raw {
        fragment: String,
        bindings: Params,
        connector: Connector,
    },
}

impl Predicate {
    pub fn new(column: impl Into<ColumnRef>, operator: Operator, operand: impl Into<Operand>) -> Self {
        Predicate::Condition {
            column: column.into(),
            operator,
            operand: operand.into(),
            connector: Connector::And,
        }
    }

    /// Build from a textual operator (`"!="`, `"like"`, `"year"`, ...)
    pub fn parse(
        column: impl Into<ColumnRef>,
        operator: &str,
        operand: impl Into<Operand>,
    ) -> Result<Self, CypherGeneratorError> {
        Ok(Predicate::new(column, operator.parse()?, operand))
    }

    pub fn eq(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::new(column, Operator::Eq, Operand::Literal(value.into()))
    }

    pub fn neq(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::new(column, Operator::Neq, Operand::Literal(value.into()))
    }

    pub fn gt(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::new(column, Operator::Gt, Operand::Literal(value.into()))
    }

    pub fn gte(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::new(column, Operator::Gte, Operand::Literal(value.into()))
    }

    pub fn lt(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::new(column, Operator::Lt, Operand::Literal(value.into()))
    }

    pub fn lte(column: impl Into<ColumnRef>, value: impl Into<Value>) -> Self {
        Predicate::new(column, Operator::Lte, Operand::Literal(value.into()))
    }

    pub fn in_list<V: Into<Value>>(column: impl Into<ColumnRef>, values: Vec<V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Predicate::new(column, Operator::In, Operand::Literal(Value::Array(values)))
    }

    pub fn not_in<V: Into<Value>>(column: impl Into<ColumnRef>, values: Vec<V>) -> Self {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        Predicate::new(column, Operator::NotIn, Operand::Literal(Value::Array(values)))
    }

    pub fn like(column: impl Into<ColumnRef>, pattern: impl Into<String>) -> Self {
        Predicate::new(column, Operator::Like, Operand::Literal(Value::String(pattern.into())))
    }

    pub fn between(
        column: impl Into<ColumnRef>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Predicate::new(column, Operator::Between, Operand::Range(low.into(), high.into()))
    }

    pub fn is_null(column: impl Into<ColumnRef>) -> Self {
        Predicate::new(column, Operator::IsNull, Operand::None)
    }

    pub fn not_null(column: impl Into<ColumnRef>) -> Self {
        Predicate::new(column, Operator::NotNull, Operand::None)
    }

    pub fn temporal(
        column: impl Into<ColumnRef>,
        part: TemporalPart,
        comparison: Comparison,
        value: impl Into<Value>,
    ) -> Self {
        Predicate::new(
            column,
            Operator::Temporal(part, comparison),
            Operand::Literal(value.into()),
        )
    }

    pub fn column_eq(column: impl Into<ColumnRef>, other: impl Into<ColumnRef>) -> Self {
        Predicate::new(column, Operator::Eq, Operand::Column(other.into()))
    }

    pub fn group(predicates: Vec<Predicate>) -> Self {
        Predicate::Group {
            predicates,
            negated: false,
            connector: Connector::And,
        }
    }

    pub fn not_group(predicates: Vec<Predicate>) -> Self {
        Predicate::Group {
            predicates,
            negated: true,
            connector: Connector::And,
        }
    }

    /// Caller-supplied boolean fragment. `{alias}` in the text is replaced by
    /// the pattern variable at translation time.
    pub fn raw(fragment: impl Into<String>, bindings: Params) -> Self {
        Predicate::Raw {
            fragment: fragment.into(),
            bindings,
            connector: Connector::And,
        }
    }

    pub fn connector(&self) -> Connector {
        match self {
            Predicate::Condition { connector, .. }
            | Predicate::Group { connector, .. }
            | Predicate::Raw { connector, .. } => *connector,
        }
    }

    pub fn with_connector(mut self, next: Connector) -> Self {
        self.set_connector(next);
        self
    }

    pub fn set_connector(&mut self, next: Connector) {
        match self {
            Predicate::Condition { connector, .. }
            | Predicate::Group { connector, .. }
            | Predicate::Raw { connector, .. } => *connector = next,
        }
    }

    /// Join this predicate to the next one with OR
    pub fn or(self) -> Self {
        self.with_connector(Connector::Or)
    }

    /// Join this predicate to the next one with AND (the default)
    pub fn and(self) -> Self {
        self.with_connector(Connector::And)
    }
}
