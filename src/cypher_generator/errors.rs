use thiserror::Error;

/// Compilation failures are programmer errors in the query description.
/// They are raised before anything reaches a backend and are never retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CypherGeneratorError {
    #[error("Unknown predicate operator '{0}'")]
    UnknownOperator(String),
    #[error("Operator '{operator}' on '{column}' cannot compare against NULL (use is_null / not_null)")]
    NullComparison { column: String, operator: String },
    #[error("Invalid operand for '{operator}' on '{column}': {reason}")]
    InvalidOperand {
        column: String,
        operator: String,
        reason: String,
    },
    #[error("Predicate group is empty (groups must contain at least one predicate)")]
    EmptyPredicateGroup,
    #[error("Query has no target label")]
    MissingLabel,
    #[error("Invalid variable name '{0}' (must be a plain identifier)")]
    InvalidAlias(String),
    #[error("Invalid parameter name '{0}' (alphanumeric or underscore only)")]
    InvalidParameterName(String),
    #[error("Parameter '{0}' is bound twice in the same statement")]
    DuplicateParameter(String),
    #[error("Eager load '{relation}' cannot be compiled: {reason}")]
    InvalidEagerLoad { relation: String, reason: String },
}

/// Helper for creating operand errors with context
impl CypherGeneratorError {
    pub fn invalid_operand(
        column: impl Into<String>,
        operator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CypherGeneratorError::InvalidOperand {
            column: column.into(),
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub fn eager_load_with_context(relation: impl Into<String>, reason: impl Into<String>) -> Self {
        CypherGeneratorError::InvalidEagerLoad {
            relation: relation.into(),
            reason: reason.into(),
        }
    }
}
