//! # Surfaced Error Type
//!
//! `MapperError` is what every public operation returns. Backend failures are
//! wrapped as `MapperError::Database`, which always carries:
//!
//! - the statement that failed and its parameters
//! - the classification (`ErrorKind`) decided once by the driver layer
//! - how many attempts were made
//! - a hint derived from the classification, e.g.
//!   `retry exhausted after 3 attempts` or
//!   `unique constraint violated on User.email`
//!
//! A connection that cannot be opened becomes `Database` too, reported
//! against the statement that was waiting for it. Errors from compilation,
//! relationship planning, batch validation and the remaining pool failures
//! pass through unchanged; only the coordinator decides about retries.

use thiserror::Error;

use crate::batch::errors::BatchError;
use crate::config::ConfigError;
use crate::cypher_generator::errors::CypherGeneratorError;
use crate::cypher_generator::statement::CypherStatement;
use crate::driver::errors::{DriverError, ErrorKind, PoolError, RegistryError};
use crate::relationship::errors::RelationshipError;

#[derive(Debug, Error)]
pub enum MapperError {
    #[error("{source} (attempts: {attempts})\n  Statement: {statement}\n  Parameters: {}\n  Hint: {hint}", .statement.params_json())]
    Database {
        kind: ErrorKind,
        statement: CypherStatement,
        attempts: u32,
        hint: String,
        #[source]
        source: DriverError,
    },
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Compile(#[from] CypherGeneratorError),
    #[error(transparent)]
    Relationship(#[from] RelationshipError),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Invalid transaction state: {0}")]
    Transaction(String),
}

fn hint_for(source: &DriverError) -> String {
    match source.kind {
        ErrorKind::Transient => "transient conflict; safe to retry".to_string(),
        ErrorKind::Network => "connection problem; reconnect and retry".to_string(),
        ErrorKind::Authentication => {
            "authentication failed; check the configured username and password".to_string()
        }
        ErrorKind::ConstraintViolation => match source.constraint_target() {
            Some((label, property)) => {
                format!("unique constraint violated on {}.{}", label, property)
            }
            None => "constraint violated".to_string(),
        },
        ErrorKind::Syntax => {
            "backend rejected the statement; the query description is invalid".to_string()
        }
    }
}

impl MapperError {
    pub fn database(source: DriverError, statement: &CypherStatement, attempts: u32) -> Self {
        MapperError::Database {
            kind: source.kind,
            statement: statement.clone(),
            attempts,
            hint: hint_for(&source),
            source,
        }
    }

    /// A connection that could not be opened is reported against the
    /// statement waiting for it; other pool failures pass through
    pub fn acquire_failed(error: PoolError, pending: &CypherStatement, attempts: u32) -> Self {
        match error {
            PoolError::Connect(source) => MapperError::database(source, pending, attempts),
            other => MapperError::Pool(other),
        }
    }

    pub fn transaction_state(message: impl Into<String>) -> Self {
        MapperError::Transaction(message.into())
    }

    /// Classification of the underlying backend failure, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            MapperError::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Record the final attempt count; retryable failures that ran out of
    /// attempts get the exhaustion hint
    pub fn finalize(self, attempts: u32, max_attempts: u32) -> Self {
        match self {
            MapperError::Database {
                kind,
                statement,
                hint,
                source,
                ..
            } => {
                let hint = if kind.is_retryable() && max_attempts > 1 && attempts >= max_attempts {
                    format!("retry exhausted after {} attempts", attempts)
                } else {
                    hint
                };
                MapperError::Database {
                    kind,
                    statement,
                    attempts,
                    hint,
                    source,
                }
            }
            other => other,
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            MapperError::Database { hint, .. } => Some(hint),
            _ => None,
        }
    }

    pub fn statement(&self) -> Option<&CypherStatement> {
        match self {
            MapperError::Database { statement, .. } => Some(statement),
            _ => None,
        }
    }

    pub fn attempts(&self) -> Option<u32> {
        match self {
            MapperError::Database { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_hint_names_target() {
        let source = DriverError::new(
            Some("Neo.ClientError.Schema.ConstraintValidationFailed".to_string()),
            "Node(3) already exists with label `User` and property `email` = 'x'",
        );
        let stmt = CypherStatement::new("CREATE (n:User {email: $p0})").param("p0", "x");
        let err = MapperError::database(source, &stmt, 1);
        assert_eq!(err.hint(), Some("unique constraint violated on User.email"));
        let text = err.to_string();
        assert!(text.contains("Statement: CREATE (n:User {email: $p0})"));
        assert!(text.contains(r#"Parameters: {"p0":"x"}"#));
    }

    #[test]
    fn test_exhaustion_hint() {
        let source = DriverError::new(Some("Neo.TransientError.Transaction.DeadlockDetected".into()), "deadlock");
        let err = MapperError::database(source, &CypherStatement::new("MERGE (n)"), 3).finalize(3, 3);
        assert_eq!(err.hint(), Some("retry exhausted after 3 attempts"));
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(err.kind(), Some(ErrorKind::Transient));
    }

    #[test]
    fn test_fatal_errors_keep_their_hint() {
        let source = DriverError::new(Some("Neo.ClientError.Security.Unauthorized".into()), "bad credentials");
        let err = MapperError::database(source, &CypherStatement::new("RETURN 1"), 1).finalize(1, 3);
        assert!(err.hint().unwrap().starts_with("authentication failed"));
    }
}
