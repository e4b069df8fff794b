//! # Driver Error Types
//!
//! Every backend failure is classified exactly once, when the `DriverError`
//! is built, into one of five kinds:
//!
//! - **Transient**: concurrent-modification conflicts, lock timeouts; safe to retry
//! - **Network**: broken or refused connections, timeouts; reconnect, then retry
//! - **Authentication**: bad credentials or expired authorization; never retried
//! - **ConstraintViolation**: uniqueness/existence constraints; never retried
//! - **Syntax**: invalid Cypher or anything unrecognised; never retried
//!
//! Neo4j reports a status code (`Neo.TransientError.Transaction.DeadlockDetected`),
//! Memgraph mostly reports a message, and transports report neither. Codes are
//! matched first, then messages, then the fallback applies: a coded error we do
//! not know is `Syntax`, an uncoded one is `Network`.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Network,
    Authentication,
    ConstraintViolation,
    Syntax,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Network)
    }

    pub fn requires_reconnect(self) -> bool {
        self == ErrorKind::Network
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Network => "network",
            ErrorKind::Authentication => "authentication",
            ErrorKind::ConstraintViolation => "constraint-violation",
            ErrorKind::Syntax => "syntax",
        };
        f.write_str(name)
    }
}

lazy_static::lazy_static! {
    /// Status-code prefixes, most specific first
    static ref CODE_RULES: Vec<(&'static str, ErrorKind)> = vec![
        ("Neo.ClientError.Schema.ConstraintValidationFailed", ErrorKind::ConstraintViolation),
        ("Neo.ClientError.Schema.ConstraintViolation", ErrorKind::ConstraintViolation),
        ("Neo.ClientError.Security.", ErrorKind::Authentication),
        ("Neo.ClientError.Cluster.NotALeader", ErrorKind::Network),
        ("Neo.ClientError.Transaction.LockClientStopped", ErrorKind::Transient),
        ("Neo.ClientError.Statement.", ErrorKind::Syntax),
        ("Neo.TransientError.", ErrorKind::Transient),
        ("Neo.DatabaseError.", ErrorKind::Syntax),
    ];

    /// Message patterns for backends that do not send precise codes
    static ref MESSAGE_RULES: Vec<(Regex, ErrorKind)> = vec![
        (rule(r"cannot resolve conflicting transactions|serialization error|deadlock|lock timeout|could not acquire lock"), ErrorKind::Transient),
        (rule(r"authentication failure|unauthorized|invalid credentials|access denied"), ErrorKind::Authentication),
        (rule(r"constraint violation|already exists with label|violates .*constraint"), ErrorKind::ConstraintViolation),
        (rule(r"connection (refused|reset|closed|aborted)|broken pipe|timed out|timeout|unreachable|dns error|end of file"), ErrorKind::Network),
        (rule(r"syntax error|invalid input|unknown function|variable .* not defined|mismatched input"), ErrorKind::Syntax),
    ];

    /// `(label, property)` out of constraint messages from Neo4j and Memgraph
    static ref CONSTRAINT_TARGETS: Vec<Regex> = vec![
        rule(r"label `([^`]+)` and propert(?:y|ies) `([^`]+)`"),
        rule(r":\s*`?(\w+)`?\s*\(\s*`?(\w+)`?"),
    ];
}

fn rule(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){}", pattern)).unwrap()
}

/// Classify a backend failure from its status code and message
pub fn classify(code: Option<&str>, message: &str) -> ErrorKind {
    if let Some(code) = code {
        if let Some((_, kind)) = CODE_RULES.iter().find(|(prefix, _)| code.starts_with(prefix)) {
            return *kind;
        }
    }
    if let Some((_, kind)) = MESSAGE_RULES.iter().find(|(re, _)| re.is_match(message)) {
        return *kind;
    }
    match code {
        Some(_) => ErrorKind::Syntax,
        None => ErrorKind::Network,
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind} error{}: {message}", .code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
pub struct DriverError {
    pub kind: ErrorKind,
    pub code: Option<String>,
    pub message: String,
    /// Position of the rejected statement when a batch failed
    pub statement_index: Option<usize>,
}

impl DriverError {
    /// Build and classify in one step
    pub fn new(code: Option<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let kind = classify(code.as_deref(), &message);
        DriverError {
            kind,
            code,
            message,
            statement_index: None,
        }
    }

    /// Error whose classification is already known
    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        DriverError {
            kind,
            code: None,
            message: message.into(),
            statement_index: None,
        }
    }

    pub fn at_statement(mut self, index: usize) -> Self {
        self.statement_index = Some(index);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Network, message)
    }

    pub fn timeout(after_ms: u64) -> Self {
        Self::network(format!("query timed out after {}ms", after_ms))
    }

    /// Operations a backend does not implement are caller mistakes
    pub fn unsupported(backend: &str, operation: &str) -> Self {
        Self::with_kind(
            ErrorKind::Syntax,
            format!("backend '{}' does not support {}", backend, operation),
        )
    }

    pub fn transaction_closed() -> Self {
        Self::with_kind(ErrorKind::Syntax, "transaction is no longer open")
    }

    /// `(label, property)` named by a constraint violation, when the message has them
    pub fn constraint_target(&self) -> Option<(String, String)> {
        if self.kind != ErrorKind::ConstraintViolation {
            return None;
        }
        CONSTRAINT_TARGETS.iter().find_map(|re| {
            re.captures(&self.message)
                .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        })
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PoolError {
    #[error("Connection pool exhausted: no connection available within {waited_ms}ms (max {max})")]
    Exhausted { max: usize, waited_ms: u64 },
    #[error("Connection pool is closed")]
    Closed,
    #[error("Failed to open connection: {0}")]
    Connect(#[from] DriverError),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("Unknown database_type '{name}' (registered: {available})")]
    UnknownBackend { name: String, available: String },
    #[error("Backend '{0}' is already registered")]
    DuplicateBackend(String),
}
