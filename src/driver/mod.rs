//! Driver abstraction layer
//!
//! The only contract the rest of the crate needs from a graph backend:
//! execute a statement, execute several, open a transaction, answer a ping,
//! and describe itself. Concrete backends register a `DriverFactory` under a
//! `database_type` name in the `DriverRegistry`.

pub mod capabilities;
pub mod errors;
pub mod http;
pub mod mock;
pub mod pool;
pub mod registry;
pub mod result_set;
pub mod schema;

#[cfg(feature = "bolt")]
pub mod bolt;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cypher_generator::statement::CypherStatement;

pub use capabilities::DriverCapabilities;
pub use errors::{DriverError, ErrorKind, PoolError, RegistryError};
pub use result_set::{Counters, ResultSet, ResultSummary, Row};
pub use schema::SchemaIntrospector;

/// One connection to a graph backend
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Registry name of the backend (`neo4j`, `memgraph`, `mock`, ...)
    fn backend_type(&self) -> &str;

    /// Cached after the first call
    async fn capabilities(&self) -> Result<DriverCapabilities, DriverError>;

    /// Run one statement in its own auto-commit transaction
    async fn execute_query(&self, statement: &CypherStatement) -> Result<ResultSet, DriverError>;

    /// Run statements atomically, returning one result per statement in order.
    ///
    /// Backends without a native batch request fall back to one transaction
    /// with sequential runs.
    async fn execute_batch(&self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, DriverError> {
        let mut tx = self.begin_transaction().await?;
        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            match tx.run(statement).await {
                Ok(rs) => results.push(rs),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        log::warn!("Rollback after failed batch statement failed: {}", rollback_err);
                    }
                    return Err(err.at_statement(index));
                }
            }
        }
        tx.commit().await?;
        Ok(results)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn DriverTransaction>, DriverError>;

    /// Cheap liveness check; never errors
    async fn ping(&self) -> bool;

    async fn close(&self) {}
}

impl dyn GraphDriver {
    pub fn schema_introspector(&self) -> SchemaIntrospector<'_> {
        SchemaIntrospector::new(self)
    }
}

/// An open backend transaction.
///
/// `run` takes `&mut self`, so statements inside one transaction can only
/// ever run one after another.
#[async_trait]
pub trait DriverTransaction: Send {
    async fn run(&mut self, statement: &CypherStatement) -> Result<ResultSet, DriverError>;

    async fn commit(self: Box<Self>) -> Result<(), DriverError>;

    async fn rollback(self: Box<Self>) -> Result<(), DriverError>;

    fn is_open(&self) -> bool;
}

/// Opens connections for one backend type
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn GraphDriver>, DriverError>;
}

/// Where and how to reach one server (the primary or a replica)
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub backend_type: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    /// Transport-level timeout for a single request
    pub request_timeout_ms: Option<u64>,
}

impl ConnectionConfig {
    pub fn new(backend_type: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        ConnectionConfig {
            backend_type: backend_type.into(),
            scheme: "http".to_string(),
            host: host.into(),
            port,
            username: None,
            password: None,
            database: None,
            request_timeout_ms: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Same credentials, another server
    pub fn for_address(&self, host: impl Into<String>, port: u16) -> Self {
        ConnectionConfig {
            host: host.into(),
            port,
            ..self.clone()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.address())
    }

    pub fn database_or_default(&self) -> &str {
        self.database.as_deref().unwrap_or("neo4j")
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend_type", &self.backend_type)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}
