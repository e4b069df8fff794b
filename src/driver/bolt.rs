//! Neo4j and Memgraph over Bolt, through `neo4rs`
//!
//! Both servers speak the same protocol; they differ in how they report their
//! version and in which catalog queries they understand, which the backend
//! type passed to the factory selects. Each pooled connection owns a `Graph`
//! limited to one underlying socket.
use std::sync::Arc;

use async_trait::async_trait;
use neo4rs::{BoltList, BoltMap, BoltNull, BoltString, BoltType, ConfigBuilder, Graph, Query, Txn};
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::cypher_generator::statement::{CypherStatement, Params};

use super::capabilities::DriverCapabilities;
use super::errors::{DriverError, ErrorKind};
use super::result_set::{ResultSet, Row};
use super::{ConnectionConfig, DriverFactory, DriverTransaction, GraphDriver};

fn bolt_error(err: neo4rs::Error) -> DriverError {
    match err {
        neo4rs::Error::Neo4j(e) => DriverError::new(Some(e.code().to_string()), e.message()),
        neo4rs::Error::DeserializationError(e) => {
            DriverError::with_kind(ErrorKind::Syntax, format!("cannot decode row: {}", e))
        }
        other => DriverError::new(None, other.to_string()),
    }
}

/// JSON parameter to Bolt value
fn to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::Null(BoltNull),
        Value::Bool(b) => BoltType::from(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::from(i),
            None => BoltType::from(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => BoltType::from(s.clone()),
        Value::Array(items) => {
            BoltType::List(BoltList::from(items.iter().map(to_bolt).collect::<Vec<_>>()))
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, value) in map {
                bolt.put(BoltString::from(key.as_str()), to_bolt(value));
            }
            BoltType::Map(bolt)
        }
    }
}

fn to_query(statement: &CypherStatement) -> Query {
    statement
        .params
        .iter()
        .fold(neo4rs::query(&statement.text), |q, (name, value)| {
            q.param(name, to_bolt(value))
        })
}

fn to_row(row: neo4rs::Row) -> Result<Row, DriverError> {
    row.to::<Params>().map_err(|e| {
        DriverError::with_kind(ErrorKind::Syntax, format!("cannot decode row: {}", e))
    })
}

fn result_set(rows: Vec<Row>) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();
    ResultSet::new(columns, rows)
}

pub struct BoltDriver {
    backend_type: String,
    graph: Graph,
    capabilities: OnceCell<DriverCapabilities>,
}

impl BoltDriver {
    pub async fn connect(backend_type: &str, config: &ConnectionConfig) -> Result<Self, DriverError> {
        let mut builder = ConfigBuilder::default()
            .uri(config.address())
            .max_connections(1);
        if let Some(user) = &config.username {
            builder = builder.user(user.as_str());
        }
        if let Some(password) = &config.password {
            builder = builder.password(password.as_str());
        }
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let graph = Graph::connect(builder.build().map_err(bolt_error)?)
            .await
            .map_err(bolt_error)?;
        Ok(BoltDriver {
            backend_type: backend_type.to_string(),
            graph,
            capabilities: OnceCell::new(),
        })
    }

    async fn version(&self) -> Result<String, DriverError> {
        let text = if self.backend_type == "memgraph" {
            "SHOW VERSION"
        } else {
            "CALL dbms.components() YIELD versions RETURN versions[0] AS version"
        };
        let rs = self.execute_query(&CypherStatement::new(text)).await?;
        Ok(rs
            .scalar("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }
}

#[async_trait]
impl GraphDriver for BoltDriver {
    fn backend_type(&self) -> &str {
        &self.backend_type
    }

    async fn capabilities(&self) -> Result<DriverCapabilities, DriverError> {
        let caps = self
            .capabilities
            .get_or_try_init(|| async {
                let version = self.version().await?;
                Ok::<_, DriverError>(if self.backend_type == "memgraph" {
                    DriverCapabilities::memgraph(version)
                } else {
                    // Bolt pipelines statements but has no single-request batch
                    DriverCapabilities::neo4j(version, false)
                })
            })
            .await?;
        Ok(caps.clone())
    }

    async fn execute_query(&self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
        let mut stream = self.graph.execute(to_query(statement)).await.map_err(bolt_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await.map_err(bolt_error)? {
            rows.push(to_row(row)?);
        }
        Ok(result_set(rows))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn DriverTransaction>, DriverError> {
        let txn = self.graph.start_txn().await.map_err(bolt_error)?;
        Ok(Box::new(BoltTransaction { txn: Some(txn) }))
    }

    async fn ping(&self) -> bool {
        self.graph.run(neo4rs::query("RETURN 1")).await.is_ok()
    }
}

pub struct BoltTransaction {
    txn: Option<Txn>,
}

#[async_trait]
impl DriverTransaction for BoltTransaction {
    async fn run(&mut self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
        let txn = self.txn.as_mut().ok_or_else(DriverError::transaction_closed)?;
        let mut stream = txn.execute(to_query(statement)).await.map_err(bolt_error)?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next(txn.handle()).await.map_err(bolt_error)? {
            rows.push(to_row(row)?);
        }
        Ok(result_set(rows))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DriverError> {
        let txn = self.txn.take().ok_or_else(DriverError::transaction_closed)?;
        txn.commit().await.map_err(bolt_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DriverError> {
        match self.txn.take() {
            Some(txn) => txn.rollback().await.map_err(bolt_error),
            None => Ok(()),
        }
    }

    fn is_open(&self) -> bool {
        self.txn.is_some()
    }
}

pub struct BoltDriverFactory {
    backend_type: String,
}

impl BoltDriverFactory {
    pub fn new(backend_type: &str) -> Self {
        BoltDriverFactory {
            backend_type: backend_type.to_string(),
        }
    }
}

#[async_trait]
impl DriverFactory for BoltDriverFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn GraphDriver>, DriverError> {
        let driver = BoltDriver::connect(&self.backend_type, config).await?;
        Ok(Arc::new(driver))
    }
}
