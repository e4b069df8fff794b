//! Per-transaction state owned by the coordinator
//!
//! ```text
//! opened -> running -> committed
//!              |    -> rolled_back -> retrying -> opened (next attempt)
//!              `-> closed
//! ```
//!
//! The context keeps its pooled connection for its whole life, so every
//! statement of an attempt goes to the same server. `run` takes `&mut self`,
//! which keeps statements strictly sequential.
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::cypher_generator::statement::CypherStatement;
use crate::driver::errors::DriverError;
use crate::driver::pool::PooledConnection;
use crate::driver::result_set::ResultSet;
use crate::driver::DriverTransaction;

use super::errors::MapperError;
use super::routing::AccessMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Opened,
    Running,
    Retrying,
    Committed,
    RolledBack,
    Closed,
}

impl TransactionState {
    pub fn accepts_statements(self) -> bool {
        matches!(self, TransactionState::Opened | TransactionState::Running)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Opened => "opened",
            TransactionState::Running => "running",
            TransactionState::Retrying => "retrying",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled-back",
            TransactionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub struct TransactionContext {
    id: Uuid,
    mode: AccessMode,
    state: TransactionState,
    attempt: u32,
    query_timeout: Option<Duration>,
    connection: PooledConnection,
    handle: Option<Box<dyn DriverTransaction>>,
    statements_run: usize,
    last_statement: Option<CypherStatement>,
}

impl TransactionContext {
    pub(crate) fn open(
        connection: PooledConnection,
        handle: Box<dyn DriverTransaction>,
        mode: AccessMode,
        query_timeout: Option<Duration>,
    ) -> Self {
        let ctx = TransactionContext {
            id: Uuid::new_v4(),
            mode,
            state: TransactionState::Opened,
            attempt: 1,
            query_timeout,
            connection,
            handle: Some(handle),
            statements_run: 0,
            last_statement: None,
        };
        log::debug!("Transaction {} opened ({:?})", ctx.id, mode);
        ctx
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// 1-based, increases with every retry
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn statements_run(&self) -> usize {
        self.statements_run
    }

    pub fn last_statement(&self) -> Option<&CypherStatement> {
        self.last_statement.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.state.accepts_statements() && self.handle.as_ref().is_some_and(|h| h.is_open())
    }

    /// Backend type of the connection this transaction is bound to
    pub fn backend_type(&self) -> &str {
        self.connection.backend_type()
    }

    fn fail(&mut self, source: DriverError, statement: &CypherStatement) -> MapperError {
        if source.kind.requires_reconnect() {
            self.connection.mark_broken();
        }
        MapperError::database(source, statement, self.attempt)
    }

    pub async fn run(&mut self, statement: &CypherStatement) -> Result<ResultSet, MapperError> {
        if !self.state.accepts_statements() {
            return Err(MapperError::transaction_state(format!(
                "cannot run a statement in a {} transaction",
                self.state
            )));
        }
        let handle = self.handle.as_mut().ok_or_else(|| {
            MapperError::transaction_state("transaction handle already released")
        })?;
        self.state = TransactionState::Running;
        self.statements_run += 1;
        self.last_statement = Some(statement.clone());
        log::debug!("[tx {} attempt {}] {}", self.id, self.attempt, statement.text);

        let outcome = match self.query_timeout {
            Some(limit) => match tokio::time::timeout(limit, handle.run(statement)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(DriverError::timeout(limit.as_millis() as u64)),
            },
            None => handle.run(statement).await,
        };
        outcome.map_err(|e| self.fail(e, statement))
    }

    /// Run statements in order, stopping at the first failure
    pub async fn run_all(&mut self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, MapperError> {
        let mut results = Vec::with_capacity(statements.len());
        for statement in statements {
            results.push(self.run(statement).await?);
        }
        Ok(results)
    }

    pub(crate) async fn commit(&mut self) -> Result<(), MapperError> {
        let handle = self.handle.take().ok_or_else(|| {
            MapperError::transaction_state(format!("cannot commit a {} transaction", self.state))
        })?;
        match handle.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                log::debug!(
                    "Transaction {} committed after {} statement(s)",
                    self.id,
                    self.statements_run
                );
                Ok(())
            }
            Err(e) => {
                self.state = TransactionState::RolledBack;
                // report the statement whose effects failed to commit
                let statement = self
                    .last_statement
                    .clone()
                    .unwrap_or_else(|| CypherStatement::new("COMMIT"));
                Err(self.fail(e, &statement))
            }
        }
    }

    pub(crate) async fn rollback(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.rollback().await {
                log::warn!("Rollback of transaction {} failed: {}", self.id, e);
                if e.kind.requires_reconnect() {
                    self.connection.mark_broken();
                }
            }
        }
        self.state = TransactionState::RolledBack;
        log::debug!("Transaction {} rolled back", self.id);
    }

    pub(crate) fn mark_retrying(&mut self) {
        self.state = TransactionState::Retrying;
    }

    /// Next attempt on a fresh connection and backend transaction
    pub(crate) fn reopen(&mut self, connection: PooledConnection, handle: Box<dyn DriverTransaction>) {
        self.connection = connection;
        self.handle = Some(handle);
        self.attempt += 1;
        self.statements_run = 0;
        self.state = TransactionState::Opened;
        log::debug!("Transaction {} reopened for attempt {}", self.id, self.attempt);
    }

    pub(crate) fn close(&mut self) {
        self.handle = None;
        if !matches!(
            self.state,
            TransactionState::Committed | TransactionState::RolledBack
        ) {
            log::warn!("Transaction {} closed while {}", self.id, self.state);
        }
        self.state = TransactionState::Closed;
    }
}

/// A transaction the caller drives by hand: no automatic retry.
///
/// Dropping it without `commit` discards its writes.
pub struct ExplicitTransaction {
    ctx: TransactionContext,
}

impl ExplicitTransaction {
    pub(crate) fn new(ctx: TransactionContext) -> Self {
        ExplicitTransaction { ctx }
    }

    pub fn context(&self) -> &TransactionContext {
        &self.ctx
    }

    pub fn state(&self) -> TransactionState {
        self.ctx.state()
    }

    pub fn is_open(&self) -> bool {
        self.ctx.is_open()
    }

    pub async fn run(&mut self, statement: &CypherStatement) -> Result<ResultSet, MapperError> {
        self.ctx.run(statement).await
    }

    pub async fn commit(mut self) -> Result<(), MapperError> {
        let result = self.ctx.commit().await;
        self.ctx.close();
        result
    }

    pub async fn rollback(mut self) -> Result<(), MapperError> {
        self.ctx.rollback().await;
        self.ctx.close();
        Ok(())
    }
}

impl Drop for ExplicitTransaction {
    fn drop(&mut self) {
        if self.ctx.handle.is_some() {
            log::warn!(
                "Transaction {} dropped without commit or rollback; its writes are discarded",
                self.ctx.id
            );
        }
    }
}
