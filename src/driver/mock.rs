//! In-process backend for tests and dry runs
//!
//! `MockBackend` is the shared state; every `MockDriver` handed out by its
//! factory talks to the same state, the way pooled connections talk to one
//! server. Statements get scripted responses (first matching substring wins),
//! faults can be injected by substring, and writes land in a committed
//! journal only when their transaction commits.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::cypher_generator::statement::CypherStatement;

use super::capabilities::DriverCapabilities;
use super::errors::DriverError;
use super::pool::{ConnectionPool, PoolSettings};
use super::result_set::ResultSet;
use super::{ConnectionConfig, DriverFactory, DriverTransaction, GraphDriver};

pub type Responder = Arc<dyn Fn(&CypherStatement) -> Option<ResultSet> + Send + Sync>;

/// Pseudo statement text that matches commit faults
pub const COMMIT_MARKER: &str = "COMMIT";

struct Fault {
    pattern: String,
    error: DriverError,
    /// `None` fails forever
    remaining: Option<usize>,
}

struct MockState {
    capabilities: DriverCapabilities,
    responses: Vec<(String, ResultSet)>,
    responder: Option<Responder>,
    faults: Vec<Fault>,
    executed: Vec<CypherStatement>,
    committed: Vec<CypherStatement>,
    round_trips: usize,
    commits: usize,
    rollbacks: usize,
    connects: usize,
    failing_connects: usize,
    healthy: bool,
}

#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_backend_type("mock")
    }

    /// Mock that introspects and reports itself as `backend_type`
    pub fn with_backend_type(backend_type: &str) -> Self {
        let capabilities = DriverCapabilities {
            backend_type: backend_type.to_string(),
            version: "mock-1.0".to_string(),
            supports_batch: true,
            supports_schema_introspection: true,
            supports_json_collections: true,
            supports_transactions: true,
            supports_multiple_databases: false,
        };
        MockBackend {
            state: Arc::new(Mutex::new(MockState {
                capabilities,
                responses: Vec::new(),
                responder: None,
                faults: Vec::new(),
                executed: Vec::new(),
                committed: Vec::new(),
                round_trips: 0,
                commits: 0,
                rollbacks: 0,
                connects: 0,
                failing_connects: 0,
                healthy: true,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_capabilities(&self, capabilities: DriverCapabilities) {
        self.lock().capabilities = capabilities;
    }

    pub fn set_batch_support(&self, supported: bool) {
        self.lock().capabilities.supports_batch = supported;
    }

    /// Scripted result for statements containing `pattern`
    pub fn respond_to(&self, pattern: &str, result: ResultSet) {
        self.lock().responses.push((pattern.to_string(), result));
    }

    /// Computed responses; consulted before scripted ones
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&CypherStatement) -> Option<ResultSet> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
    }

    /// Fail the next `times` statements containing `pattern`
    pub fn fail_times(&self, pattern: &str, error: DriverError, times: usize) {
        self.lock().faults.push(Fault {
            pattern: pattern.to_string(),
            error,
            remaining: Some(times),
        });
    }

    pub fn fail_once(&self, pattern: &str, error: DriverError) {
        self.fail_times(pattern, error, 1);
    }

    pub fn fail_always(&self, pattern: &str, error: DriverError) {
        self.lock().faults.push(Fault {
            pattern: pattern.to_string(),
            error,
            remaining: None,
        });
    }

    pub fn clear_faults(&self) {
        self.lock().faults.clear();
    }

    /// Refuse the next `times` connection attempts
    pub fn fail_connects(&self, times: usize) {
        self.lock().failing_connects = times;
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.lock().healthy = healthy;
    }

    pub fn driver(&self) -> MockDriver {
        let backend_type = self.lock().capabilities.backend_type.clone();
        MockDriver {
            backend: self.clone(),
            backend_type,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn factory(&self) -> MockFactory {
        MockFactory {
            backend: self.clone(),
        }
    }

    /// Pool over this backend with default settings
    pub fn pool(&self) -> ConnectionPool {
        ConnectionPool::new(
            Arc::new(self.factory()),
            ConnectionConfig::new("mock", "localhost", 7474),
            PoolSettings::default(),
        )
    }

    /// Every statement that reached the backend, committed or not
    pub fn executed(&self) -> Vec<CypherStatement> {
        self.lock().executed.clone()
    }

    pub fn committed(&self) -> Vec<CypherStatement> {
        self.lock().committed.clone()
    }

    pub fn committed_matching(&self, pattern: &str) -> usize {
        self.lock()
            .committed
            .iter()
            .filter(|s| s.text.contains(pattern))
            .count()
    }

    /// Statement-carrying requests sent so far
    pub fn round_trips(&self) -> usize {
        self.lock().round_trips
    }

    pub fn commits(&self) -> usize {
        self.lock().commits
    }

    pub fn rollbacks(&self) -> usize {
        self.lock().rollbacks
    }

    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    fn capabilities(&self) -> DriverCapabilities {
        self.lock().capabilities.clone()
    }

    fn take_fault(state: &mut MockState, text: &str) -> Option<DriverError> {
        let fault = state
            .faults
            .iter_mut()
            .find(|f| text.contains(&f.pattern) && f.remaining != Some(0))?;
        if let Some(remaining) = fault.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(fault.error.clone())
    }

    /// Resolve one statement without touching the journals
    fn respond(&self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
        let responder = {
            let mut state = self.lock();
            state.executed.push(statement.clone());
            if let Some(err) = Self::take_fault(&mut state, &statement.text) {
                return Err(err);
            }
            state.responder.clone()
        };
        if let Some(result) = responder.and_then(|r| r(statement)) {
            return Ok(result);
        }
        let state = self.lock();
        if let Some((_, result)) = state
            .responses
            .iter()
            .find(|(pattern, _)| statement.text.contains(pattern.as_str()))
        {
            return Ok(result.clone());
        }
        Ok(default_response(statement))
    }
}

/// Mutations report one affected element; everything else is empty
fn default_response(statement: &CypherStatement) -> ResultSet {
    if statement.text.contains(" AS affected") {
        ResultSet::single("affected", serde_json::json!(1))
    } else {
        ResultSet::empty()
    }
}

pub struct MockDriver {
    backend: MockBackend,
    backend_type: String,
    closed: Arc<AtomicBool>,
}

impl MockDriver {
    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }

    fn check_open(&self) -> Result<(), DriverError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(DriverError::network("connection closed"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GraphDriver for MockDriver {
    fn backend_type(&self) -> &str {
        &self.backend_type
    }

    async fn capabilities(&self) -> Result<DriverCapabilities, DriverError> {
        Ok(self.backend.capabilities())
    }

    async fn execute_query(&self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
        self.check_open()?;
        self.backend.lock().round_trips += 1;
        let result = self.backend.respond(statement)?;
        let mut state = self.backend.lock();
        state.committed.push(statement.clone());
        state.commits += 1;
        Ok(result)
    }

    async fn execute_batch(&self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, DriverError> {
        self.check_open()?;
        if !self.backend.capabilities().supports_batch {
            let mut tx = self.begin_transaction().await?;
            let mut results = Vec::with_capacity(statements.len());
            for (index, statement) in statements.iter().enumerate() {
                match tx.run(statement).await {
                    Ok(rs) => results.push(rs),
                    Err(err) => {
                        tx.rollback().await?;
                        return Err(err.at_statement(index));
                    }
                }
            }
            tx.commit().await?;
            return Ok(results);
        }

        self.backend.lock().round_trips += 1;
        let mut results = Vec::with_capacity(statements.len());
        for (index, statement) in statements.iter().enumerate() {
            match self.backend.respond(statement) {
                Ok(rs) => results.push(rs),
                Err(err) => {
                    self.backend.lock().rollbacks += 1;
                    return Err(err.at_statement(index));
                }
            }
        }
        let mut state = self.backend.lock();
        state.committed.extend(statements.iter().cloned());
        state.commits += 1;
        Ok(results)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn DriverTransaction>, DriverError> {
        self.check_open()?;
        Ok(Box::new(MockTransaction {
            backend: self.backend.clone(),
            staged: Vec::new(),
            open: true,
        }))
    }

    async fn ping(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.backend.lock().healthy
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub struct MockTransaction {
    backend: MockBackend,
    staged: Vec<CypherStatement>,
    open: bool,
}

#[async_trait]
impl DriverTransaction for MockTransaction {
    async fn run(&mut self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
        if !self.open {
            return Err(DriverError::transaction_closed());
        }
        self.backend.lock().round_trips += 1;
        let result = self.backend.respond(statement)?;
        self.staged.push(statement.clone());
        Ok(result)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DriverError> {
        if !self.open {
            return Err(DriverError::transaction_closed());
        }
        self.open = false;
        let mut state = self.backend.lock();
        if let Some(err) = MockBackend::take_fault(&mut state, COMMIT_MARKER) {
            state.rollbacks += 1;
            return Err(err);
        }
        state.committed.append(&mut self.staged);
        state.commits += 1;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DriverError> {
        self.open = false;
        self.staged.clear();
        self.backend.lock().rollbacks += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[derive(Clone)]
pub struct MockFactory {
    backend: MockBackend,
}

impl MockFactory {
    pub fn new(backend: MockBackend) -> Self {
        MockFactory { backend }
    }
}

#[async_trait]
impl DriverFactory for MockFactory {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn GraphDriver>, DriverError> {
        {
            let mut state = self.backend.lock();
            state.connects += 1;
            if state.failing_connects > 0 {
                state.failing_connects -= 1;
                return Err(DriverError::network(format!(
                    "connection refused by {}",
                    config.address()
                )));
            }
        }
        log::debug!("Mock connection opened for {}", config.address());
        Ok(Arc::new(self.backend.driver()))
    }
}
