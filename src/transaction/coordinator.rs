//! Transaction & retry coordinator
//!
//! The only component that retries. Managed work (`write`, `read`,
//! `execute`) runs inside a transaction; when an attempt fails with a
//! retryable classification the transaction is rolled back, the coordinator
//! sleeps for the policy's backoff, and the whole unit of work runs again in
//! a fresh transaction. Network failures also drop the connection so the
//! next attempt reconnects. Everything else propagates on the first failure.
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::config::MapperConfig;
use crate::cypher_generator::statement::CypherStatement;
use crate::driver::capabilities::DriverCapabilities;
use crate::driver::pool::{ConnectionPool, PooledConnection};
use crate::driver::registry::DriverRegistry;
use crate::driver::result_set::ResultSet;
use crate::driver::schema::SchemaSnapshot;
use crate::driver::errors::DriverError;
use crate::driver::DriverTransaction;

use super::context::{ExplicitTransaction, TransactionContext};
use super::errors::MapperError;
use super::retry::{RetryDecision, RetryPolicy};
use super::routing::{AccessMode, Router};

pub struct TransactionCoordinator {
    router: Router,
    retry: RetryPolicy,
    query_timeout: Option<Duration>,
}

impl TransactionCoordinator {
    pub fn new(router: Router, retry: RetryPolicy, query_timeout: Option<Duration>) -> Self {
        TransactionCoordinator {
            router,
            retry,
            query_timeout,
        }
    }

    /// Build pools for the primary and every replica, warming the primary.
    ///
    /// A replica that cannot be reached at startup is kept; its pool will
    /// try again on first use.
    pub async fn connect(config: &MapperConfig, registry: &DriverRegistry) -> Result<Self, MapperError> {
        let factory = registry.resolve(&config.database_type)?;
        let settings = config.pool_settings();

        let primary = ConnectionPool::new(factory.clone(), config.connection_config(), settings);
        primary.warm_up().await?;
        log::info!(
            "Connected to {} backend at {}",
            config.database_type,
            primary.config().address()
        );

        let mut replicas = Vec::new();
        for replica_config in config.replica_configs()? {
            let pool = ConnectionPool::new(factory.clone(), replica_config, settings);
            if let Err(e) = pool.warm_up().await {
                log::warn!("Replica {} not reachable yet: {}", pool.config().address(), e);
            }
            replicas.push(pool);
        }

        Ok(Self::new(
            Router::new(primary, replicas, config.read_preference),
            config.retry.clone(),
            config.query_timeout(),
        ))
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn capabilities(&self) -> Result<DriverCapabilities, MapperError> {
        Ok(self.router.primary().capabilities().await?)
    }

    pub async fn schema_snapshot(&self) -> Result<SchemaSnapshot, MapperError> {
        let pending = CypherStatement::new("-- schema introspection");
        let conn = self
            .router
            .primary()
            .acquire()
            .await
            .map_err(|e| MapperError::acquire_failed(e, &pending, 1))?;
        conn.schema_introspector()
            .snapshot()
            .await
            .map_err(|e| MapperError::database(e, &pending, 1))
    }

    /// Run `work` in a write transaction on the primary, retrying on
    /// transient and network failures.
    ///
    /// `work` may run more than once and must only touch the database through
    /// the context it is given.
    ///
    /// # Example
    /// ```ignore
    /// let affected = coordinator
    ///     .write(|tx| Box::pin(async move {
    ///         let rs = tx.run(&statement).await?;
    ///         Ok::<_, MapperError>(rs.affected())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn write<T, F>(&self, work: F) -> Result<T, MapperError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut TransactionContext) -> BoxFuture<'t, Result<T, MapperError>> + Send,
    {
        self.run_managed(AccessMode::Write, work).await
    }

    /// Like `write`, routed by the read preference
    pub async fn read<T, F>(&self, work: F) -> Result<T, MapperError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut TransactionContext) -> BoxFuture<'t, Result<T, MapperError>> + Send,
    {
        self.run_managed(AccessMode::Read, work).await
    }

    /// One statement in its own managed transaction
    pub async fn execute(&self, statement: &CypherStatement, mode: AccessMode) -> Result<ResultSet, MapperError> {
        self.run_managed(mode, |tx| {
            let statement = statement.clone();
            Box::pin(async move { tx.run(&statement).await })
        })
        .await
    }

    /// Open a transaction the caller commits or rolls back; never retried
    pub async fn begin(&self, mode: AccessMode) -> Result<ExplicitTransaction, MapperError> {
        let (conn, handle) = self.open(mode, 1).await?;
        Ok(ExplicitTransaction::new(TransactionContext::open(
            conn,
            handle,
            mode,
            self.query_timeout,
        )))
    }

    /// Statements in one backend request on the primary, retried as a unit
    pub async fn execute_batch(&self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, MapperError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.batch_attempt(statements, attempt).await {
                Ok(results) => return Ok(results),
                Err(err) => {
                    let delay = self.backoff(err, attempt)?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn batch_attempt(&self, statements: &[CypherStatement], attempt: u32) -> Result<Vec<ResultSet>, MapperError> {
        let mut conn = self
            .router
            .primary()
            .acquire()
            .await
            .map_err(|e| MapperError::acquire_failed(e, &batch_label(statements), attempt))?;
        let outcome = match self.query_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.execute_batch(statements))
                .await
                .unwrap_or_else(|_| Err(crate::driver::DriverError::timeout(limit.as_millis() as u64))),
            None => conn.execute_batch(statements).await,
        };
        outcome.map_err(|e| {
            if e.kind.requires_reconnect() {
                conn.mark_broken();
            }
            let reported = failed_batch_statement(statements, &e);
            MapperError::database(e, &reported, attempt)
        })
    }

    async fn open(
        &self,
        mode: AccessMode,
        attempt: u32,
    ) -> Result<(PooledConnection, Box<dyn DriverTransaction>), MapperError> {
        let mut conn = self
            .router
            .route(mode)
            .acquire()
            .await
            .map_err(|e| MapperError::acquire_failed(e, &CypherStatement::new("BEGIN"), attempt))?;
        match conn.begin_transaction().await {
            Ok(handle) => Ok((conn, handle)),
            Err(e) => {
                if e.kind.requires_reconnect() {
                    conn.mark_broken();
                }
                Err(MapperError::database(e, &CypherStatement::new("BEGIN"), attempt))
            }
        }
    }

    /// Delay before the next attempt, or the final error
    fn backoff(&self, err: MapperError, attempt: u32) -> Result<Duration, MapperError> {
        let decision = match err.kind() {
            Some(kind) => self.retry.decide(kind, attempt),
            None => RetryDecision::GiveUp,
        };
        match decision {
            RetryDecision::Retry(delay) => {
                log::warn!(
                    "Attempt {}/{} failed with a transient error, retrying in {:?}: {}",
                    attempt,
                    self.retry.max_attempts,
                    delay,
                    err
                );
                Ok(delay)
            }
            RetryDecision::Reconnect(delay) => {
                log::warn!(
                    "Attempt {}/{} lost its connection, reconnecting in {:?}: {}",
                    attempt,
                    self.retry.max_attempts,
                    delay,
                    err
                );
                Ok(delay)
            }
            RetryDecision::GiveUp => Err(err.finalize(attempt, self.retry.max_attempts)),
        }
    }

    async fn run_managed<T, F>(&self, mode: AccessMode, mut work: F) -> Result<T, MapperError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut TransactionContext) -> BoxFuture<'t, Result<T, MapperError>> + Send,
    {
        let mut slot: Option<TransactionContext> = None;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.run_attempt(mode, attempt, &mut slot, &mut work).await {
                Ok(value) => {
                    if let Some(ctx) = slot.as_mut() {
                        ctx.close();
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };
            match self.backoff(err, attempt) {
                Ok(delay) => {
                    if let Some(ctx) = slot.as_mut() {
                        ctx.mark_retrying();
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if let Some(ctx) = slot.as_mut() {
                        ctx.close();
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn run_attempt<T, F>(
        &self,
        mode: AccessMode,
        attempt: u32,
        slot: &mut Option<TransactionContext>,
        work: &mut F,
    ) -> Result<T, MapperError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut TransactionContext) -> BoxFuture<'t, Result<T, MapperError>> + Send,
    {
        let (conn, handle) = self.open(mode, attempt).await?;
        let ctx = match slot.take() {
            Some(mut ctx) => {
                ctx.reopen(conn, handle);
                ctx
            }
            None => TransactionContext::open(conn, handle, mode, self.query_timeout),
        };
        let ctx = slot.insert(ctx);

        match work(&mut *ctx).await {
            Ok(value) => {
                ctx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                ctx.rollback().await;
                Err(err)
            }
        }
    }
}

/// The statement a batch failure is reported against: the one the backend
/// rejected when it names it, else a stand-in for the whole batch
fn failed_batch_statement(statements: &[CypherStatement], error: &DriverError) -> CypherStatement {
    match error.statement_index.and_then(|i| statements.get(i).map(|s| (i, s))) {
        Some((index, failed)) => CypherStatement::with_params(
            format!(
                "-- batch statement [{}] of {}: {}",
                index,
                statements.len(),
                failed.text
            ),
            failed.params.clone(),
        ),
        None => batch_label(statements),
    }
}

fn batch_label(statements: &[CypherStatement]) -> CypherStatement {
    match statements.first() {
        Some(first) => CypherStatement::with_params(
            format!(
                "-- batch of {} statement(s), first: {}",
                statements.len(),
                first.text
            ),
            first.params.clone(),
        ),
        None => CypherStatement::new("-- empty batch"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::errors::{DriverError, ErrorKind};
    use crate::driver::mock::{MockBackend, COMMIT_MARKER};
    use crate::driver::pool::PoolSettings;
    use crate::driver::{ConnectionConfig, DriverFactory, GraphDriver};
    use crate::transaction::context::TransactionState;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn coordinator(backend: &MockBackend, max_attempts: u32) -> TransactionCoordinator {
        let pool = ConnectionPool::new(
            Arc::new(backend.factory()),
            ConnectionConfig::new("mock", "localhost", 7474),
            PoolSettings::default(),
        );
        let retry = RetryPolicy {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            multiplier: 2.0,
            jitter: 0.0,
        };
        TransactionCoordinator::new(Router::single(pool), retry, None)
    }

    fn deadlock() -> DriverError {
        DriverError::new(
            Some("Neo.TransientError.Transaction.DeadlockDetected".to_string()),
            "deadlock detected",
        )
    }

    #[tokio::test]
    async fn test_transient_failure_is_invisible_to_caller() {
        let backend = MockBackend::new();
        backend.fail_once("MERGE", deadlock());
        let coordinator = coordinator(&backend, 3);
        let attempts = AtomicU32::new(0);

        let affected = coordinator
            .write(|tx| {
                attempts.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    let rs = tx
                        .run(&CypherStatement::new("MERGE (n:Tag {name: 'x'}) RETURN count(n) AS affected"))
                        .await?;
                    assert_eq!(tx.state(), TransactionState::Running);
                    Ok::<_, MapperError>(rs.affected())
                })
            })
            .await
            .unwrap();

        assert_eq!(affected, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(backend.committed_matching("MERGE"), 1);
        assert_eq!(backend.rollbacks(), 1);
    }

    #[tokio::test]
    async fn test_constraint_violation_is_not_retried() {
        let backend = MockBackend::new();
        backend.fail_always(
            "CREATE",
            DriverError::new(
                Some("Neo.ClientError.Schema.ConstraintValidationFailed".to_string()),
                "Node(1) already exists with label `User` and property `email` = 'a'",
            ),
        );
        let coordinator = coordinator(&backend, 3);
        let err = coordinator
            .execute(&CypherStatement::new("CREATE (n:User {email: 'a'})"), AccessMode::Write)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::ConstraintViolation));
        assert_eq!(err.attempts(), Some(1));
        assert_eq!(err.hint(), Some("unique constraint violated on User.email"));
        assert_eq!(backend.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_reports_attempts() {
        let backend = MockBackend::new();
        backend.fail_always("MERGE", deadlock());
        let coordinator = coordinator(&backend, 3);
        let err = coordinator
            .execute(&CypherStatement::new("MERGE (n)"), AccessMode::Write)
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), Some(3));
        assert_eq!(err.hint(), Some("retry exhausted after 3 attempts"));
        assert_eq!(err.statement().unwrap().text, "MERGE (n)");
        assert!(backend.committed().is_empty());
    }

    #[tokio::test]
    async fn test_commit_failure_reports_last_statement() {
        let backend = MockBackend::new();
        backend.fail_once(
            COMMIT_MARKER,
            DriverError::new(
                Some("Neo.ClientError.Schema.ConstraintValidationFailed".to_string()),
                "Node(4) already exists with label `User` and property `email` = 'b'",
            ),
        );
        let coordinator = coordinator(&backend, 3);
        let statement = CypherStatement::new("CREATE (n:User {email: $email})").param("email", "b");

        let err = coordinator.execute(&statement, AccessMode::Write).await.unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::ConstraintViolation));
        assert_eq!(err.statement(), Some(&statement));
        assert_eq!(err.hint(), Some("unique constraint violated on User.email"));
        assert!(backend.committed().is_empty());
    }

    #[tokio::test]
    async fn test_batch_failure_names_rejected_statement() {
        let backend = MockBackend::new();
        backend.fail_always(
            "p.slot = 2",
            DriverError::new(Some("Neo.ClientError.Statement.TypeError".to_string()), "bad sku"),
        );
        let coordinator = coordinator(&backend, 3);
        let statements: Vec<CypherStatement> = (0..4)
            .map(|i| {
                CypherStatement::new(format!("MERGE (p:Product {{sku: $sku}}) SET p.slot = {}", i))
                    .param("sku", format!("sku-{}", i))
            })
            .collect();

        let err = coordinator.execute_batch(&statements).await.unwrap_err();

        let reported = err.statement().unwrap();
        assert_eq!(reported.params, statements[2].params);
        assert!(reported.text.contains("[2] of 4"), "{}", reported.text);
        assert!(reported.text.ends_with("SET p.slot = 2"));
        assert!(err.to_string().contains("\"sku\":\"sku-2\""));
    }

    #[tokio::test]
    async fn test_network_failure_reconnects() {
        let backend = MockBackend::new();
        backend.fail_once("MATCH", DriverError::network("connection reset by peer"));
        let coordinator = coordinator(&backend, 3);
        coordinator
            .execute(&CypherStatement::new("MATCH (n) RETURN n"), AccessMode::Read)
            .await
            .unwrap();
        assert_eq!(backend.connects(), 2);
    }

    #[tokio::test]
    async fn test_refused_connection_reports_pending_statement() {
        let backend = MockBackend::new();
        backend.fail_connects(5);
        let coordinator = coordinator(&backend, 2);
        let err = coordinator
            .execute(&CypherStatement::new("MATCH (n) RETURN n"), AccessMode::Read)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), Some(ErrorKind::Network));
        assert_eq!(err.statement().map(|s| s.text.as_str()), Some("BEGIN"));
        assert_eq!(err.attempts(), Some(2));
        assert_eq!(err.hint(), Some("retry exhausted after 2 attempts"));

        let statements = vec![CypherStatement::new("CREATE (a)"), CypherStatement::new("CREATE (b)")];
        let err = coordinator.execute_batch(&statements).await.unwrap_err();
        assert!(err.statement().unwrap().text.ends_with("first: CREATE (a)"));
    }

    #[tokio::test]
    async fn test_explicit_transaction_is_not_retried() {
        let backend = MockBackend::new();
        backend.fail_once("MERGE", deadlock());
        let coordinator = coordinator(&backend, 3);
        let mut tx = coordinator.begin(AccessMode::Write).await.unwrap();
        assert!(tx.run(&CypherStatement::new("MERGE (n)")).await.is_err());
        tx.rollback().await.unwrap();
        assert_eq!(backend.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_query_timeout_is_a_network_error() {
        let backend = MockBackend::new();
        let pool = ConnectionPool::new(
            Arc::new(SlowFactory(backend.clone())),
            ConnectionConfig::new("mock", "localhost", 7474),
            PoolSettings::default(),
        );
        let coordinator = TransactionCoordinator::new(
            Router::single(pool),
            RetryPolicy::none(),
            Some(Duration::from_millis(10)),
        );
        let err = coordinator
            .execute(&CypherStatement::new("MATCH (n) RETURN n"), AccessMode::Read)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::Network));
    }

    /// Factory whose transactions never answer in time
    struct SlowFactory(MockBackend);

    struct SlowTransaction;

    #[async_trait::async_trait]
    impl DriverTransaction for SlowTransaction {
        async fn run(&mut self, _statement: &CypherStatement) -> Result<ResultSet, DriverError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ResultSet::empty())
        }

        async fn commit(self: Box<Self>) -> Result<(), DriverError> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
            Ok(())
        }

        fn is_open(&self) -> bool {
            true
        }
    }

    struct SlowDriver(crate::driver::mock::MockDriver);

    #[async_trait::async_trait]
    impl GraphDriver for SlowDriver {
        fn backend_type(&self) -> &str {
            self.0.backend_type()
        }

        async fn capabilities(&self) -> Result<DriverCapabilities, DriverError> {
            self.0.capabilities().await
        }

        async fn execute_query(&self, statement: &CypherStatement) -> Result<ResultSet, DriverError> {
            self.0.execute_query(statement).await
        }

        async fn begin_transaction(&self) -> Result<Box<dyn DriverTransaction>, DriverError> {
            Ok(Box::new(SlowTransaction))
        }

        async fn ping(&self) -> bool {
            true
        }
    }

    #[async_trait::async_trait]
    impl DriverFactory for SlowFactory {
        async fn connect(
            &self,
            _config: &ConnectionConfig,
        ) -> Result<Arc<dyn GraphDriver>, DriverError> {
            Ok(Arc::new(SlowDriver(self.0.driver())))
        }
    }
}
