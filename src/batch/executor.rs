//! Batch statement executor
//!
//! Collapses independent write statements into as few round trips as the
//! backend allows. Every statement is checked before anything is sent; a
//! single unbindable parameter rejects the whole batch.
//!
//! Statements are split into chunks of `batch_size`. Each chunk is atomic:
//! it is sent as one backend request when the backend supports it, or run
//! statement by statement inside one managed transaction otherwise. Results
//! come back in statement order, `results[i]` belonging to `statements[i]`.
use std::sync::Arc;

use crate::cypher_generator::statement::CypherStatement;
use crate::driver::result_set::ResultSet;
use crate::transaction::coordinator::TransactionCoordinator;
use crate::transaction::errors::MapperError;

use super::errors::BatchError;
use super::param_validation::validate_statements;

pub struct BatchExecutor {
    coordinator: Arc<TransactionCoordinator>,
    batch_size: usize,
    enabled: bool,
}

impl BatchExecutor {
    pub fn new(coordinator: Arc<TransactionCoordinator>, batch_size: usize, enabled: bool) -> Result<Self, BatchError> {
        if batch_size == 0 {
            return Err(BatchError::InvalidBatchSize);
        }
        Ok(BatchExecutor {
            coordinator,
            batch_size,
            enabled,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn execute_batch(&self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, MapperError> {
        validate_statements(statements)?;
        if statements.is_empty() {
            return Ok(Vec::new());
        }

        let native = self.enabled && self.coordinator.capabilities().await?.supports_batch;
        log::debug!(
            "Executing {} statement(s) in chunks of {} ({})",
            statements.len(),
            self.batch_size,
            if native { "single request per chunk" } else { "one transaction per chunk" }
        );

        let mut results = Vec::with_capacity(statements.len());
        for chunk in statements.chunks(self.batch_size) {
            let chunk_results = if native {
                self.coordinator.execute_batch(chunk).await?
            } else {
                self.run_sequential(chunk).await?
            };
            if chunk_results.len() != chunk.len() {
                return Err(BatchError::ResultCountMismatch {
                    expected: chunk.len(),
                    received: chunk_results.len(),
                }
                .into());
            }
            results.extend(chunk_results);
        }
        Ok(results)
    }

    async fn run_sequential(&self, chunk: &[CypherStatement]) -> Result<Vec<ResultSet>, MapperError> {
        self.coordinator
            .write(|tx| {
                let statements = chunk.to_vec();
                Box::pin(async move { tx.run_all(&statements).await })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::errors::DriverError;
    use crate::driver::mock::MockBackend;
    use crate::transaction::retry::RetryPolicy;
    use crate::transaction::routing::{AccessMode, Router};
    use serde_json::json;

    fn coordinator(backend: &MockBackend) -> Arc<TransactionCoordinator> {
        Arc::new(TransactionCoordinator::new(
            Router::single(backend.pool()),
            RetryPolicy::default().without_jitter(),
            None,
        ))
    }

    fn statements(n: usize) -> Vec<CypherStatement> {
        (0..n)
            .map(|i| {
                CypherStatement::new(format!("CREATE (n:Item {{seq: $p0}}) RETURN n.seq AS seq, {} AS affected", i))
                    .param("p0", i as i64)
            })
            .collect()
    }

    fn echo_seq(backend: &MockBackend) {
        backend.set_responder(|stmt| {
            stmt.params
                .get("p0")
                .map(|v| ResultSet::single("seq", v.clone()))
        });
    }

    #[tokio::test]
    async fn test_one_round_trip_per_chunk() {
        let backend = MockBackend::new();
        backend.set_batch_support(true);
        echo_seq(&backend);
        let executor = BatchExecutor::new(coordinator(&backend), 4, true).unwrap();

        let results = executor.execute_batch(&statements(10)).await.unwrap();

        assert_eq!(results.len(), 10);
        for (i, rs) in results.iter().enumerate() {
            assert_eq!(rs.scalar("seq"), Some(&json!(i)));
        }
        // 3 chunks, plus nothing else: capabilities do not cost a round trip
        assert_eq!(backend.round_trips(), 3);
        assert_eq!(backend.committed().len(), 10);
    }

    #[tokio::test]
    async fn test_matches_individual_execution() {
        let backend = MockBackend::new();
        backend.set_batch_support(true);
        echo_seq(&backend);
        let coordinator = coordinator(&backend);
        let executor = BatchExecutor::new(coordinator.clone(), 100, true).unwrap();
        let stmts = statements(5);

        let batched = executor.execute_batch(&stmts).await.unwrap();
        let mut individual = Vec::new();
        for stmt in &stmts {
            individual.push(coordinator.execute(stmt, AccessMode::Write).await.unwrap());
        }
        assert_eq!(batched, individual);
    }

    #[tokio::test]
    async fn test_falls_back_to_transaction_without_batch_support() {
        let backend = MockBackend::new();
        backend.set_batch_support(false);
        let executor = BatchExecutor::new(coordinator(&backend), 10, true).unwrap();

        let results = executor.execute_batch(&statements(3)).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(backend.commits(), 1);
        assert_eq!(backend.round_trips(), 3);
    }

    #[tokio::test]
    async fn test_failed_chunk_is_atomic() {
        let backend = MockBackend::new();
        backend.set_batch_support(false);
        backend.fail_always(
            "seq: $p0}) RETURN n.seq AS seq, 2 AS",
            DriverError::new(Some("Neo.ClientError.Statement.SyntaxError".into()), "bad"),
        );
        let executor = BatchExecutor::new(coordinator(&backend), 10, false).unwrap();

        assert!(executor.execute_batch(&statements(4)).await.is_err());
        assert!(backend.committed().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_nested_params_before_sending() {
        let backend = MockBackend::new();
        let executor = BatchExecutor::new(coordinator(&backend), 10, true).unwrap();
        let mut stmts = statements(2);
        stmts.push(CypherStatement::new("CREATE (n:Item {meta: $p0})").param("p0", json!({"k": "v"})));

        let err = executor.execute_batch(&stmts).await.unwrap_err();
        assert!(matches!(
            err,
            MapperError::Batch(BatchError::UnbindableParameter { index: 2, .. })
        ));
        assert!(backend.executed().is_empty());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let backend = MockBackend::new();
        let coordinator = Arc::new(TransactionCoordinator::new(
            Router::single(backend.pool()),
            RetryPolicy::none(),
            None,
        ));
        assert!(matches!(
            BatchExecutor::new(coordinator, 0, true),
            Err(BatchError::InvalidBatchSize)
        ));
    }
}
