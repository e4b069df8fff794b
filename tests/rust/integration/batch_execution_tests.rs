use graphmapper::batch::BatchError;
use graphmapper::driver::mock::MockBackend;
use graphmapper::{AccessMode, CypherStatement, DriverError, MapperConfig, MapperError, ResultSet};
use serde_json::json;

use super::{connect, test_config};

fn upserts(n: usize) -> Vec<CypherStatement> {
    (0..n)
        .map(|i| {
            CypherStatement::new("MERGE (p:Product {sku: $sku}) SET p.tags = $tags RETURN p.sku AS sku")
                .param("sku", format!("sku-{}", i))
                .param("tags", json!(["a", "b"]))
        })
        .collect()
}

fn echo_sku(backend: &MockBackend) {
    backend.set_responder(|stmt| stmt.params.get("sku").map(|v| ResultSet::single("sku", v.clone())));
}

fn batch_config(batch_size: usize, enabled: bool) -> MapperConfig {
    MapperConfig {
        batch_size,
        enable_batch_execution: enabled,
        ..test_config()
    }
}

#[tokio::test]
async fn test_results_correlate_with_statements() {
    let backend = MockBackend::new();
    echo_sku(&backend);
    let mapper = connect(&backend, batch_config(3, true)).await;

    let results = mapper.execute_batch(&upserts(7)).await.unwrap();

    assert_eq!(results.len(), 7);
    for (i, rs) in results.iter().enumerate() {
        assert_eq!(rs.scalar("sku"), Some(&json!(format!("sku-{}", i))));
    }
    assert_eq!(backend.round_trips(), 3);
}

#[tokio::test]
async fn test_batch_equals_individual_execution() {
    let backend = MockBackend::new();
    echo_sku(&backend);
    let mapper = connect(&backend, batch_config(100, true)).await;
    let statements = upserts(4);

    let batched = mapper.execute_batch(&statements).await.unwrap();
    let mut individual = Vec::new();
    for statement in &statements {
        individual.push(mapper.execute(statement, AccessMode::Write).await.unwrap());
    }
    assert_eq!(batched, individual);
}

#[tokio::test]
async fn test_disabled_batching_uses_one_transaction_per_chunk() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, batch_config(2, false)).await;

    let results = mapper.execute_batch(&upserts(5)).await.unwrap();

    assert_eq!(results.len(), 5);
    assert_eq!(backend.commits(), 3);
    assert_eq!(backend.round_trips(), 5);
}

#[tokio::test]
async fn test_transient_batch_failure_is_retried() {
    let backend = MockBackend::new();
    backend.fail_once(
        "MERGE (p:Product",
        DriverError::new(Some("Neo.TransientError.Transaction.LockClientStopped".to_string()), "lock lost"),
    );
    let mapper = connect(&backend, batch_config(10, true)).await;

    let results = mapper.execute_batch(&upserts(3)).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(backend.committed().len(), 3);
}

#[tokio::test]
async fn test_non_scalar_parameters_are_rejected_unsent() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, batch_config(10, true)).await;

    for bad in [json!({"nested": true}), json!([1, "two"]), json!([[1], [2]])] {
        let mut statements = upserts(2);
        statements.push(CypherStatement::new("CREATE (e:Event {payload: $payload})").param("payload", bad));

        let err = mapper.execute_batch(&statements).await.unwrap_err();
        assert!(matches!(
            err,
            MapperError::Batch(BatchError::UnbindableParameter { index: 2, ref param, .. }) if param == "payload"
        ));
    }
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_empty_batch_is_a_no_op() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, batch_config(10, true)).await;
    assert!(mapper.execute_batch(&[]).await.unwrap().is_empty());
    assert_eq!(backend.round_trips(), 0);
}
