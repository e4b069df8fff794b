use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use graphmapper::driver::mock::MockBackend;
use graphmapper::driver::registry::global_registry;
use graphmapper::{
    AccessMode, CypherStatement, DriverError, EagerLoad, GraphMapper, MapperConfig, MapperError, Predicate,
    QueryDescriptor, RelationshipDescriptor, ResultSet, StorageMode,
};
use serde_json::json;
use serial_test::serial;
use tokio_test::{assert_err, assert_ok};

use super::{connect, init_logging, test_config};

fn deadlock() -> DriverError {
    DriverError::new(
        Some("Neo.TransientError.Transaction.DeadlockDetected".to_string()),
        "deadlock detected",
    )
}

#[tokio::test]
async fn test_transient_failure_is_retried_invisibly() {
    let backend = MockBackend::new();
    backend.fail_once("SET u.visits", deadlock());
    let mapper = connect(&backend, test_config()).await;
    let calls = AtomicU32::new(0);

    let affected = mapper
        .write(|tx| {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let rs = tx
                    .run(&CypherStatement::new("MATCH (u:User {id: $id}) SET u.visits = u.visits + 1 RETURN 1 AS affected").param("id", 1))
                    .await?;
                Ok::<_, MapperError>(rs.affected())
            })
        })
        .await
        .unwrap();

    assert_eq!(affected, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(backend.commits(), 1);
    assert_eq!(backend.rollbacks(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_surface_statement_and_hint() {
    let backend = MockBackend::new();
    backend.fail_always("MERGE (t:Tag", deadlock());
    let mapper = connect(&backend, test_config()).await;

    let statement = CypherStatement::new("MERGE (t:Tag {name: $name})").param("name", "rust");
    let err = assert_err!(mapper.execute(&statement, AccessMode::Write).await);

    assert_eq!(err.attempts(), Some(3));
    assert_eq!(err.statement().map(|s| s.text.as_str()), Some("MERGE (t:Tag {name: $name})"));
    assert!(err.hint().unwrap_or_default().contains("retry exhausted after 3 attempts"));
    let rendered = err.to_string();
    assert!(rendered.contains("\"name\":\"rust\""), "{}", rendered);
}

#[tokio::test]
async fn test_constraint_violation_names_offending_property() {
    let backend = MockBackend::new();
    backend.fail_always(
        "CREATE (u:User",
        DriverError::new(
            Some("Neo.ClientError.Schema.ConstraintValidationFailed".to_string()),
            "Node(7) already exists with label `User` and property `email` = 'ada@example.com'",
        ),
    );
    let mapper = connect(&backend, test_config()).await;

    let err = mapper
        .execute(&CypherStatement::new("CREATE (u:User {email: $email})").param("email", "ada@example.com"), AccessMode::Write)
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), Some(1));
    assert!(err.hint().unwrap_or_default().contains("unique constraint violated on User.email"));
}

#[tokio::test]
async fn test_fetch_with_follow_up_load() {
    let backend = MockBackend::new();
    backend.respond_to(
        "MATCH (n:User)",
        ResultSet::from_positional(
            vec!["n".to_string()],
            vec![vec![json!({"id": 1, "age": 30})], vec![json!({"id": 2, "age": 41})]],
        ),
    );
    backend.respond_to(
        "MATCH (r:Post)",
        ResultSet::from_positional(
            vec!["parent_key".to_string(), "related".to_string()],
            vec![vec![json!(2), json!({"id": 9, "user_id": 2})]],
        ),
    );
    let mapper = connect(&backend, test_config()).await;
    let posts = mapper
        .describe(RelationshipDescriptor::one_to_many("posts", "User", "Post").storage(StorageMode::ForeignKey))
        .unwrap();

    let rows = mapper
        .fetch(&QueryDescriptor::new("User").filter(Predicate::gt("age", 25)).with(EagerLoad::new(posts)))
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["posts"], json!([]));
    assert_eq!(rows[1]["posts"][0]["id"], json!(9));
}

#[tokio::test]
async fn test_explicit_transaction_rolls_back() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, test_config()).await;

    let mut tx = mapper.begin(AccessMode::Write).await.unwrap();
    tx.run(&CypherStatement::new("CREATE (u:User {id: 1}) RETURN 1 AS affected")).await.unwrap();
    assert!(tx.is_open());
    assert_ok!(tx.rollback().await);

    assert!(backend.committed().is_empty());
    assert_eq!(backend.rollbacks(), 1);
}

#[tokio::test]
async fn test_capabilities_and_schema_snapshot() {
    let backend = MockBackend::new();
    backend.respond_to(
        "db.labels()",
        ResultSet::from_positional(vec!["label".to_string()], vec![vec![json!("Post")], vec![json!("User")]]),
    );
    let mapper = connect(&backend, test_config()).await;

    let capabilities = mapper.capabilities().await.unwrap();
    assert_eq!(capabilities.backend_type, "mock");
    assert!(capabilities.supports_batch);

    let snapshot = assert_ok!(mapper.schema().await);
    assert_eq!(snapshot.labels, vec!["Post", "User"]);
    assert!(snapshot.constraints.is_empty());
    mapper.close().await;
}

#[tokio::test]
#[serial]
async fn test_backend_registered_at_runtime_in_global_registry() {
    init_logging();
    let backend = MockBackend::with_backend_type("vendor-graph");
    global_registry().replace("vendor-graph", Arc::new(backend.factory()));

    let config = MapperConfig {
        database_type: "vendor-graph".to_string(),
        ..test_config()
    };
    let mapper = assert_ok!(GraphMapper::connect(config).await);
    assert_eq!(mapper.capabilities().await.unwrap().backend_type, "vendor-graph");
    assert!(backend.connects() >= 1);

    let unknown = MapperConfig {
        database_type: "no-such-graph".to_string(),
        ..test_config()
    };
    assert!(matches!(GraphMapper::connect(unknown).await, Err(MapperError::Registry(_))));
}
