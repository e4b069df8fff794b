use graphmapper::cypher_generator::Params;
use graphmapper::driver::mock::MockBackend;
use graphmapper::relationship::RelationshipKind;
use graphmapper::{
    DriverError, EdgeNamingConvention, MapperConfig, MapperError, RelationshipDescriptor, RelationshipError,
    StorageMode,
};
use serde_json::json;

use super::{connect, test_config};

#[tokio::test]
async fn test_each_storage_mode_writes_its_representation() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, test_config()).await;
    let none = Params::new();

    let fk = mapper
        .describe(RelationshipDescriptor::one_to_many("posts", "User", "Post").storage(StorageMode::ForeignKey))
        .unwrap();
    let outcome = mapper.persist(&fk, &json!(1), &json!(10), &none).await.unwrap();
    assert!(outcome.foreign_key_written && !outcome.edge_written);

    let edge = mapper
        .describe(RelationshipDescriptor::one_to_many("posts", "User", "Post").storage(StorageMode::NativeEdge))
        .unwrap();
    let outcome = mapper.persist(&edge, &json!(1), &json!(11), &none).await.unwrap();
    assert!(!outcome.foreign_key_written && outcome.edge_written);

    assert_eq!(backend.committed_matching("SET c.user_id"), 1);
    assert_eq!(backend.committed_matching("MERGE (p)-[r:POSTS]->(c)"), 1);
    assert_eq!(backend.commits(), 2);
}

#[tokio::test]
async fn test_hybrid_failure_writes_neither_representation() {
    let backend = MockBackend::new();
    backend.fail_always(
        "MERGE (p)-[r:POSTS]",
        DriverError::new(Some("Neo.ClientError.Statement.SyntaxError".to_string()), "bad edge"),
    );
    let mapper = connect(&backend, test_config()).await;
    let hybrid = mapper
        .describe(RelationshipDescriptor::one_to_many("posts", "User", "Post").storage(StorageMode::Hybrid))
        .unwrap();

    let err = mapper.persist(&hybrid, &json!(1), &json!(10), &Params::new()).await.unwrap_err();

    assert!(matches!(err, MapperError::Database { .. }));
    // The foreign key ran inside the same transaction and was discarded with it
    assert_eq!(backend.executed().iter().filter(|s| s.text.contains("SET c.user_id")).count(), 1);
    assert!(backend.committed().is_empty());
}

#[tokio::test]
async fn test_hybrid_success_commits_both_together() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, test_config()).await;
    let hybrid = mapper
        .describe(RelationshipDescriptor::one_to_many("posts", "User", "Post").storage(StorageMode::Hybrid))
        .unwrap();

    let outcome = mapper.persist(&hybrid, &json!(1), &json!(10), &Params::new()).await.unwrap();

    assert!(outcome.foreign_key_written && outcome.edge_written);
    assert_eq!(backend.commits(), 1);
    assert_eq!(backend.committed().len(), 2);
}

#[tokio::test]
async fn test_polymorphic_native_edge_fails_fast() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, test_config()).await;

    for storage in [StorageMode::NativeEdge, StorageMode::Hybrid] {
        let err = mapper
            .describe(
                RelationshipDescriptor::morph_many("comments", "Post", "Comment", "commentable").storage(storage),
            )
            .unwrap_err();
        assert_eq!(
            err,
            RelationshipError::PolymorphicEdgeUnsupported {
                relationship: "comments".to_string(),
                requested: storage,
            }
        );
    }
    assert!(backend.executed().is_empty());
}

#[tokio::test]
async fn test_polymorphic_ignores_edge_default() {
    let backend = MockBackend::new();
    let config = MapperConfig {
        default_relationship_storage: StorageMode::NativeEdge,
        ..test_config()
    };
    let mapper = connect(&backend, config).await;

    let comments = mapper
        .describe(RelationshipDescriptor::morph_many("comments", "Post", "Comment", "commentable"))
        .unwrap();
    assert_eq!(comments.kind(), RelationshipKind::MorphMany);
    assert_eq!(comments.storage(), StorageMode::ForeignKey);

    mapper.persist(&comments, &json!(5), &json!(50), &Params::new()).await.unwrap();
    assert_eq!(backend.committed_matching("c.commentable_type"), 1);
}

#[tokio::test]
async fn test_configured_naming_convention_and_override() {
    let backend = MockBackend::new();
    let config = MapperConfig {
        edge_naming_convention: EdgeNamingConvention::Camel,
        ..test_config()
    };
    let mapper = connect(&backend, config).await;

    let derived = mapper
        .describe(RelationshipDescriptor::one_to_many("authored_posts", "User", "Post").storage(StorageMode::NativeEdge))
        .unwrap();
    assert_eq!(derived.edge_type(), "authoredPosts");

    let explicit = mapper
        .describe(
            RelationshipDescriptor::one_to_many("authored_posts", "User", "Post")
                .storage(StorageMode::NativeEdge)
                .edge_type("WROTE"),
        )
        .unwrap();
    assert_eq!(explicit.edge_type(), "WROTE");
}

#[tokio::test]
async fn test_pivot_properties_follow_edge_schema() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, test_config()).await;
    let tags = mapper
        .describe(
            RelationshipDescriptor::many_to_many("tags", "Post", "Tag")
                .storage(StorageMode::NativeEdge)
                .edge_properties(["weight"]),
        )
        .unwrap();

    let mut props = Params::new();
    props.insert("weight".to_string(), json!(0.7));
    mapper.persist(&tags, &json!(1), &json!(2), &props).await.unwrap();
    assert_eq!(backend.committed_matching("SET r += $"), 1);

    props.insert("colour".to_string(), json!("red"));
    let err = mapper.persist(&tags, &json!(1), &json!(3), &props).await.unwrap_err();
    assert!(matches!(
        err,
        MapperError::Relationship(RelationshipError::EdgePropertyNotInSchema { .. })
    ));
}

#[tokio::test]
async fn test_detach_and_resync_hybrid() {
    let backend = MockBackend::new();
    let mapper = connect(&backend, test_config()).await;
    let hybrid = mapper
        .describe(RelationshipDescriptor::one_to_many("posts", "User", "Post").storage(StorageMode::Hybrid))
        .unwrap();

    let outcome = mapper.detach(&hybrid, &json!(1), &json!(10)).await.unwrap();
    assert!(outcome.foreign_key_written && outcome.edge_written);
    assert_eq!(backend.committed_matching("REMOVE c.user_id"), 1);

    let outcome = mapper.sync_foreign_key_change(&hybrid, &json!(10), Some(&json!(2))).await.unwrap();
    assert!(outcome.edge_written);
}

#[tokio::test]
async fn test_resync_disabled_without_auto_create_edges() {
    let backend = MockBackend::new();
    let config = MapperConfig {
        auto_create_edges: false,
        ..test_config()
    };
    let mapper = connect(&backend, config).await;
    let hybrid = mapper
        .describe(RelationshipDescriptor::one_to_many("posts", "User", "Post").storage(StorageMode::Hybrid))
        .unwrap();

    let outcome = mapper.sync_foreign_key_change(&hybrid, &json!(10), Some(&json!(2))).await.unwrap();
    assert!(outcome.is_noop());
    assert!(backend.executed().is_empty());
}
