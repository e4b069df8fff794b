use graphmapper::cypher_generator::eager_load::PARENT_KEYS_PARAM;
use graphmapper::cypher_generator::{Comparison, TemporalPart};
use graphmapper::relationship::RelationshipDefaults;
use graphmapper::{compile, CompileError, EagerLoad, Predicate, QueryDescriptor, RelationshipDescriptor, StorageMode};
use serde_json::json;

fn posts(storage: StorageMode) -> RelationshipDescriptor {
    RelationshipDescriptor::one_to_many("posts", "User", "Post")
        .storage(storage)
        .edge_type("AUTHORED")
        .build(&RelationshipDefaults::default())
        .unwrap()
}

#[test]
fn test_filter_sort_limit_scenario() {
    let compiled = compile(
        &QueryDescriptor::new("User")
            .filter(Predicate::gt("age", 25))
            .filter(Predicate::neq("status", "inactive"))
            .order_by_desc("created_at")
            .limit(10),
    )
    .unwrap();

    assert_eq!(
        compiled.statement.text,
        "MATCH (n:User) WHERE n.age > $p0 AND (n.status IS NOT NULL AND n.status <> $p1) \
         RETURN n ORDER BY n.created_at DESC LIMIT 10"
    );
    assert_eq!(compiled.statement.params["p0"], json!(25));
    assert_eq!(compiled.statement.params["p1"], json!("inactive"));
}

#[test]
fn test_fragment_count_matches_predicate_count() {
    let predicates = vec![
        Predicate::eq("role", "admin"),
        Predicate::in_list("team", vec!["a", "b"]),
        Predicate::between("age", 18, 65),
        Predicate::group(vec![Predicate::like("name", "%ann%").or(), Predicate::is_null("name")]),
        Predicate::temporal("created_at", TemporalPart::Year, Comparison::Eq, 2024),
    ];
    let mut query = QueryDescriptor::new("User");
    for predicate in predicates.clone() {
        query = query.filter(predicate);
    }

    let compiled = compile(&query).unwrap();
    assert_eq!(compiled.where_fragments.len(), predicates.len());
}

#[test]
fn test_skip_precedes_limit() {
    let compiled = compile(&QueryDescriptor::new("User").paginate(2, 15)).unwrap();
    assert!(compiled.statement.text.ends_with("RETURN n SKIP 15 LIMIT 15"));
}

#[test]
fn test_null_values_never_match_silently() {
    let compiled = compile(
        &QueryDescriptor::new("User")
            .filter(Predicate::eq("deleted_at", json!(null)))
            .filter(Predicate::not_in("role", vec!["guest"])),
    )
    .unwrap();
    assert_eq!(
        compiled.where_fragments,
        vec![
            "n.deleted_at IS NULL".to_string(),
            "n.role IS NOT NULL AND NOT n.role IN $p0".to_string(),
        ]
    );

    let err = compile(&QueryDescriptor::new("User").filter(Predicate::gt("age", json!(null)))).unwrap_err();
    assert!(matches!(err, CompileError::NullComparison { .. }));
}

#[test]
fn test_unknown_operator_fails_fast() {
    let err = Predicate::parse("age", "approximately", 3).unwrap_err();
    assert_eq!(err, CompileError::UnknownOperator("approximately".to_string()));
}

#[test]
fn test_native_edge_load_is_inline_with_paged_roots() {
    let compiled = compile(
        &QueryDescriptor::new("User")
            .with(EagerLoad::new(posts(StorageMode::NativeEdge)))
            .order_by_desc("created_at")
            .limit(5),
    )
    .unwrap();

    assert_eq!(
        compiled.statement.text,
        "MATCH (n:User) WITH n ORDER BY n.created_at DESC LIMIT 5 \
         OPTIONAL MATCH (n)-[:AUTHORED]->(e0:Post) WITH n, collect(e0) AS posts \
         RETURN n, posts ORDER BY n.created_at DESC"
    );
    assert_eq!(compiled.inline_loads, vec!["posts".to_string()]);
    assert!(compiled.follow_ups.is_empty());
}

#[test]
fn test_foreign_key_load_is_follow_up() {
    let compiled = compile(&QueryDescriptor::new("User").with(EagerLoad::new(posts(StorageMode::ForeignKey)))).unwrap();

    assert_eq!(compiled.statement.text, "MATCH (n:User) RETURN n");
    let follow_up = &compiled.follow_ups[0];
    assert_eq!(follow_up.relation, "posts");
    assert_eq!(follow_up.root_key, "id");
    assert!(follow_up.statement.params.contains_key(PARENT_KEYS_PARAM));
}

#[test]
fn test_eager_load_limit_is_global_cap() {
    let compiled = compile(
        &QueryDescriptor::new("User").with(EagerLoad::new(posts(StorageMode::NativeEdge)).limit(3)),
    )
    .unwrap();

    let text = &compiled.follow_ups[0].statement.text;
    assert!(text.ends_with("LIMIT 3"));
    // One cap for the whole statement, not one per parent key
    assert_eq!(text.matches("LIMIT").count(), 1);
    assert!(!text.contains("collect("));
}

#[test]
fn test_projection_on_eager_query_is_rejected() {
    let err = compile(
        &QueryDescriptor::new("User")
            .select(["name"])
            .with(EagerLoad::new(posts(StorageMode::ForeignKey))),
    )
    .unwrap_err();
    assert!(matches!(err, CompileError::InvalidEagerLoad { .. }));
}

#[test]
fn test_negated_filter_group_excludes_missing_properties() {
    let compiled = compile(&QueryDescriptor::new("User").filter(Predicate::not_group(vec![
        Predicate::neq("status", "banned").or(),
        Predicate::not_in("role", vec!["guest"]),
    ])))
    .unwrap();
    assert_eq!(
        compiled.statement.text,
        "MATCH (n:User) WHERE n.status IS NOT NULL AND n.role IS NOT NULL \
         AND NOT (n.status <> $p0 OR NOT n.role IN $p1) RETURN n"
    );
}
