//! Relationship persistence engine
//!
//! Turns "attach child to parent" (and its inverse) into the mutations the
//! descriptor's storage mode calls for, and runs them through the coordinator
//! in a single managed transaction:
//!
//! | mode          | one-to-many / many-to-one / morph | many-to-many        |
//! |---------------|-----------------------------------|---------------------|
//! | `foreign_key` | `SET child.fk`                    | pivot node          |
//! | `native_edge` | typed edge                        | typed edge          |
//! | `hybrid`      | `SET child.fk` + typed edge       | pivot node + edge   |
//!
//! Hybrid writes are two statements in one transaction. A failure of either,
//! including a mutation that matched no endpoint, rolls both back.
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::batch::param_validation::is_property_value;
use crate::cypher_generator::statement::{CypherStatement, Params};
use crate::transaction::coordinator::TransactionCoordinator;
use crate::transaction::errors::MapperError;

use super::descriptor::{RelationshipDescriptor, RelationshipKind, StorageMode};
use super::errors::RelationshipError;
use super::hooks::{WriteAction, WriteEvent, WriteObserver};
use super::mutations::{self, Mutation, MutationKind};

/// What a persist, detach or resync call wrote
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub relationship: String,
    pub mode: StorageMode,
    pub action: WriteAction,
    pub foreign_key_written: bool,
    pub edge_written: bool,
    /// Sum of the `affected` counts of every statement
    pub affected: i64,
    #[serde(skip)]
    pub statements: Vec<CypherStatement>,
}

impl Outcome {
    fn new(rel: &RelationshipDescriptor, action: WriteAction, planned: &[Mutation], affected: i64) -> Self {
        Outcome {
            relationship: rel.name().to_string(),
            mode: rel.storage(),
            action,
            foreign_key_written: planned.iter().any(|m| m.kind.writes_foreign_key()),
            edge_written: planned.iter().any(|m| m.kind.writes_edge()),
            affected,
            statements: planned.iter().map(|m| m.statement.clone()).collect(),
        }
    }

    /// Nothing was planned, so nothing ran
    pub fn is_noop(&self) -> bool {
        self.statements.is_empty()
    }
}

fn check_edge_properties(rel: &RelationshipDescriptor, properties: &Params) -> Result<(), RelationshipError> {
    if properties.is_empty() {
        return Ok(());
    }
    if rel.storage() == StorageMode::ForeignKey && rel.kind() != RelationshipKind::ManyToMany {
        return Err(RelationshipError::EdgePropertiesUnsupported {
            relationship: rel.name().to_string(),
            kind: rel.kind().to_string(),
        });
    }
    for (property, value) in properties {
        if !rel.edge_properties().iter().any(|p| p == property) {
            return Err(RelationshipError::EdgePropertyNotInSchema {
                relationship: rel.name().to_string(),
                property: property.clone(),
            });
        }
        if value.is_null() || !is_property_value(value) {
            return Err(RelationshipError::NonScalarEdgeProperty {
                relationship: rel.name().to_string(),
                property: property.clone(),
            });
        }
    }
    Ok(())
}

/// Mutations attaching `child` to `parent`, in execution order
pub fn plan_persist(
    rel: &RelationshipDescriptor,
    parent: &Value,
    child: &Value,
    edge_properties: &Params,
) -> Result<Vec<Mutation>, RelationshipError> {
    check_edge_properties(rel, edge_properties)?;
    let storage = rel.storage();
    let mut planned = Vec::with_capacity(2);

    if rel.kind() == RelationshipKind::ManyToMany {
        if storage.uses_foreign_key() {
            planned.push(mutations::merge_pivot(rel, parent, child, edge_properties));
        }
        if storage.uses_edges() {
            planned.push(mutations::merge_edge(rel, parent, child, edge_properties, false));
        }
    } else {
        if storage.uses_foreign_key() {
            planned.push(mutations::set_foreign_key(rel, parent, child));
        }
        if storage.uses_edges() {
            planned.push(mutations::merge_edge(
                rel,
                parent,
                child,
                edge_properties,
                rel.kind().is_single_parent(),
            ));
        }
    }
    Ok(planned)
}

/// Mutations removing the link between `parent` and `child`
pub fn plan_detach(rel: &RelationshipDescriptor, parent: &Value, child: &Value) -> Vec<Mutation> {
    let storage = rel.storage();
    let mut planned = Vec::with_capacity(2);
    if storage.uses_foreign_key() {
        planned.push(if rel.kind() == RelationshipKind::ManyToMany {
            mutations::delete_pivot(rel, parent, child)
        } else {
            mutations::clear_foreign_key(rel, Some(parent), child)
        });
    }
    if storage.uses_edges() {
        planned.push(mutations::delete_edge(rel, Some(parent), child));
    }
    planned
}

fn missing_endpoint(rel: &RelationshipDescriptor, mutation: &Mutation) -> RelationshipError {
    let side = match mutation.kind {
        MutationKind::SetForeignKey | MutationKind::MergePivot | MutationKind::MergeEdge => {
            "parent or child"
        }
        _ => "pivot",
    };
    let key = mutation
        .node
        .properties
        .values()
        .next()
        .cloned()
        .unwrap_or(Value::Null);
    RelationshipError::endpoint_not_found(rel.name(), side, &key)
}

pub struct RelationshipEngine {
    coordinator: Arc<TransactionCoordinator>,
    observers: Vec<Arc<dyn WriteObserver>>,
    auto_create_edges: bool,
}

impl RelationshipEngine {
    pub fn new(coordinator: Arc<TransactionCoordinator>, auto_create_edges: bool) -> Self {
        RelationshipEngine {
            coordinator,
            observers: Vec::new(),
            auto_create_edges,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn add_observer(&mut self, observer: Arc<dyn WriteObserver>) {
        self.observers.push(observer);
    }

    pub fn auto_create_edges(&self) -> bool {
        self.auto_create_edges
    }

    /// Attach `child` to `parent` according to the descriptor's storage mode.
    ///
    /// # Errors
    /// - `RelationshipError` for invalid edge properties, an observer veto,
    ///   or an endpoint that does not exist (nothing is written)
    /// - `MapperError::Database` when the backend fails after retries
    pub async fn persist(
        &self,
        rel: &RelationshipDescriptor,
        parent: &Value,
        child: &Value,
        edge_properties: &Params,
    ) -> Result<Outcome, MapperError> {
        let planned = plan_persist(rel, parent, child, edge_properties)?;
        let event = self.event(rel, WriteAction::Attach, Some(parent), child);
        self.apply(rel, event, planned).await
    }

    pub async fn detach(&self, rel: &RelationshipDescriptor, parent: &Value, child: &Value) -> Result<Outcome, MapperError> {
        let planned = plan_detach(rel, parent, child);
        let event = self.event(rel, WriteAction::Detach, Some(parent), child);
        self.apply(rel, event, planned).await
    }

    /// Re-point the edge of a hybrid relationship after the host framework
    /// changed the child's foreign key to `new_parent` (or cleared it).
    ///
    /// The foreign key itself is the host's write; only the edge is touched.
    /// A no-op unless the relationship is hybrid and `auto_create_edges` is on.
    pub async fn sync_foreign_key_change(
        &self,
        rel: &RelationshipDescriptor,
        child: &Value,
        new_parent: Option<&Value>,
    ) -> Result<Outcome, MapperError> {
        if rel.storage() != StorageMode::Hybrid || !self.auto_create_edges || rel.kind() == RelationshipKind::ManyToMany {
            log::debug!(
                "Skipping edge sync for {} ({}, auto_create_edges={})",
                rel.name(),
                rel.storage(),
                self.auto_create_edges
            );
            return Ok(Outcome::new(rel, WriteAction::Resync, &[], 0));
        }
        let planned = vec![match new_parent {
            Some(parent) => mutations::merge_edge(rel, parent, child, &Params::new(), true),
            None => mutations::delete_edge(rel, None, child),
        }];
        let event = self.event(rel, WriteAction::Resync, new_parent, child);
        self.apply(rel, event, planned).await
    }

    fn event(&self, rel: &RelationshipDescriptor, action: WriteAction, parent: Option<&Value>, child: &Value) -> WriteEvent {
        WriteEvent {
            relationship: rel.name().to_string(),
            mode: rel.storage(),
            action,
            parent_id: parent.cloned(),
            child_id: child.clone(),
        }
    }

    async fn apply(&self, rel: &RelationshipDescriptor, event: WriteEvent, planned: Vec<Mutation>) -> Result<Outcome, MapperError> {
        for observer in &self.observers {
            observer.before_persist(&event).map_err(|reason| RelationshipError::RejectedByObserver {
                relationship: rel.name().to_string(),
                reason,
            })?;
        }

        let affected = if planned.is_empty() {
            0
        } else {
            self.coordinator
                .write(|tx| {
                    let planned = planned.clone();
                    let rel = rel.clone();
                    Box::pin(async move {
                        let mut total = 0;
                        for mutation in &planned {
                            let affected = tx.run(&mutation.statement).await?.affected();
                            if mutation.requires_match && affected < 1 {
                                return Err(MapperError::from(missing_endpoint(&rel, mutation)));
                            }
                            total += affected;
                        }
                        Ok::<i64, MapperError>(total)
                    })
                })
                .await?
        };

        log::debug!(
            "{} {} ({}) wrote {} statement(s), {} element(s) affected",
            event.action,
            rel.name(),
            rel.storage(),
            planned.len(),
            affected
        );
        for observer in &self.observers {
            observer.after_persist(&event, affected);
        }
        Ok(Outcome::new(rel, event.action, &planned, affected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::errors::DriverError;
    use crate::driver::mock::MockBackend;
    use crate::driver::result_set::ResultSet;
    use crate::relationship::descriptor::RelationshipDefaults;
    use crate::relationship::hooks::MockWriteObserver;
    use crate::transaction::retry::RetryPolicy;
    use crate::transaction::routing::Router;
    use serde_json::json;
    use test_case::test_case;

    fn engine(backend: &MockBackend) -> RelationshipEngine {
        let coordinator = TransactionCoordinator::new(
            Router::single(backend.pool()),
            RetryPolicy::default().without_jitter(),
            None,
        );
        RelationshipEngine::new(Arc::new(coordinator), true)
    }

    fn posts(storage: StorageMode) -> RelationshipDescriptor {
        RelationshipDescriptor::one_to_many("posts", "User", "Post")
            .storage(storage)
            .build(&RelationshipDefaults::default())
            .unwrap()
    }

    fn tags(storage: StorageMode) -> RelationshipDescriptor {
        RelationshipDescriptor::many_to_many("tags", "Post", "Tag")
            .storage(storage)
            .edge_properties(["weight", "added_by"])
            .build(&RelationshipDefaults::default())
            .unwrap()
    }

    #[test]
    fn test_plans_per_mode() {
        let none = Params::new();
        let fk = plan_persist(&posts(StorageMode::ForeignKey), &json!(1), &json!(2), &none).unwrap();
        assert_eq!(fk.iter().map(|m| m.kind).collect::<Vec<_>>(), vec![MutationKind::SetForeignKey]);

        let edge = plan_persist(&posts(StorageMode::NativeEdge), &json!(1), &json!(2), &none).unwrap();
        assert_eq!(edge.iter().map(|m| m.kind).collect::<Vec<_>>(), vec![MutationKind::MergeEdge]);

        let hybrid = plan_persist(&tags(StorageMode::Hybrid), &json!(1), &json!(2), &none).unwrap();
        assert_eq!(
            hybrid.iter().map(|m| m.kind).collect::<Vec<_>>(),
            vec![MutationKind::MergePivot, MutationKind::MergeEdge]
        );
    }

    #[test]
    fn test_edge_property_schema_enforced() {
        let mut props = Params::new();
        props.insert("colour".to_string(), json!("red"));
        assert!(matches!(
            plan_persist(&tags(StorageMode::NativeEdge), &json!(1), &json!(2), &props),
            Err(RelationshipError::EdgePropertyNotInSchema { .. })
        ));

        let mut props = Params::new();
        props.insert("weight".to_string(), json!({"value": 1}));
        assert!(matches!(
            plan_persist(&tags(StorageMode::NativeEdge), &json!(1), &json!(2), &props),
            Err(RelationshipError::NonScalarEdgeProperty { .. })
        ));

        let mut props = Params::new();
        props.insert("weight".to_string(), json!(1));
        assert!(matches!(
            plan_persist(&posts(StorageMode::ForeignKey), &json!(1), &json!(2), &props),
            Err(RelationshipError::EdgePropertiesUnsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_hybrid_writes_both_in_one_transaction() {
        let backend = MockBackend::new();
        let outcome = engine(&backend)
            .persist(&posts(StorageMode::Hybrid), &json!(1), &json!(10), &Params::new())
            .await
            .unwrap();

        assert!(outcome.foreign_key_written && outcome.edge_written);
        assert_eq!(outcome.affected, 2);
        assert_eq!(backend.commits(), 1);
        assert_eq!(backend.committed_matching("SET c.user_id"), 1);
        assert_eq!(backend.committed_matching("MERGE (p)-[r:POSTS]->(c)"), 1);
    }

    #[tokio::test]
    async fn test_hybrid_edge_failure_leaves_nothing() {
        let backend = MockBackend::new();
        backend.fail_always(
            "MERGE (p)-[r:POSTS]",
            DriverError::new(Some("Neo.ClientError.Schema.ConstraintValidationFailed".into()), "nope"),
        );
        let err = engine(&backend)
            .persist(&posts(StorageMode::Hybrid), &json!(1), &json!(10), &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MapperError::Database { .. }));
        assert!(backend.committed().is_empty());
        assert_eq!(backend.committed_matching("SET c.user_id"), 0);
    }

    #[tokio::test]
    async fn test_missing_parent_rolls_back_foreign_key() {
        let backend = MockBackend::new();
        backend.respond_to("MERGE (p)-[r:POSTS]", ResultSet::single("affected", json!(0)));
        let err = engine(&backend)
            .persist(&posts(StorageMode::Hybrid), &json!(99), &json!(10), &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MapperError::Relationship(RelationshipError::EndpointNotFound { .. })
        ));
        assert!(backend.committed().is_empty());
        assert_eq!(backend.rollbacks(), 1);
    }

    #[test_case(posts(StorageMode::ForeignKey), "SET c.user_id" ; "foreign_key")]
    #[test_case(tags(StorageMode::ForeignKey), "MERGE (pv:PostTag" ; "pivot")]
    #[tokio::test]
    async fn test_missing_endpoint_fails_foreign_key_write(rel: RelationshipDescriptor, pattern: &str) {
        let backend = MockBackend::new();
        backend.respond_to(pattern, ResultSet::single("affected", json!(0)));
        let err = engine(&backend)
            .persist(&rel, &json!(404), &json!(10), &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MapperError::Relationship(RelationshipError::EndpointNotFound { .. })
        ));
        let sent = backend.executed();
        assert!(sent.iter().any(|s| s.text.starts_with("MATCH (p:") && s.text.contains(pattern)));
        assert!(backend.committed().is_empty());
    }

    #[tokio::test]
    async fn test_observer_veto_sends_nothing() {
        let backend = MockBackend::new();
        let mut observer = MockWriteObserver::new();
        observer
            .expect_before_persist()
            .returning(|_| Err("read-only mode".to_string()));
        observer.expect_after_persist().never();

        let err = engine(&backend)
            .with_observer(Arc::new(observer))
            .persist(&posts(StorageMode::ForeignKey), &json!(1), &json!(2), &Params::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MapperError::Relationship(RelationshipError::RejectedByObserver { .. })
        ));
        assert!(backend.executed().is_empty());
    }

    #[tokio::test]
    async fn test_observer_sees_committed_write() {
        let backend = MockBackend::new();
        let mut observer = MockWriteObserver::new();
        observer.expect_before_persist().times(1).returning(|_| Ok(()));
        observer
            .expect_after_persist()
            .withf(|event, affected| event.action == WriteAction::Detach && *affected == 1)
            .times(1)
            .return_const(());

        engine(&backend)
            .with_observer(Arc::new(observer))
            .detach(&posts(StorageMode::ForeignKey), &json!(1), &json!(2))
            .await
            .unwrap();
        assert_eq!(backend.committed_matching("REMOVE c.user_id"), 1);
    }

    #[tokio::test]
    async fn test_sync_repoints_hybrid_edge() {
        let backend = MockBackend::new();
        let engine = engine(&backend);
        let rel = posts(StorageMode::Hybrid);

        let outcome = engine.sync_foreign_key_change(&rel, &json!(10), Some(&json!(2))).await.unwrap();
        assert!(outcome.edge_written && !outcome.foreign_key_written);
        assert_eq!(backend.committed_matching("DELETE stale"), 1);

        engine.sync_foreign_key_change(&rel, &json!(10), None).await.unwrap();
        assert_eq!(backend.committed_matching("FOREACH (x IN found | DELETE x)"), 1);

        let skipped = engine
            .sync_foreign_key_change(&posts(StorageMode::ForeignKey), &json!(10), Some(&json!(3)))
            .await
            .unwrap();
        assert!(skipped.is_noop());
    }
}
