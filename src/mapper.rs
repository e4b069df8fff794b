//! `GraphMapper`: the entry point a host framework holds on to.
//!
//! Wires configuration, the driver registry, the transaction coordinator and
//! the relationship and batch engines together, and exposes the read and
//! write operations of each.
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;

use crate::batch::BatchExecutor;
use crate::config::MapperConfig;
use crate::cypher_generator::compiler::{compile, CompiledQuery, AGGREGATE_COLUMN, EXISTS_COLUMN};
use crate::cypher_generator::query_descriptor::QueryDescriptor;
use crate::cypher_generator::statement::{CypherStatement, Params};
use crate::driver::capabilities::DriverCapabilities;
use crate::driver::registry::{global_registry, DriverRegistry};
use crate::driver::result_set::{ResultSet, Row};
use crate::driver::schema::SchemaSnapshot;
use crate::loader;
use crate::relationship::descriptor::{RelationshipBuilder, RelationshipDescriptor};
use crate::relationship::hooks::WriteObserver;
use crate::relationship::{Outcome, RelationshipEngine, RelationshipError};
use crate::transaction::{
    AccessMode, ExplicitTransaction, MapperError, TransactionContext, TransactionCoordinator,
};

pub struct GraphMapper {
    config: MapperConfig,
    coordinator: Arc<TransactionCoordinator>,
    relationships: RelationshipEngine,
    batch: BatchExecutor,
}

impl GraphMapper {
    /// Connect with the backend named by `config.database_type` from the
    /// process-wide registry
    pub async fn connect(config: MapperConfig) -> Result<Self, MapperError> {
        Self::connect_with(config, global_registry()).await
    }

    pub async fn connect_with(config: MapperConfig, registry: &DriverRegistry) -> Result<Self, MapperError> {
        let coordinator = TransactionCoordinator::connect(&config, registry).await?;
        Self::with_coordinator(config, Arc::new(coordinator))
    }

    /// Build on an existing coordinator; `config` supplies the relationship
    /// and batch settings only
    pub fn with_coordinator(
        config: MapperConfig,
        coordinator: Arc<TransactionCoordinator>,
    ) -> Result<Self, MapperError> {
        let relationships = RelationshipEngine::new(coordinator.clone(), config.auto_create_edges);
        let batch = BatchExecutor::new(
            coordinator.clone(),
            config.batch_size,
            config.enable_batch_execution,
        )?;
        Ok(GraphMapper {
            config,
            coordinator,
            relationships,
            batch,
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.relationships.add_observer(observer);
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }

    /// Finish a relationship declaration with the configured storage mode and
    /// edge naming convention as defaults
    pub fn describe(&self, builder: RelationshipBuilder) -> Result<RelationshipDescriptor, RelationshipError> {
        builder.build(&self.config.relationship_defaults())
    }

    // Reads

    pub fn compile(&self, query: &QueryDescriptor) -> Result<CompiledQuery, MapperError> {
        Ok(compile(query)?)
    }

    /// Rows of `query` with every eager load attached
    pub async fn fetch(&self, query: &QueryDescriptor) -> Result<Vec<Row>, MapperError> {
        loader::fetch(&self.coordinator, query).await
    }

    pub async fn first(&self, query: &QueryDescriptor) -> Result<Option<Row>, MapperError> {
        let rows = self.fetch(&query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Number of nodes `query` matches; sorting, paging, projections and loads are ignored
    pub async fn count(&self, query: &QueryDescriptor) -> Result<i64, MapperError> {
        let counted = QueryDescriptor {
            order_by: Vec::new(),
            projections: Vec::new(),
            eager_loads: Vec::new(),
            distinct: false,
            skip: None,
            limit: None,
            ..query.clone()
        }
        .count();
        let result = self.run_compiled(&counted).await?;
        Ok(result.scalar(AGGREGATE_COLUMN).and_then(Value::as_i64).unwrap_or(0))
    }

    pub async fn exists(&self, query: &QueryDescriptor) -> Result<bool, MapperError> {
        let existence = QueryDescriptor {
            order_by: Vec::new(),
            projections: Vec::new(),
            eager_loads: Vec::new(),
            ..query.clone()
        }
        .exists();
        let result = self.run_compiled(&existence).await?;
        Ok(result.scalar(EXISTS_COLUMN).and_then(Value::as_bool).unwrap_or(false))
    }

    async fn run_compiled(&self, query: &QueryDescriptor) -> Result<ResultSet, MapperError> {
        let compiled = compile(query)?;
        self.coordinator.execute(&compiled.statement, AccessMode::Read).await
    }

    // Relationship writes

    pub async fn persist(
        &self,
        rel: &RelationshipDescriptor,
        parent: &Value,
        child: &Value,
        edge_properties: &Params,
    ) -> Result<Outcome, MapperError> {
        self.relationships.persist(rel, parent, child, edge_properties).await
    }

    pub async fn detach(&self, rel: &RelationshipDescriptor, parent: &Value, child: &Value) -> Result<Outcome, MapperError> {
        self.relationships.detach(rel, parent, child).await
    }

    pub async fn sync_foreign_key_change(
        &self,
        rel: &RelationshipDescriptor,
        child: &Value,
        new_parent: Option<&Value>,
    ) -> Result<Outcome, MapperError> {
        self.relationships.sync_foreign_key_change(rel, child, new_parent).await
    }

    // Raw execution

    pub async fn execute(&self, statement: &CypherStatement, mode: AccessMode) -> Result<ResultSet, MapperError> {
        self.coordinator.execute(statement, mode).await
    }

    pub async fn execute_batch(&self, statements: &[CypherStatement]) -> Result<Vec<ResultSet>, MapperError> {
        self.batch.execute_batch(statements).await
    }

    pub async fn write<T, F>(&self, work: F) -> Result<T, MapperError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut TransactionContext) -> BoxFuture<'t, Result<T, MapperError>> + Send,
    {
        self.coordinator.write(work).await
    }

    pub async fn read<T, F>(&self, work: F) -> Result<T, MapperError>
    where
        T: Send,
        F: for<'t> FnMut(&'t mut TransactionContext) -> BoxFuture<'t, Result<T, MapperError>> + Send,
    {
        self.coordinator.read(work).await
    }

    pub async fn begin(&self, mode: AccessMode) -> Result<ExplicitTransaction, MapperError> {
        self.coordinator.begin(mode).await
    }

    // Backend

    pub async fn capabilities(&self) -> Result<DriverCapabilities, MapperError> {
        self.coordinator.capabilities().await
    }

    pub async fn schema(&self) -> Result<SchemaSnapshot, MapperError> {
        self.coordinator.schema_snapshot().await
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        for pool in self.coordinator.router().pools() {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher_generator::predicate::Predicate;
    use crate::driver::mock::MockBackend;
    use crate::relationship::descriptor::StorageMode;
    use crate::transaction::{RetryPolicy, Router};
    use serde_json::json;

    fn mapper(backend: &MockBackend, config: MapperConfig) -> GraphMapper {
        let coordinator = TransactionCoordinator::new(Router::single(backend.pool()), RetryPolicy::none(), None);
        GraphMapper::with_coordinator(config, Arc::new(coordinator)).unwrap()
    }

    #[test]
    fn test_describe_uses_configured_defaults() {
        let backend = MockBackend::new();
        let config = MapperConfig {
            default_relationship_storage: StorageMode::Hybrid,
            ..Default::default()
        };
        let mapper = mapper(&backend, config);
        let rel = mapper
            .describe(RelationshipDescriptor::one_to_many("authoredPosts", "User", "Post"))
            .unwrap();
        assert_eq!(rel.storage(), StorageMode::Hybrid);
        assert_eq!(rel.edge_type(), "AUTHORED_POSTS");
    }

    #[tokio::test]
    async fn test_count_drops_sorting() {
        let backend = MockBackend::new();
        backend.respond_to("count(n)", ResultSet::single(AGGREGATE_COLUMN, json!(7)));
        let mapper = mapper(&backend, MapperConfig::default());

        let query = QueryDescriptor::new("User")
            .filter(Predicate::gt("age", 25))
            .order_by_desc("created_at");
        assert_eq!(mapper.count(&query).await.unwrap(), 7);

        let executed = backend.executed();
        assert_eq!(
            executed[0].text,
            "MATCH (n:User) WHERE n.age > $p0 RETURN count(n) AS aggregate"
        );
    }

    #[tokio::test]
    async fn test_exists_reads_flag() {
        let backend = MockBackend::new();
        backend.respond_to("AS exists", ResultSet::single(EXISTS_COLUMN, json!(true)));
        let mapper = mapper(&backend, MapperConfig::default());
        assert!(mapper.exists(&QueryDescriptor::new("User")).await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected() {
        let backend = MockBackend::new();
        let coordinator = TransactionCoordinator::new(Router::single(backend.pool()), RetryPolicy::none(), None);
        let config = MapperConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            GraphMapper::with_coordinator(config, Arc::new(coordinator)),
            Err(MapperError::Batch(_))
        ));
    }
}
