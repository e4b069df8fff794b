//! Integration tests - the mapper wired end to end over the in-process backend
//!
//! A `MockBackend` is registered under `mock` in a private registry so each
//! test can script responses, inject faults and read the committed journal.

mod batch_execution_tests;
mod mapper_workflow_tests;
mod relationship_storage_tests;

use std::sync::Arc;

use graphmapper::driver::mock::MockBackend;
use graphmapper::{DriverRegistry, GraphMapper, MapperConfig, RetryPolicy};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn test_config() -> MapperConfig {
    MapperConfig {
        database_type: "mock".to_string(),
        retry: RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            multiplier: 2.0,
            jitter: 0.0,
        },
        ..Default::default()
    }
}

pub async fn connect(backend: &MockBackend, config: MapperConfig) -> GraphMapper {
    init_logging();
    let registry = DriverRegistry::empty();
    registry.register("mock", Arc::new(backend.factory())).unwrap();
    GraphMapper::connect_with(config, &registry).await.unwrap()
}
