use std::io::Write;

use graphmapper::{ConfigError, EdgeNamingConvention, MapperConfig, ReadPreference, StorageMode};

#[test]
fn test_full_yaml_document() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
database_type: neo4j-http
host: graph.internal
port: 7473
scheme: https
username: neo4j
password: secret
database: catalog
batch_size: 250
enable_batch_execution: false
default_relationship_storage: hybrid
auto_create_edges: false
edge_naming_convention: pascal
pool:
  max: 20
  min: 2
  acquire_timeout_ms: 1000
retry:
  max_attempts: 4
  initial_delay_ms: 50
  max_delay_ms: 2000
  multiplier: 3.0
  jitter: 0.0
read_preference: secondary
replicas:
  - replica-a:7474
  - replica-b:7475
query_timeout_ms: 30000
"#
    )
    .unwrap();

    let config = MapperConfig::from_yaml_file(file.path()).unwrap();
    assert_eq!(config.batch_size, 250);
    assert!(!config.enable_batch_execution);
    assert_eq!(config.default_relationship_storage, StorageMode::Hybrid);
    assert_eq!(config.edge_naming_convention, EdgeNamingConvention::Pascal);
    assert_eq!(config.read_preference, ReadPreference::Secondary);

    let primary = config.connection_config();
    assert_eq!(primary.base_url(), "https://graph.internal:7473");
    assert_eq!(primary.database.as_deref(), Some("catalog"));

    let replicas = config.replica_configs().unwrap();
    assert_eq!(replicas.len(), 2);
    assert_eq!(replicas[1].port, 7475);
    assert_eq!(replicas[1].username.as_deref(), Some("neo4j"));

    let settings = config.pool_settings();
    assert_eq!((settings.max, settings.min), (20, 2));

    let defaults = config.relationship_defaults();
    assert!(!defaults.auto_create_edges);
}

#[test]
fn test_invalid_values_are_rejected() {
    assert!(matches!(
        MapperConfig::from_yaml_str("batch_size: 0"),
        Err(ConfigError::Validation(_))
    ));
    assert!(matches!(
        MapperConfig::from_yaml_str("retry:\n  initial_delay_ms: 9000\n  max_delay_ms: 100"),
        Err(ConfigError::Validation(_))
    ));
    assert!(matches!(
        MapperConfig::from_yaml_str("default_relationship_storage: graph"),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_missing_file() {
    assert!(matches!(
        MapperConfig::from_yaml_file("/nonexistent/graphmapper.yaml"),
        Err(ConfigError::Parse { field, .. }) if field == "yaml_file"
    ));
}
