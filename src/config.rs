use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError};

use crate::driver::pool::PoolSettings;
use crate::driver::ConnectionConfig;
use crate::relationship::descriptor::{RelationshipDefaults, StorageMode};
use crate::relationship::edge_naming::EdgeNamingConvention;
use crate::transaction::retry::RetryPolicy;
use crate::transaction::routing::ReadPreference;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error for {field}: {value} - {source}")]
    Parse {
        field: String,
        value: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Connection pool limits
#[derive(Clone, Debug, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
#[validate(schema(function = "validate_pool_bounds"))]
pub struct PoolConfig {
    #[validate(range(min = 1, max = 1000, message = "pool.max must be between 1 and 1000"))]
    pub max: usize,
    pub min: usize,
    /// How long a checkout waits for a free connection
    #[validate(range(min = 1, message = "pool.acquire_timeout_ms must be positive"))]
    pub acquire_timeout_ms: u64,
    /// Idle connections older than this are pinged before reuse
    pub idle_threshold_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: 10,
            min: 1,
            acquire_timeout_ms: 5000,
            idle_threshold_ms: 30_000,
        }
    }
}

fn validate_pool_bounds(pool: &PoolConfig) -> Result<(), ValidationError> {
    if pool.min > pool.max {
        let mut err = ValidationError::new("pool_bounds");
        err.message = Some("pool.min cannot exceed pool.max".into());
        return Err(err);
    }
    Ok(())
}

/// Mapper configuration with validation
#[derive(Clone, PartialEq, Validate, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Registry name of the driver (`neo4j-http`, `neo4j`, `memgraph`, `mock`)
    #[validate(length(min = 1, message = "database_type cannot be empty"))]
    pub database_type: String,

    /// `http` or `https` for the HTTP driver
    pub scheme: String,

    #[validate(length(min = 1, message = "host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, max = 65535, message = "port must be between 1 and 65535"))]
    pub port: u16,

    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,

    /// Statements per backend round trip in batch execution
    #[validate(range(min = 1, max = 10000, message = "batch_size must be between 1 and 10000"))]
    pub batch_size: usize,

    pub enable_batch_execution: bool,

    /// Storage mode of descriptors that do not choose one
    pub default_relationship_storage: StorageMode,

    /// Keep hybrid edges in sync when the host changes a foreign key
    pub auto_create_edges: bool,

    pub edge_naming_convention: EdgeNamingConvention,

    #[validate(nested)]
    pub pool: PoolConfig,

    #[validate(nested)]
    pub retry: RetryPolicy,

    pub read_preference: ReadPreference,

    /// Read replicas as `host:port`
    pub replicas: Vec<String>,

    /// Per-statement timeout; `None` waits indefinitely
    #[validate(range(min = 1, message = "query_timeout_ms must be positive; omit it to wait indefinitely"))]
    pub query_timeout_ms: Option<u64>,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            database_type: "neo4j-http".to_string(),
            scheme: "http".to_string(),
            host: "localhost".to_string(),
            port: 7474,
            username: None,
            password: None,
            database: None,
            batch_size: 100,
            enable_batch_execution: true,
            default_relationship_storage: StorageMode::ForeignKey,
            auto_create_edges: true,
            edge_naming_convention: EdgeNamingConvention::UpperSnake,
            pool: PoolConfig::default(),
            retry: RetryPolicy::default(),
            read_preference: ReadPreference::Primary,
            replicas: Vec::new(),
            query_timeout_ms: None,
        }
    }
}

impl fmt::Debug for MapperConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapperConfig")
            .field("database_type", &self.database_type)
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("batch_size", &self.batch_size)
            .field("enable_batch_execution", &self.enable_batch_execution)
            .field("default_relationship_storage", &self.default_relationship_storage)
            .field("auto_create_edges", &self.auto_create_edges)
            .field("edge_naming_convention", &self.edge_naming_convention)
            .field("pool", &self.pool)
            .field("retry", &self.retry)
            .field("read_preference", &self.read_preference)
            .field("replicas", &self.replicas)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .finish()
    }
}

impl MapperConfig {
    /// Create configuration from `GRAPHMAPPER_*` environment variables with validation
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            database_type: env::var("GRAPHMAPPER_DATABASE_TYPE").unwrap_or(defaults.database_type),
            scheme: env::var("GRAPHMAPPER_SCHEME").unwrap_or(defaults.scheme),
            host: env::var("GRAPHMAPPER_HOST").unwrap_or(defaults.host),
            port: parse_env_var("GRAPHMAPPER_PORT", "7474")?,
            username: env::var("GRAPHMAPPER_USERNAME").ok(),
            password: env::var("GRAPHMAPPER_PASSWORD").ok(),
            database: env::var("GRAPHMAPPER_DATABASE").ok(),
            batch_size: parse_env_var("GRAPHMAPPER_BATCH_SIZE", "100")?,
            enable_batch_execution: parse_env_var("GRAPHMAPPER_ENABLE_BATCH_EXECUTION", "true")?,
            default_relationship_storage: parse_env_var(
                "GRAPHMAPPER_DEFAULT_RELATIONSHIP_STORAGE",
                "foreign_key",
            )?,
            auto_create_edges: parse_env_var("GRAPHMAPPER_AUTO_CREATE_EDGES", "true")?,
            edge_naming_convention: parse_env_var("GRAPHMAPPER_EDGE_NAMING_CONVENTION", "upper_snake")?,
            pool: PoolConfig {
                max: parse_env_var("GRAPHMAPPER_POOL_MAX", "10")?,
                min: parse_env_var("GRAPHMAPPER_POOL_MIN", "1")?,
                acquire_timeout_ms: parse_env_var("GRAPHMAPPER_POOL_ACQUIRE_TIMEOUT_MS", "5000")?,
                idle_threshold_ms: parse_env_var("GRAPHMAPPER_POOL_IDLE_THRESHOLD_MS", "30000")?,
            },
            retry: RetryPolicy {
                max_attempts: parse_env_var("GRAPHMAPPER_RETRY_MAX_ATTEMPTS", "3")?,
                initial_delay_ms: parse_env_var("GRAPHMAPPER_RETRY_INITIAL_DELAY_MS", "100")?,
                max_delay_ms: parse_env_var("GRAPHMAPPER_RETRY_MAX_DELAY_MS", "5000")?,
                multiplier: parse_env_var("GRAPHMAPPER_RETRY_MULTIPLIER", "2.0")?,
                jitter: parse_env_var("GRAPHMAPPER_RETRY_JITTER", "0.1")?,
            },
            read_preference: parse_env_var("GRAPHMAPPER_READ_PREFERENCE", "primary")?,
            replicas: env::var("GRAPHMAPPER_REPLICAS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            query_timeout_ms: match env::var("GRAPHMAPPER_QUERY_TIMEOUT_MS") {
                Ok(_) => Some(parse_env_var("GRAPHMAPPER_QUERY_TIMEOUT_MS", "0")?),
                Err(_) => None,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Create configuration from YAML file
    pub fn from_yaml_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
            field: "yaml_file".to_string(),
            value: "file read failed".to_string(),
            source: Box::new(e),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Create configuration from YAML text; missing keys take their defaults
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
            field: "yaml_content".to_string(),
            value: content.to_string(),
            source: Box::new(e),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Connection settings of the primary
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            backend_type: self.database_type.clone(),
            scheme: self.scheme.clone(),
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            database: self.database.clone(),
            request_timeout_ms: self.query_timeout_ms,
        }
    }

    /// Connection settings of every replica, sharing the primary's credentials
    pub fn replica_configs(&self) -> Result<Vec<ConnectionConfig>, ConfigError> {
        let primary = self.connection_config();
        self.replicas
            .iter()
            .map(|address| {
                let (host, port) = address.rsplit_once(':').ok_or_else(|| ConfigError::Parse {
                    field: "replicas".to_string(),
                    value: address.clone(),
                    source: "expected host:port".into(),
                })?;
                let port: u16 = port.parse().map_err(|e| ConfigError::Parse {
                    field: "replicas".to_string(),
                    value: address.clone(),
                    source: Box::new(e),
                })?;
                Ok(primary.for_address(host, port))
            })
            .collect()
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max: self.pool.max,
            min: self.pool.min,
            acquire_timeout: Duration::from_millis(self.pool.acquire_timeout_ms),
            idle_threshold: Duration::from_millis(self.pool.idle_threshold_ms),
        }
    }

    pub fn relationship_defaults(&self) -> RelationshipDefaults {
        RelationshipDefaults {
            storage: self.default_relationship_storage,
            naming: self.edge_naming_convention,
            auto_create_edges: self.auto_create_edges,
        }
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// Parse an environment variable with a default value
fn parse_env_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = env::var(key).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|e| ConfigError::Parse {
        field: key.to_string(),
        value,
        source: Box::new(e),
    })
}
