use serde::{Deserialize, Serialize};

/// Feature flags describing one backend connection.
///
/// Queried once when a connection opens and cached for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverCapabilities {
    pub backend_type: String,
    pub version: String,
    /// Several statements can travel in one request
    pub supports_batch: bool,
    pub supports_schema_introspection: bool,
    /// Maps and nested lists are accepted as property values
    pub supports_json_collections: bool,
    pub supports_transactions: bool,
    pub supports_multiple_databases: bool,
}

impl DriverCapabilities {
    pub fn neo4j(version: impl Into<String>, supports_batch: bool) -> Self {
        let version = version.into();
        let multi_db = major_version(&version).is_some_and(|major| major >= 4);
        DriverCapabilities {
            backend_type: "neo4j".to_string(),
            version,
            supports_batch,
            supports_schema_introspection: true,
            supports_json_collections: false,
            supports_transactions: true,
            supports_multiple_databases: multi_db,
        }
    }

    pub fn memgraph(version: impl Into<String>) -> Self {
        DriverCapabilities {
            backend_type: "memgraph".to_string(),
            version: version.into(),
            supports_batch: false,
            supports_schema_introspection: true,
            supports_json_collections: false,
            supports_transactions: true,
            supports_multiple_databases: false,
        }
    }

    pub fn major_version(&self) -> Option<u32> {
        major_version(&self.version)
    }
}

fn major_version(version: &str) -> Option<u32> {
    version
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .split('.')
        .next()
        .and_then(|major| major.parse().ok())
}
