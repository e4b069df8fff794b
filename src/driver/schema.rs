//! Schema introspection over any `GraphDriver`
//!
//! Each backend exposes its catalog differently: Neo4j through `db.*`
//! procedures and `SHOW` commands, Memgraph through `SHOW ... INFO` and plain
//! graph scans. The dialect is picked from the driver's backend type.
use serde::Serialize;
use serde_json::Value;

use crate::cypher_generator::statement::CypherStatement;

use super::errors::DriverError;
use super::result_set::{ResultSet, Row};
use super::GraphDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaDialect {
    Neo4j,
    Memgraph,
}

impl SchemaDialect {
    pub fn for_backend(backend_type: &str) -> Self {
        if backend_type.eq_ignore_ascii_case("memgraph") {
            SchemaDialect::Memgraph
        } else {
            SchemaDialect::Neo4j
        }
    }

    fn labels(self) -> &'static str {
        match self {
            SchemaDialect::Neo4j => "CALL db.labels() YIELD label RETURN label ORDER BY label",
            SchemaDialect::Memgraph => {
                "MATCH (n) UNWIND labels(n) AS label RETURN DISTINCT label ORDER BY label"
            }
        }
    }

    fn relationship_types(self) -> &'static str {
        match self {
            SchemaDialect::Neo4j => {
                "CALL db.relationshipTypes() YIELD relationshipType RETURN relationshipType ORDER BY relationshipType"
            }
            SchemaDialect::Memgraph => {
                "MATCH ()-[r]->() RETURN DISTINCT type(r) AS relationshipType ORDER BY relationshipType"
            }
        }
    }

    fn property_keys(self) -> &'static str {
        match self {
            SchemaDialect::Neo4j => {
                "CALL db.propertyKeys() YIELD propertyKey RETURN propertyKey ORDER BY propertyKey"
            }
            SchemaDialect::Memgraph => {
                "MATCH (n) UNWIND keys(n) AS propertyKey RETURN DISTINCT propertyKey ORDER BY propertyKey"
            }
        }
    }

    fn constraints(self) -> &'static str {
        match self {
            SchemaDialect::Neo4j => {
                "SHOW CONSTRAINTS YIELD name, type, labelsOrTypes, properties RETURN name, type, labelsOrTypes, properties"
            }
            SchemaDialect::Memgraph => "SHOW CONSTRAINT INFO",
        }
    }

    fn indexes(self) -> &'static str {
        match self {
            SchemaDialect::Neo4j => {
                "SHOW INDEXES YIELD name, type, labelsOrTypes, properties, state RETURN name, type, labelsOrTypes, properties, state"
            }
            SchemaDialect::Memgraph => "SHOW INDEX INFO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintInfo {
    pub name: Option<String>,
    pub kind: String,
    pub label: String,
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: Option<String>,
    pub kind: String,
    pub label: Option<String>,
    pub properties: Vec<String>,
    pub state: Option<String>,
}

/// Everything the introspector knows, fetched in one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub labels: Vec<String>,
    pub relationship_types: Vec<String>,
    pub property_keys: Vec<String>,
    pub constraints: Vec<ConstraintInfo>,
    pub indexes: Vec<IndexInfo>,
}

pub struct SchemaIntrospector<'a> {
    driver: &'a dyn GraphDriver,
    dialect: SchemaDialect,
}

impl<'a> SchemaIntrospector<'a> {
    pub fn new(driver: &'a dyn GraphDriver) -> Self {
        SchemaIntrospector {
            driver,
            dialect: SchemaDialect::for_backend(driver.backend_type()),
        }
    }

    pub fn dialect(&self) -> SchemaDialect {
        self.dialect
    }

    async fn run(&self, text: &str) -> Result<ResultSet, DriverError> {
        let capabilities = self.driver.capabilities().await?;
        if !capabilities.supports_schema_introspection {
            return Err(DriverError::unsupported(
                self.driver.backend_type(),
                "schema introspection",
            ));
        }
        self.driver.execute_query(&CypherStatement::new(text)).await
    }

    pub async fn labels(&self) -> Result<Vec<String>, DriverError> {
        let rs = self.run(self.dialect.labels()).await?;
        Ok(strings(&rs, "label"))
    }

    pub async fn relationship_types(&self) -> Result<Vec<String>, DriverError> {
        let rs = self.run(self.dialect.relationship_types()).await?;
        Ok(strings(&rs, "relationshipType"))
    }

    pub async fn property_keys(&self) -> Result<Vec<String>, DriverError> {
        let rs = self.run(self.dialect.property_keys()).await?;
        Ok(strings(&rs, "propertyKey"))
    }

    pub async fn constraints(&self) -> Result<Vec<ConstraintInfo>, DriverError> {
        let rs = self.run(self.dialect.constraints()).await?;
        Ok(rs
            .rows()
            .iter()
            .map(|row| match self.dialect {
                SchemaDialect::Neo4j => ConstraintInfo {
                    name: text(row, "name"),
                    kind: text(row, "type").unwrap_or_default(),
                    label: list(row, "labelsOrTypes").into_iter().next().unwrap_or_default(),
                    properties: list(row, "properties"),
                },
                SchemaDialect::Memgraph => ConstraintInfo {
                    name: None,
                    kind: text(row, "constraint type").unwrap_or_default(),
                    label: text(row, "label").unwrap_or_default(),
                    properties: list(row, "properties"),
                },
            })
            .collect())
    }

    pub async fn indexes(&self) -> Result<Vec<IndexInfo>, DriverError> {
        let rs = self.run(self.dialect.indexes()).await?;
        Ok(rs
            .rows()
            .iter()
            .map(|row| match self.dialect {
                SchemaDialect::Neo4j => IndexInfo {
                    name: text(row, "name"),
                    kind: text(row, "type").unwrap_or_default(),
                    label: list(row, "labelsOrTypes").into_iter().next(),
                    properties: list(row, "properties"),
                    state: text(row, "state"),
                },
                SchemaDialect::Memgraph => IndexInfo {
                    name: None,
                    kind: text(row, "index type").unwrap_or_default(),
                    label: text(row, "label"),
                    properties: list(row, "property"),
                    state: None,
                },
            })
            .collect())
    }

    pub async fn snapshot(&self) -> Result<SchemaSnapshot, DriverError> {
        Ok(SchemaSnapshot {
            labels: self.labels().await?,
            relationship_types: self.relationship_types().await?,
            property_keys: self.property_keys().await?,
            constraints: self.constraints().await?,
            indexes: self.indexes().await?,
        })
    }
}

fn strings(rs: &ResultSet, column: &str) -> Vec<String> {
    rs.rows().iter().filter_map(|row| text(row, column)).collect()
}

fn text(row: &Row, column: &str) -> Option<String> {
    match row.get(column)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Neo4j returns lists, Memgraph sometimes a single string
fn list(row: &Row, column: &str) -> Vec<String> {
    match row.get(column) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}
