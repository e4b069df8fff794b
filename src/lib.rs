//! GraphMapper - Cypher translation and relationship persistence for graph object mappers
//!
//! This crate is the database-facing core of an object mapper over Cypher-speaking
//! graph databases:
//! - Query descriptors compiled to parameterised Cypher, including eager loads
//! - Relationship storage as foreign-key properties, native edges, or both
//! - A pluggable driver layer (Neo4j HTTP, Bolt, in-process mock) with pooling
//! - Managed transactions with retry on transient failures, and batching

pub mod batch;
pub mod config;
pub mod cypher_generator;
pub mod driver;
pub mod loader;
pub mod mapper;
pub mod relationship;
pub mod transaction;

pub use config::{ConfigError, MapperConfig};
pub use cypher_generator::{compile, CompileError, CypherStatement, EagerLoad, Predicate, QueryDescriptor};
pub use driver::registry::DriverRegistry;
pub use driver::{DriverError, ErrorKind, ResultSet, Row};
pub use mapper::GraphMapper;
pub use relationship::{EdgeNamingConvention, RelationshipDescriptor, RelationshipError, StorageMode};
pub use transaction::{AccessMode, MapperError, ReadPreference, RetryPolicy};
