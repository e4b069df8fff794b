//! Relationship persistence
//!
//! A `RelationshipDescriptor` fixes how one relationship is stored: as a
//! foreign-key property on the child, as a native edge, or as both kept in
//! sync (`hybrid`). `RelationshipEngine` plans and applies the matching
//! mutations; `WriteObserver` lets the host framework hook in around writes.
//!
//! Polymorphic relationships are foreign-key only. Requesting an edge-based
//! mode for one fails when the descriptor is built.

pub mod descriptor;
pub mod edge_naming;
pub mod errors;
pub mod graph_objects;
pub mod hooks;
pub mod mutations;
pub mod persistence;

pub use descriptor::{
    EdgeDirection, RelationshipBuilder, RelationshipDefaults, RelationshipDescriptor, RelationshipKind,
    StorageMode,
};
pub use edge_naming::EdgeNamingConvention;
pub use errors::RelationshipError;
pub use graph_objects::{GraphEdge, GraphNode};
pub use hooks::{LoggingObserver, WriteAction, WriteEvent, WriteObserver};
pub use persistence::{Outcome, RelationshipEngine};
