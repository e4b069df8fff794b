//! Cypher generation
//!
//! Predicates translate to boolean fragments (`clause_translator`), query
//! descriptors compile to full statements (`compiler`), and eager loads plan
//! into inline traversals or follow-up statements (`eager_load`). Every value
//! is bound as a parameter; nothing here talks to a backend.

pub mod clause_translator;
pub mod compiler;
pub mod eager_load;
pub mod errors;
pub mod identifiers;
pub mod predicate;
pub mod query_descriptor;
pub mod statement;
pub mod temporal_functions;

pub use clause_translator::{translate, ClauseTranslator, Fragment};
pub use compiler::{compile, CompiledQuery};
pub use eager_load::{EagerPlan, FollowUpQuery};
pub use errors::CypherGeneratorError;
pub use predicate::{ColumnRef, Comparison, Connector, Operand, Operator, Predicate, TemporalPart};
pub use query_descriptor::{
    AggregateFunction, EagerLoad, Projection, QueryDescriptor, SortKey, SortOrder,
};
pub use statement::{CypherStatement, Params};

/// Compilation failures, by their role
pub type CompileError = CypherGeneratorError;
