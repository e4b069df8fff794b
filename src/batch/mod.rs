//! Batch statement execution
//!
//! Independent write statements grouped into single backend round trips.
//! Parameters are checked up front: graph property stores bind primitives and
//! homogeneous primitive arrays only, so anything else must be serialized by
//! the caller before it reaches a batch.

pub mod errors;
pub mod executor;
pub mod param_validation;

pub use errors::BatchError;
pub use executor::BatchExecutor;
pub use param_validation::{is_property_value, validate_statements};
