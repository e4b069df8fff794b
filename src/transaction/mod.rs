//! Transaction & retry coordination
//!
//! `TransactionCoordinator` owns the connection pools (through the `Router`),
//! opens a `TransactionContext` per unit of work and is the only place in the
//! crate where failed work is retried. Everything below it reports errors
//! with their `ErrorKind` and lets the coordinator decide.

pub mod context;
pub mod coordinator;
pub mod errors;
pub mod retry;
pub mod routing;

pub use context::{ExplicitTransaction, TransactionContext, TransactionState};
pub use coordinator::TransactionCoordinator;
pub use errors::MapperError;
pub use retry::{RetryDecision, RetryPolicy};
pub use routing::{AccessMode, ReadPreference, Router};
