//! Unit tests - pure translation, planning and configuration checks
//!
//! Nothing here needs a backend; statements are compiled and inspected.

mod config_loading_tests;
mod query_compilation_tests;
mod retry_policy_tests;
