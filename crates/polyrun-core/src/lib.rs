//! polyrun core crate
//!
//! Shared types for every execution backend:
//!
//! - [`ExecutionResult`]: the normalized outcome of a run
//! - [`CodeRunner`]: the capability every language backend implements
//! - [`LoadError`] / [`ExecutionError`]: the error taxonomy
//! - [`compose`]: how learner code and a validation script become one program

pub mod compose;
pub mod error;
pub mod result;
pub mod runner;

// Re-export main types for convenience
pub use error::{ExecutionError, LoadError};
pub use result::{ExecutionResult, FailureKind};
pub use runner::{BackendKind, CodeRunner};
