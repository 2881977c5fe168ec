//! The capability every language backend implements.

use crate::error::LoadError;
use crate::result::ExecutionResult;
use async_trait::async_trait;

/// How a backend turns source text into a running program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Evaluated directly by an embedded engine, no compile step
    Dynamic,
    /// Compiled to a WebAssembly module and run against the syscall shim
    Compiled,
    /// Executed by an interpreter that itself runs as a WebAssembly guest
    Interpreted,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Dynamic => write!(f, "dynamic"),
            BackendKind::Compiled => write!(f, "compiled"),
            BackendKind::Interpreted => write!(f, "interpreted"),
        }
    }
}

/// A language backend.
///
/// Implementations are long-lived and shared; `load` and `run` take `&self`
/// and keep any lazily initialized state behind interior mutability.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Lower-case language identifier, e.g. `"python"`.
    fn language(&self) -> &str;

    /// Backend family.
    fn kind(&self) -> BackendKind;

    /// Make the backend ready. Idempotent: initialization happens at most once
    /// per successful load. A failure leaves the backend unloaded.
    async fn load(&self) -> Result<(), LoadError>;

    /// Whether `load` has completed successfully.
    fn is_loaded(&self) -> bool;

    /// Run learner `code`, optionally followed by a validation script.
    ///
    /// Never fails: every problem is reported through the returned result.
    async fn run(&self, code: &str, validation_script: Option<&str>) -> ExecutionResult;
}
