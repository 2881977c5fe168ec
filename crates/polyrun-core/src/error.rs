//! Error types for polyrun backends

use crate::result::{ExecutionResult, FailureKind};
use thiserror::Error;

/// Errors raised while making a backend ready to run code.
///
/// This is the only error that leaves a backend's public surface; a failed
/// load leaves the backend unloaded so it can be retried.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Network failure while fetching a module or toolchain
    #[error("Failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Non-success HTTP status
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    /// Downloaded archive could not be unpacked
    #[error("Failed to extract archive: {0}")]
    Archive(String),

    /// Compiler toolchain missing or incomplete
    #[error("Toolchain unavailable: {0}")]
    Toolchain(String),

    /// Fetched bytes are not a usable WebAssembly module
    #[error("Invalid module: {0}")]
    InvalidModule(String),

    /// Warm-up probe of a freshly loaded interpreter failed
    #[error("Interpreter probe failed: {0}")]
    Probe(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ways a run can fail after the backend is ready.
///
/// These never escape `run()`; they are folded into an [`ExecutionResult`].
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Source did not compile
    #[error("Compilation failed")]
    Compile { diagnostics: String },

    /// Guest called `proc_exit` with a non-zero code
    #[error("Program exited with code {code}")]
    NonZeroExit { code: i32 },

    /// Guest trapped or threw
    #[error("{message}")]
    Trap { message: String },

    /// Guest hit a gap in the syscall shim
    #[error("{message}")]
    ShimGap { message: String },

    /// Backend was asked to run before `load()` succeeded
    #[error("{0}")]
    NotLoaded(String),
}

impl ExecutionError {
    /// The failure class reported in results.
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutionError::Compile { .. } => FailureKind::Compile,
            ExecutionError::NonZeroExit { .. } | ExecutionError::Trap { .. } => {
                FailureKind::Runtime
            }
            ExecutionError::ShimGap { .. } => FailureKind::ShimGap,
            ExecutionError::NotLoaded(_) => FailureKind::Load,
        }
    }

    /// Fold the error into a failed result, after any output already captured.
    pub fn into_result(self, output: Vec<String>) -> ExecutionResult {
        let kind = self.kind();
        ExecutionResult::failed(output, self.to_string(), kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_message() {
        let err = ExecutionError::NonZeroExit { code: 3 };
        assert_eq!(err.to_string(), "Program exited with code 3");
        assert_eq!(err.kind(), FailureKind::Runtime);
    }

    #[test]
    fn test_into_result_appends_after_output() {
        let result = ExecutionError::Trap {
            message: "unreachable".to_string(),
        }
        .into_result(vec!["a".to_string(), "b".to_string()]);

        assert!(!result.success);
        assert_eq!(result.output, vec!["a", "b"]);
        assert_eq!(result.error.as_deref(), Some("unreachable"));
    }

    #[test]
    fn test_shim_gap_is_distinct() {
        let err = ExecutionError::ShimGap {
            message: "unimplemented".into(),
        };
        assert_eq!(err.kind(), FailureKind::ShimGap);
        assert_ne!(err.kind(), FailureKind::Runtime);
    }
}
