//! The normalized outcome of a single run.

use serde::{Deserialize, Serialize};

/// Classification of a failed run.
///
/// Lets callers tell a learner's mistake (`Compile`, `Runtime`) from
/// infrastructure problems (`Load`) and sandbox defects (`ShimGap`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Backend dependency was not available
    Load,
    /// Source did not produce an executable module
    Compile,
    /// Guest raised, trapped or exited non-zero
    Runtime,
    /// Guest called a syscall the shim does not implement
    ShimGap,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Load => write!(f, "load"),
            FailureKind::Compile => write!(f, "compile"),
            FailureKind::Runtime => write!(f, "runtime"),
            FailureKind::ShimGap => write!(f, "shim-gap"),
        }
    }
}

/// Result of running one exercise snippet.
///
/// `output` keeps the order in which lines were emitted. `error` is present
/// exactly when `success` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the program (and its validation script) passed
    pub success: bool,
    /// Captured output lines, in emission order
    pub output: Vec<String>,
    /// Human-readable failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// What kind of failure occurred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// A passing run with the given output.
    pub fn passed(output: Vec<String>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            failure: None,
        }
    }

    /// A failing run. Output captured before the failure is kept as-is.
    pub fn failed(output: Vec<String>, error: impl Into<String>, failure: FailureKind) -> Self {
        Self {
            success: false,
            output,
            error: Some(error.into()),
            failure: Some(failure),
        }
    }

    /// Check whether any output line contains `needle`.
    pub fn output_contains(&self, needle: &str) -> bool {
        self.output.iter().any(|line| line.contains(needle))
    }
}
