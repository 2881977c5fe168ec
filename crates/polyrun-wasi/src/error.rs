//! Error and unwind types for the shim

use thiserror::Error;

/// Result type for shim operations
pub type Result<T> = std::result::Result<T, ShimError>;

/// Defects in the shim itself, as opposed to failures of the guest program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShimError {
    /// Guest imported or called a syscall outside the implemented set
    #[error("unimplemented syscall: wasi_snapshot_preview1::{syscall}")]
    Gap { syscall: String },

    /// A syscall ran before the guest's memory was bound to the shim
    #[error("syscall {syscall} invoked before guest memory was bound")]
    MemoryUnbound { syscall: &'static str },

    /// Linker setup failed
    #[error("failed to link guest module: {0}")]
    Link(String),
}

/// Unwind condition raised by `proc_exit`.
///
/// Returned as the error of the host call so wasmtime stops the guest; the
/// caller recognises it by downcasting and treats it as a normal exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("guest exited with code {0}")]
pub struct GuestExit(pub i32);
