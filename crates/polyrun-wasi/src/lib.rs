//! polyrun WASI shim
//!
//! A deliberately small `wasi_snapshot_preview1` host for guest modules that
//! only need console output and a clean exit, such as C exercises compiled
//! with wasi-libc. The guest never touches a real file system, clock or
//! environment.
//!
//! # Architecture
//!
//! - [`shim`]: the import surface, defined on a wasmtime [`wasmtime::Linker`]
//! - [`guest`]: instantiation, memory binding and `_start` invocation
//! - [`console`]: sinks receiving the guest's stdout/stderr text
//! - [`error`]: shim defects and the `proc_exit` unwind signal
//!
//! Anything the guest imports from preview 1 beyond [`SUPPORTED_SYSCALLS`]
//! fails loudly with [`ShimError::Gap`] rather than silently misbehaving.

pub mod console;
pub mod errno;
pub mod error;
pub mod guest;
pub mod memory;
pub mod shim;

pub use console::{ConsoleSink, Stream, Transcript};
pub use error::{GuestExit, Result, ShimError};
pub use guest::{GuestOutcome, GuestStatus, WasiShim};
pub use shim::{GuestSystem, ImportPolicy, SUPPORTED_SYSCALLS, WASI_MODULE};
