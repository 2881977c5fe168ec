//! polyrun runtime crate
//!
//! Language backends behind the [`polyrun_core::CodeRunner`] contract and the
//! registry that owns them.
//!
//! | Language | Backend | Engine |
//! |---|---|---|
//! | `javascript` | [`JavaScriptRuntime`] | embedded QuickJS |
//! | `python` | [`PythonRuntime`] | CPython on wasmtime-wasi |
//! | `c`, `cpp` | [`CompiledRuntime`] | wasi-sdk clang + `polyrun-wasi` shim |
//!
//! ```rust,ignore
//! let registry = RuntimeRegistry::from_config(&SandboxConfig::default())?;
//! let runtime = registry.get_runtime("python").expect("supported");
//! runtime.load().await?;
//! let result = runtime.run("print(1 + 1)", None).await;
//! ```

pub mod compiled;
pub mod config;
pub mod error;
pub mod javascript;
pub mod loader;
pub mod python;
pub mod registry;

pub use compiled::{CompiledRuntime, Dialect, DialectView};
pub use config::SandboxConfig;
pub use error::{Result, RuntimeError};
pub use javascript::JavaScriptRuntime;
pub use loader::ModuleLoader;
pub use python::PythonRuntime;
pub use registry::{RegistryBuilder, RuntimeRegistry};
