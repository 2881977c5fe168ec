//! The compiler seam of the compiled backend.

use async_trait::async_trait;
use polyrun_core::{ExecutionError, LoadError};
use std::sync::Arc;

/// C or C++ flavour of a compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    C,
    Cpp,
}

impl Dialect {
    /// Language identifier reported to callers.
    pub fn language(self) -> &'static str {
        match self {
            Dialect::C => "c",
            Dialect::Cpp => "cpp",
        }
    }

    /// Name of the translation unit written for the compiler.
    pub fn file_name(self) -> &'static str {
        match self {
            Dialect::C => "main.c",
            Dialect::Cpp => "main.cpp",
        }
    }

    /// Clang driver executable.
    pub fn driver(self) -> &'static str {
        match self {
            Dialect::C => "clang",
            Dialect::Cpp => "clang++",
        }
    }

    /// Flags specific to this dialect. wasi-libc has no exception runtime.
    pub fn extra_flags(self) -> &'static [&'static str] {
        match self {
            Dialect::C => &[],
            Dialect::Cpp => &["-fno-exceptions"],
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.language())
    }
}

/// A single translation unit to compile.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub source: String,
    pub dialect: Dialect,
}

/// What the compiler produced.
///
/// `diagnostics` is kept even when a module was produced, since it may hold
/// warnings.
#[derive(Debug, Clone, Default)]
pub struct CompileOutput {
    /// WebAssembly binary (or text) of the compiled program
    pub module: Option<Vec<u8>>,
    pub diagnostics: String,
}

/// Turns source into a WASI command module.
#[async_trait]
pub trait Compiler: Send + Sync {
    /// Compile `request`. An `Err` means the compiler itself could not run,
    /// not that the source was rejected.
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, ExecutionError>;
}

/// Obtains a ready compiler. Called at most once per successful backend load.
#[async_trait]
pub trait CompilerProvider: Send + Sync {
    async fn provide(&self) -> Result<Arc<dyn Compiler>, LoadError>;
}
