//! Compiled-language backend (C and C++)
//!
//! Source is compiled to a WASI command module and executed against the
//! minimal syscall shim from `polyrun-wasi`. One [`CompiledRuntime`] serves
//! both dialects; the registry hands out a [`DialectView`] for `cpp` so both
//! identifiers share a single compiler load.

pub mod compiler;
pub mod toolchain;

pub use compiler::{CompileOutput, CompileRequest, Compiler, CompilerProvider, Dialect};
pub use toolchain::{WasiSdk, WasiSdkProvider};

use async_trait::async_trait;
use polyrun_core::compose::compose_compiled;
use polyrun_core::{BackendKind, CodeRunner, ExecutionError, ExecutionResult, LoadError};
use polyrun_wasi::{GuestStatus, ImportPolicy, Transcript, WasiShim};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};
use wasmtime::{Engine, Module};

const NOT_LOADED: &str = "Compiler not loaded";
const COMPILATION_ERROR: &str = "--- Compilation Error ---";
const COMPILATION_LOG: &str = "--- Compilation Log ---";
const EXECUTION: &str = "--- Execution ---";

/// Output line appended when the guest fails at runtime.
pub(crate) fn runtime_error_line(message: &str) -> String {
    format!("⚠️ Runtime Error: {}", message)
}

/// Shared C / C++ backend.
pub struct CompiledRuntime {
    engine: Engine,
    provider: Arc<dyn CompilerProvider>,
    compiler: OnceCell<Arc<dyn Compiler>>,
    shim: WasiShim,
}

impl CompiledRuntime {
    pub fn new(engine: Engine, provider: Arc<dyn CompilerProvider>, policy: ImportPolicy) -> Self {
        Self {
            engine,
            provider,
            compiler: OnceCell::new(),
            shim: WasiShim::new(policy),
        }
    }

    /// A handle that reports `dialect`'s language and compiles in it, backed
    /// by this instance.
    pub fn dialect_view(self: &Arc<Self>, dialect: Dialect) -> DialectView {
        DialectView {
            runtime: Arc::clone(self),
            dialect,
        }
    }

    async fn ensure_compiler(&self) -> Result<(), LoadError> {
        self.compiler
            .get_or_try_init(|| async {
                info!("Loading C/C++ compiler");
                let compiler = self.provider.provide().await;
                if let Err(e) = &compiler {
                    error!("Failed to load C/C++ compiler: {}", e);
                }
                compiler
            })
            .await
            .map(|_| ())
    }

    /// Compile `code` (plus validation script) as `dialect` and run it.
    pub async fn run_dialect(
        &self,
        dialect: Dialect,
        code: &str,
        validation_script: Option<&str>,
    ) -> ExecutionResult {
        let Some(compiler) = self.compiler.get() else {
            return ExecutionError::NotLoaded(NOT_LOADED.to_string()).into_result(Vec::new());
        };

        let request = CompileRequest {
            source: compose_compiled(code, validation_script),
            dialect,
        };

        let mut output = Vec::new();
        let compiled = match compiler.compile(&request).await {
            Ok(compiled) => compiled,
            Err(e) => {
                output.push(runtime_error_line(&e.to_string()));
                return e.into_result(output);
            }
        };

        let diagnostics = compiled.diagnostics.trim_end().to_string();
        let Some(bytes) = compiled.module else {
            output.push(COMPILATION_ERROR.to_string());
            output.push(diagnostics.clone());
            return ExecutionError::Compile { diagnostics }.into_result(output);
        };
        if !diagnostics.is_empty() {
            output.push(COMPILATION_LOG.to_string());
            output.push(diagnostics);
        }
        output.push(EXECUTION.to_string());

        let engine = self.engine.clone();
        let shim = self.shim;
        let (lines, status) =
            match tokio::task::spawn_blocking(move || execute(&engine, shim, &bytes, output)).await {
                Ok(finished) => finished,
                Err(e) => (Vec::new(), GuestStatus::Trapped(format!("Execution task failed: {}", e))),
            };

        into_result(dialect, lines, status)
    }
}

/// Instantiate and run the module on the current (blocking) thread.
fn execute(
    engine: &Engine,
    shim: WasiShim,
    bytes: &[u8],
    output: Vec<String>,
) -> (Vec<String>, GuestStatus) {
    let module = match Module::new(engine, bytes) {
        Ok(module) => module,
        Err(e) => return (output, GuestStatus::Trapped(format!("Invalid module: {}", e))),
    };
    let outcome = shim.start(engine, &module, Transcript::with_lines(output));
    (outcome.sink.finish(), outcome.status)
}

fn into_result(dialect: Dialect, mut lines: Vec<String>, status: GuestStatus) -> ExecutionResult {
    match status {
        GuestStatus::Returned | GuestStatus::Exited(0) => ExecutionResult::passed(lines),
        GuestStatus::Exited(code) => ExecutionError::NonZeroExit { code }.into_result(lines),
        GuestStatus::Trapped(message) => {
            debug!("{} guest trapped: {}", dialect, message);
            lines.push(runtime_error_line(&message));
            ExecutionError::Trap { message }.into_result(lines)
        }
        GuestStatus::Defect(defect) => {
            error!("{} guest hit a shim defect: {}", dialect, defect);
            let message = defect.to_string();
            lines.push(runtime_error_line(&message));
            ExecutionError::ShimGap { message }.into_result(lines)
        }
    }
}

/// Serves as the `c` backend.
#[async_trait]
impl CodeRunner for CompiledRuntime {
    fn language(&self) -> &str {
        Dialect::C.language()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Compiled
    }

    async fn load(&self) -> Result<(), LoadError> {
        self.ensure_compiler().await
    }

    fn is_loaded(&self) -> bool {
        self.compiler.initialized()
    }

    async fn run(&self, code: &str, validation_script: Option<&str>) -> ExecutionResult {
        self.run_dialect(Dialect::C, code, validation_script).await
    }
}

/// A [`CompiledRuntime`] seen through one dialect.
pub struct DialectView {
    runtime: Arc<CompiledRuntime>,
    dialect: Dialect,
}

#[async_trait]
impl CodeRunner for DialectView {
    fn language(&self) -> &str {
        self.dialect.language()
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Compiled
    }

    async fn load(&self) -> Result<(), LoadError> {
        self.runtime.ensure_compiler().await
    }

    fn is_loaded(&self) -> bool {
        self.runtime.is_loaded()
    }

    async fn run(&self, code: &str, validation_script: Option<&str>) -> ExecutionResult {
        self.runtime.run_dialect(self.dialect, code, validation_script).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A command module that writes `text` to stdout then exits with `code`.
    pub fn printing_guest(text: &str, code: i32) -> String {
        format!(
            r#"(module
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 64) "{data}")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 64))
    (i32.store (i32.const 4) (i32.const {len}))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 8)))
    (call $proc_exit (i32.const {code}))
  )
)"#,
            data = text.replace('\n', "\\n"),
            len = text.len(),
        )
    }

    /// Returns a fixed module for every request and records what it was asked.
    pub struct FixedCompiler {
        pub module: Option<String>,
        pub diagnostics: String,
        pub requests: Mutex<Vec<CompileRequest>>,
    }

    impl FixedCompiler {
        pub fn producing(module: impl Into<String>) -> Self {
            Self {
                module: Some(module.into()),
                diagnostics: String::new(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn rejecting(diagnostics: &str) -> Self {
            Self {
                module: None,
                diagnostics: diagnostics.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn with_diagnostics(mut self, diagnostics: &str) -> Self {
            self.diagnostics = diagnostics.to_string();
            self
        }
    }

    #[async_trait]
    impl Compiler for FixedCompiler {
        async fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, ExecutionError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(CompileOutput {
                module: self.module.clone().map(String::into_bytes),
                diagnostics: self.diagnostics.clone(),
            })
        }
    }

    /// Counts `provide` calls; fails the first `failures` of them.
    pub struct CountingProvider {
        pub compiler: Arc<FixedCompiler>,
        pub calls: AtomicUsize,
        pub failures: usize,
    }

    impl CountingProvider {
        pub fn new(compiler: FixedCompiler) -> Self {
            Self {
                compiler: Arc::new(compiler),
                calls: AtomicUsize::new(0),
                failures: 0,
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CompilerProvider for CountingProvider {
        async fn provide(&self) -> Result<Arc<dyn Compiler>, LoadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if call < self.failures {
                return Err(LoadError::Toolchain("toolchain offline".into()));
            }
            Ok(self.compiler.clone())
        }
    }
}
