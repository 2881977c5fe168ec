//! Interpreted-language backend: CPython compiled to WASI.
//!
//! The interpreter module is fetched and compiled once, then instantiated
//! per run under wasmtime-wasi's full preview 1 context with in-memory
//! stdout/stderr pipes. The program is passed as `python -c <source>`.

use crate::config::PythonConfig;
use crate::loader::{ModuleLoader, cache_id};
use async_trait::async_trait;
use polyrun_core::compose::compose_script;
use polyrun_core::{BackendKind, CodeRunner, ExecutionError, ExecutionResult, LoadError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info};
use wasmtime::{Engine, Linker, Module, Store};
use wasmtime_wasi::p1::{self, WasiP1Ctx};
use wasmtime_wasi::p2::pipe::MemoryOutputPipe;
use wasmtime_wasi::{DirPerms, FilePerms, I32Exit, WasiCtxBuilder};

const SUCCESS_LINE: &str = "✅ Python tests passed!";
const ASSERTION_FAILED: &str = "Test Assertion Failed.";

/// Per-stream capture limit.
const PIPE_CAPACITY: usize = 1024 * 1024;

/// Where the interpreter module comes from.
#[async_trait]
pub trait ModuleSource: Send + Sync {
    /// Bytes of the interpreter module.
    async fn fetch(&self) -> Result<Vec<u8>, LoadError>;
}

/// The interpreter named by the `[python]` configuration section.
pub struct ConfiguredInterpreter {
    config: PythonConfig,
    loader: Arc<ModuleLoader>,
}

impl ConfiguredInterpreter {
    pub fn new(config: PythonConfig, loader: Arc<ModuleLoader>) -> Self {
        Self { config, loader }
    }
}

#[async_trait]
impl ModuleSource for ConfiguredInterpreter {
    async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
        let path = match &self.config.path {
            Some(path) => self.loader.load_from_path(path).await?,
            None => {
                self.loader
                    .fetch_module(&cache_id(&self.config.url), &self.config.url)
                    .await?
            }
        };
        Ok(tokio::fs::read(&path).await?)
    }
}

/// Python backend.
pub struct PythonRuntime {
    engine: Engine,
    source: Arc<dyn ModuleSource>,
    preload: Vec<String>,
    lib_dir: Option<PathBuf>,
    module: OnceCell<Module>,
}

impl PythonRuntime {
    pub fn new(engine: Engine, source: Arc<dyn ModuleSource>) -> Self {
        Self {
            engine,
            source,
            preload: Vec::new(),
            lib_dir: None,
            module: OnceCell::new(),
        }
    }

    pub fn from_config(engine: Engine, config: &PythonConfig, loader: Arc<ModuleLoader>) -> Self {
        let source = Arc::new(ConfiguredInterpreter::new(config.clone(), loader));
        Self::new(engine, source)
            .with_preload(config.preload.clone())
            .with_lib_dir(config.lib_dir.clone())
    }

    /// Modules imported by the warm-up probe at load time.
    pub fn with_preload(mut self, preload: Vec<String>) -> Self {
        self.preload = preload;
        self
    }

    pub fn with_lib_dir(mut self, lib_dir: Option<PathBuf>) -> Self {
        self.lib_dir = lib_dir;
        self
    }

    async fn ensure_module(&self) -> Result<&Module, LoadError> {
        self.module
            .get_or_try_init(|| async {
                info!("Loading Python interpreter");
                let module = self.compile_and_probe().await;
                if let Err(e) = &module {
                    error!("Failed to load Python interpreter: {}", e);
                }
                module
            })
            .await
    }

    async fn compile_and_probe(&self) -> Result<Module, LoadError> {
        let bytes = self.source.fetch().await?;
        let engine = self.engine.clone();
        let module = tokio::task::spawn_blocking(move || Module::new(&engine, &bytes))
            .await
            .map_err(|e| LoadError::InvalidModule(e.to_string()))?
            .map_err(|e| LoadError::InvalidModule(e.to_string()))?;

        if !self.preload.is_empty() {
            let probe = format!("import {}", self.preload.join(", "));
            debug!("Probing interpreter: {}", probe);
            let interpretation = self.interpret(module.clone(), probe).await;
            if !interpretation.succeeded() {
                return Err(LoadError::Probe(interpretation.failure_message()));
            }
        }
        Ok(module)
    }

    async fn interpret(&self, module: Module, program: String) -> Interpretation {
        let engine = self.engine.clone();
        let lib_dir = self.lib_dir.clone();
        tokio::task::spawn_blocking(move || interpret(&engine, &module, &program, lib_dir))
            .await
            .unwrap_or_else(|e| Interpretation::crashed(format!("Interpreter task failed: {}", e)))
    }
}

#[async_trait]
impl CodeRunner for PythonRuntime {
    fn language(&self) -> &str {
        "python"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Interpreted
    }

    async fn load(&self) -> Result<(), LoadError> {
        self.ensure_module().await.map(|_| ())
    }

    fn is_loaded(&self) -> bool {
        self.module.initialized()
    }

    async fn run(&self, code: &str, validation_script: Option<&str>) -> ExecutionResult {
        let module = match self.ensure_module().await {
            Ok(module) => module.clone(),
            Err(e) => return ExecutionError::NotLoaded(e.to_string()).into_result(Vec::new()),
        };

        let interpretation = self
            .interpret(module, compose_script(code, validation_script))
            .await;
        interpretation.into_result()
    }
}

/// Captured streams and exit status of one interpreter run.
#[derive(Debug)]
struct Interpretation {
    stdout: String,
    stderr: String,
    /// Exit code, or the trap that stopped the interpreter
    status: Result<i32, String>,
}

impl Interpretation {
    fn crashed(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            status: Err(message),
        }
    }

    fn succeeded(&self) -> bool {
        matches!(self.status, Ok(0))
    }

    /// The learner-facing error: the last traceback line, with assertion
    /// failures normalized.
    fn failure_message(&self) -> String {
        if self.stderr.contains("AssertionError") {
            return ASSERTION_FAILED.to_string();
        }
        if let Some(last) = self.stderr.lines().map(str::trim).rfind(|line| !line.is_empty()) {
            return last.to_string();
        }
        match &self.status {
            Ok(code) => format!("Python exited with code {}", code),
            Err(trap) => trap.clone(),
        }
    }

    fn into_result(self) -> ExecutionResult {
        let mut output: Vec<String> = self.stdout.lines().map(String::from).collect();

        if self.succeeded() {
            output.extend(
                self.stderr
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(String::from),
            );
            output.push(SUCCESS_LINE.to_string());
            return ExecutionResult::passed(output);
        }

        let message = self.failure_message();
        debug!("Python run failed: {}", message);
        ExecutionError::Trap { message }.into_result(output)
    }
}

fn interpret(engine: &Engine, module: &Module, program: &str, lib_dir: Option<PathBuf>) -> Interpretation {
    let stdout = MemoryOutputPipe::new(PIPE_CAPACITY);
    let stderr = MemoryOutputPipe::new(PIPE_CAPACITY);
    let status = start(engine, module, program, lib_dir, stdout.clone(), stderr.clone());

    Interpretation {
        stdout: String::from_utf8_lossy(&stdout.contents()).into_owned(),
        stderr: String::from_utf8_lossy(&stderr.contents()).into_owned(),
        status,
    }
}

fn start(
    engine: &Engine,
    module: &Module,
    program: &str,
    lib_dir: Option<PathBuf>,
    stdout: MemoryOutputPipe,
    stderr: MemoryOutputPipe,
) -> Result<i32, String> {
    let mut builder = WasiCtxBuilder::new();
    builder
        .stdout(stdout)
        .stderr(stderr)
        .args(&["python", "-c", program]);
    if let Some(dir) = lib_dir {
        builder
            .preopened_dir(&dir, "/usr/local/lib", DirPerms::READ, FilePerms::READ)
            .map_err(|e| format!("Failed to expose {:?}: {}", dir, e))?;
    }

    let mut store = Store::new(engine, builder.build_p1());
    let mut linker: Linker<WasiP1Ctx> = Linker::new(engine);
    p1::add_to_linker_sync(&mut linker, |ctx: &mut WasiP1Ctx| ctx)
        .map_err(|e| format!("Failed to link WASI: {}", e))?;

    let instance = linker
        .instantiate(&mut store, module)
        .map_err(|e| format!("Failed to instantiate interpreter: {}", e))?;
    let entry = instance
        .get_typed_func::<(), ()>(&mut store, "_start")
        .map_err(|e| format!("Interpreter has no _start entry point: {}", e))?;

    match entry.call(&mut store, ()) {
        Ok(()) => Ok(0),
        Err(e) => match e.downcast_ref::<I32Exit>() {
            Some(exit) => Ok(exit.0),
            None => Err(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyrun_core::FailureKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Stands in for CPython: writes fixed text to stdout and stderr, then
    /// exits with a fixed code, whatever program it is given.
    fn fake_interpreter(stdout: &str, stderr: &str, code: i32) -> String {
        format!(
            r#"(module
  (import "wasi_snapshot_preview1" "fd_write" (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "proc_exit" (func $proc_exit (param i32)))
  (memory (export "memory") 1)
  (data (i32.const 1024) "{out}")
  (data (i32.const 4096) "{err}")
  (func (export "_start")
    (i32.store (i32.const 0) (i32.const 1024))
    (i32.store (i32.const 4) (i32.const {out_len}))
    (i32.store (i32.const 8) (i32.const 4096))
    (i32.store (i32.const 12) (i32.const {err_len}))
    (drop (call $fd_write (i32.const 1) (i32.const 0) (i32.const 1) (i32.const 16)))
    (drop (call $fd_write (i32.const 2) (i32.const 8) (i32.const 1) (i32.const 16)))
    (call $proc_exit (i32.const {code}))
  )
)"#,
            out = wat_bytes(stdout),
            err = wat_bytes(stderr),
            out_len = stdout.len(),
            err_len = stderr.len(),
        )
    }

    /// Every byte as a WAT `\xx` escape, so quotes and newlines survive.
    fn wat_bytes(text: &str) -> String {
        text.bytes().map(|b| format!("\\{:02x}", b)).collect()
    }

    struct StaticModule {
        wat: String,
        fetches: AtomicUsize,
        failures: usize,
    }

    impl StaticModule {
        fn new(wat: String) -> Arc<Self> {
            Arc::new(Self {
                wat,
                fetches: AtomicUsize::new(0),
                failures: 0,
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModuleSource for StaticModule {
        async fn fetch(&self) -> Result<Vec<u8>, LoadError> {
            let call = self.fetches.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(LoadError::Fetch {
                    url: "https://example.invalid/python.wasm".into(),
                    message: "offline".into(),
                });
            }
            Ok(self.wat.clone().into_bytes())
        }
    }

    fn runtime(source: Arc<StaticModule>) -> PythonRuntime {
        PythonRuntime::new(Engine::default(), source)
    }

    #[tokio::test]
    async fn test_success_appends_warnings_and_marker() {
        let source = StaticModule::new(fake_interpreter(
            "hello\nworld\n",
            "DeprecationWarning: old api\n",
            0,
        ));
        let python = runtime(source.clone());

        let result = python.run("print('hello')", None).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(
            result.output,
            vec!["hello", "world", "DeprecationWarning: old api", SUCCESS_LINE]
        );
        assert!(python.is_loaded());
    }

    #[tokio::test]
    async fn test_assertion_error_is_normalized() {
        let stderr = "Traceback (most recent call last):\n  File \"<string>\", line 3, in <module>\nAssertionError: expected 4\n";
        let source = StaticModule::new(fake_interpreter(
            "❌ Test Failed: Expected A, Got B\n",
            stderr,
            1,
        ));

        let result = runtime(source).run("bad_code()", Some("assert f() == 4")).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some(ASSERTION_FAILED));
        assert_eq!(result.failure, Some(FailureKind::Runtime));
        assert_eq!(result.output, vec!["❌ Test Failed: Expected A, Got B"]);
    }

    #[tokio::test]
    async fn test_last_traceback_line_is_error() {
        let stderr = "Traceback (most recent call last):\n  File \"<string>\", line 1, in <module>\nZeroDivisionError: division by zero\n";
        let source = StaticModule::new(fake_interpreter("", stderr, 1));

        let result = runtime(source).run("1/0", None).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("ZeroDivisionError: division by zero"));
        assert!(result.output.is_empty());
    }

    #[tokio::test]
    async fn test_quotes_and_backslashes_in_output() {
        let source = StaticModule::new(fake_interpreter("say \"hi\" \\o/\n", "", 0));

        let result = runtime(source).run("print('say \"hi\" \\\\o/')", None).await;

        assert!(result.success, "{:?}", result);
        assert_eq!(result.output, vec!["say \"hi\" \\o/", SUCCESS_LINE]);
    }

    #[tokio::test]
    async fn test_run_loads_once() {
        let source = StaticModule::new(fake_interpreter("x\n", "", 0));
        let python = runtime(source.clone());

        python.run("print('x')", None).await;
        python.run("print('x')", None).await;
        python.load().await.unwrap();

        assert_eq!(source.fetches(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_retryable() {
        let source = Arc::new(StaticModule {
            wat: fake_interpreter("x\n", "", 0),
            fetches: AtomicUsize::new(0),
            failures: 1,
        });
        let python = runtime(source.clone());

        assert!(matches!(python.load().await, Err(LoadError::Fetch { .. })));
        assert!(!python.is_loaded());

        let result = python.run("print('x')", None).await;
        assert!(result.success);
        assert_eq!(source.fetches(), 2);
    }

    #[tokio::test]
    async fn test_failing_probe_is_load_error() {
        let source = StaticModule::new(fake_interpreter(
            "",
            "ModuleNotFoundError: No module named 'numpy'\n",
            1,
        ));
        let python = runtime(source).with_preload(vec!["numpy".into()]);

        let err = python.load().await.unwrap_err();

        assert!(matches!(err, LoadError::Probe(ref m) if m.contains("numpy")), "{:?}", err);
        assert!(!python.is_loaded());
    }

    #[tokio::test]
    async fn test_run_reports_load_failure() {
        let source = StaticModule::new("not a module".to_string());

        let result = runtime(source).run("print(1)", None).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::Load));
    }

    #[test]
    fn test_failure_message_without_stderr() {
        let interpretation = Interpretation {
            stdout: String::new(),
            stderr: String::new(),
            status: Ok(2),
        };
        assert_eq!(interpretation.failure_message(), "Python exited with code 2");
    }
}
