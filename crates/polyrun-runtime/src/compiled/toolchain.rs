//! wasi-sdk clang as the compiled backend's compiler.

use super::compiler::{CompileOutput, CompileRequest, Compiler, CompilerProvider};
use crate::config::CompilerConfig;
use crate::loader::{ModuleLoader, cache_id};
use async_trait::async_trait;
use polyrun_core::{ExecutionError, LoadError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info};

const MODULE_FILE: &str = "main.wasm";

/// A wasi-sdk install: `bin/clang`, `bin/clang++` and `share/wasi-sysroot`.
#[derive(Debug, Clone)]
pub struct WasiSdk {
    root: PathBuf,
    target: String,
    opt_level: String,
}

impl WasiSdk {
    pub fn new(root: PathBuf, config: &CompilerConfig) -> Self {
        Self {
            root,
            target: config.target.clone(),
            opt_level: config.opt_level.clone(),
        }
    }

    /// Find the install root at `dir` or one level below it, as release
    /// archives wrap everything in a versioned directory.
    pub fn locate(dir: &Path) -> Option<PathBuf> {
        if dir.join("bin").join("clang").is_file() {
            return Some(dir.to_path_buf());
        }
        std::fs::read_dir(dir)
            .ok()?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| path.join("bin").join("clang").is_file())
    }

    fn sysroot(&self) -> PathBuf {
        self.root.join("share").join("wasi-sysroot")
    }
}

#[async_trait]
impl Compiler for WasiSdk {
    async fn compile(&self, request: &CompileRequest) -> Result<CompileOutput, ExecutionError> {
        let workdir = tempfile::tempdir().map_err(|e| ExecutionError::Trap {
            message: format!("Failed to create build directory: {}", e),
        })?;
        let file_name = request.dialect.file_name();
        tokio::fs::write(workdir.path().join(file_name), &request.source)
            .await
            .map_err(|e| ExecutionError::Trap {
                message: format!("Failed to write {}: {}", file_name, e),
            })?;

        let driver = self.root.join("bin").join(request.dialect.driver());
        debug!("Compiling {} with {:?}", request.dialect, driver);

        // Relative paths keep the temp directory out of diagnostics.
        let output = Command::new(&driver)
            .current_dir(workdir.path())
            .arg(format!("--target={}", self.target))
            .arg(format!("--sysroot={}", self.sysroot().display()))
            .arg(&self.opt_level)
            .args(request.dialect.extra_flags())
            .args(["-o", MODULE_FILE, file_name])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExecutionError::Trap {
                message: format!("Failed to invoke {}: {}", driver.display(), e),
            })?;

        let diagnostics = String::from_utf8_lossy(&output.stderr).trim_end().to_string();
        if !output.status.success() {
            debug!("Compiler exited with {}", output.status);
            return Ok(CompileOutput {
                module: None,
                diagnostics,
            });
        }

        let module = tokio::fs::read(workdir.path().join(MODULE_FILE))
            .await
            .map_err(|e| ExecutionError::Trap {
                message: format!("Compiler produced no module: {}", e),
            })?;
        Ok(CompileOutput {
            module: Some(module),
            diagnostics,
        })
    }
}

/// Provides a [`WasiSdk`] from a configured install or a cached download.
pub struct WasiSdkProvider {
    config: CompilerConfig,
    loader: Arc<ModuleLoader>,
}

impl WasiSdkProvider {
    pub fn new(config: CompilerConfig, loader: Arc<ModuleLoader>) -> Self {
        Self { config, loader }
    }
}

#[async_trait]
impl CompilerProvider for WasiSdkProvider {
    async fn provide(&self) -> Result<Arc<dyn Compiler>, LoadError> {
        let dir = match &self.config.path {
            Some(path) => path.clone(),
            None => {
                self.loader
                    .fetch_archive(&cache_id(&self.config.url), &self.config.url)
                    .await?
            }
        };

        let root = WasiSdk::locate(&dir).ok_or_else(|| {
            LoadError::Toolchain(format!("No wasi-sdk clang found under {:?}", dir))
        })?;
        info!("Using wasi-sdk at {:?}", root);
        Ok(Arc::new(WasiSdk::new(root, &self.config)))
    }
}
