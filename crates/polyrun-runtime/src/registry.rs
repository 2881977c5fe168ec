//! Language id to backend lookup.

use crate::compiled::{CompiledRuntime, Dialect, WasiSdkProvider};
use crate::config::SandboxConfig;
use crate::error::Result;
use crate::javascript::JavaScriptRuntime;
use crate::loader::ModuleLoader;
use crate::python::PythonRuntime;
use indexmap::IndexMap;
use polyrun_core::{CodeRunner, LoadError};
use polyrun_wasi::ImportPolicy;
use std::sync::Arc;
use tracing::{info, warn};
use wasmtime::Engine;

/// Owns one long-lived backend per language.
///
/// Lookups are case-insensitive. `c` and `cpp` resolve to handles over the
/// same compiled backend instance.
pub struct RuntimeRegistry {
    runtimes: IndexMap<String, Arc<dyn CodeRunner>>,
}

impl RuntimeRegistry {
    /// Standard backends configured from `config`: javascript, python, c, cpp.
    pub fn from_config(config: &SandboxConfig) -> Result<Self> {
        let engine = Engine::default();
        let loader = Arc::new(ModuleLoader::from_config(config)?);

        let policy = if config.compiler.strict_imports {
            ImportPolicy::Strict
        } else {
            ImportPolicy::TrapOnCall
        };
        let compiled = Arc::new(CompiledRuntime::new(
            engine.clone(),
            Arc::new(WasiSdkProvider::new(config.compiler.clone(), loader.clone())),
            policy,
        ));
        let python = PythonRuntime::from_config(engine, &config.python, loader);

        Ok(Self::builder()
            .runtime(Arc::new(JavaScriptRuntime::new()))
            .runtime(Arc::new(python))
            .compiled(compiled)
            .build())
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Backend for `language`, if supported.
    pub fn get_runtime(&self, language: &str) -> Option<Arc<dyn CodeRunner>> {
        self.runtimes.get(&language.to_lowercase()).cloned()
    }

    pub fn is_supported(&self, language: &str) -> bool {
        self.runtimes.contains_key(&language.to_lowercase())
    }

    /// Supported language ids in registration order.
    pub fn supported_languages(&self) -> Vec<&str> {
        self.runtimes.keys().map(String::as_str).collect()
    }

    /// Load every backend, reporting each language's outcome. Backends
    /// shared between languages are only initialized once.
    pub async fn load_all(&self) -> Vec<(String, std::result::Result<(), LoadError>)> {
        let mut outcomes = Vec::with_capacity(self.runtimes.len());
        for (language, runtime) in &self.runtimes {
            let outcome = runtime.load().await;
            match &outcome {
                Ok(()) => info!("Loaded {} backend", language),
                Err(e) => warn!("Failed to load {} backend: {}", language, e),
            }
            outcomes.push((language.clone(), outcome));
        }
        outcomes
    }
}

/// Assembles a [`RuntimeRegistry`] from pre-built backends.
#[derive(Default)]
pub struct RegistryBuilder {
    runtimes: IndexMap<String, Arc<dyn CodeRunner>>,
}

impl RegistryBuilder {
    /// Register `runtime` under its own language id.
    pub fn runtime(mut self, runtime: Arc<dyn CodeRunner>) -> Self {
        self.runtimes
            .insert(runtime.language().to_lowercase(), runtime);
        self
    }

    /// Register a compiled backend as both `c` and `cpp`.
    pub fn compiled(self, runtime: Arc<CompiledRuntime>) -> Self {
        let cpp = Arc::new(runtime.dialect_view(Dialect::Cpp));
        self.runtime(runtime).runtime(cpp)
    }

    pub fn build(self) -> RuntimeRegistry {
        RuntimeRegistry {
            runtimes: self.runtimes,
        }
    }
}
