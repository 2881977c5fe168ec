pub mod fetch;
pub mod languages;
pub mod run;

pub use fetch::*;
pub use languages::*;
pub use run::*;

use miette::{IntoDiagnostic, WrapErr};
use polyrun_runtime::{RuntimeRegistry, SandboxConfig};
use std::path::Path;

/// Load `polyrun.toml` from `path`, or discover one from the working
/// directory upwards. Defaults apply when none is found.
pub fn load_config(path: Option<&Path>) -> miette::Result<SandboxConfig> {
    match path {
        Some(path) => SandboxConfig::load(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("Failed to load configuration from {}", path.display())),
        None => {
            let cwd = std::env::current_dir()
                .into_diagnostic()
                .wrap_err("Failed to get current directory")?;
            SandboxConfig::discover(&cwd)
                .into_diagnostic()
                .wrap_err("Failed to load discovered configuration")
        }
    }
}

pub(crate) fn build_registry(config: &SandboxConfig) -> miette::Result<RuntimeRegistry> {
    RuntimeRegistry::from_config(config)
        .into_diagnostic()
        .wrap_err("Failed to set up language backends")
}

pub(crate) fn unsupported(language: &str, registry: &RuntimeRegistry) {
    eprintln!(
        "Error: Unsupported language '{}'. Supported: {}",
        language,
        registry.supported_languages().join(", ")
    );
}
