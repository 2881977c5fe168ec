//! Fetch command: prepare backends ahead of the first run.

use super::{build_registry, unsupported};
use owo_colors::OwoColorize;
use polyrun_core::LoadError;
use polyrun_runtime::SandboxConfig;
use starbase::AppResult;

/// Run the fetch command
pub async fn run_fetch(config: &SandboxConfig, language: Option<String>) -> AppResult {
    let registry = build_registry(config)?;

    let outcomes: Vec<(String, Result<(), LoadError>)> = match language {
        Some(language) => {
            let Some(runtime) = registry.get_runtime(&language) else {
                unsupported(&language, &registry);
                return Ok(Some(1));
            };
            vec![(runtime.language().to_string(), runtime.load().await)]
        }
        None => registry.load_all().await,
    };

    let mut failed = false;
    for (language, outcome) in &outcomes {
        match outcome {
            Ok(()) => println!("{} {}", "✓".green(), language),
            Err(e) => {
                failed = true;
                eprintln!("{} {}: {}", "✗".red(), language, e);
            }
        }
    }

    Ok(if failed { Some(1) } else { None })
}
