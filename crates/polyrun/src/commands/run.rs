//! Run command: execute a code file (plus optional validation script) and
//! report the result.

use super::{build_registry, unsupported};
use miette::{IntoDiagnostic, WrapErr};
use owo_colors::OwoColorize;
use polyrun_core::{ExecutionResult, FailureKind};
use polyrun_runtime::SandboxConfig;
use starbase::AppResult;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub language: String,
    pub code_file: PathBuf,
    pub validation_file: Option<PathBuf>,
    pub json: bool,
}

/// Run the run command
pub async fn run_code(config: &SandboxConfig, options: RunOptions) -> AppResult {
    let registry = build_registry(config)?;
    let Some(runtime) = registry.get_runtime(&options.language) else {
        unsupported(&options.language, &registry);
        return Ok(Some(1));
    };

    let code = read_source(&options.code_file).await?;
    let validation = match &options.validation_file {
        Some(path) => Some(read_source(path).await?),
        None => None,
    };

    let result = match runtime.load().await {
        Ok(()) => {
            debug!("Running {} ({} bytes)", runtime.language(), code.len());
            runtime.run(&code, validation.as_deref()).await
        }
        Err(e) => ExecutionResult::failed(
            Vec::new(),
            format!("Failed to load {} backend: {}", runtime.language(), e),
            FailureKind::Load,
        ),
    };
    info!(
        "{} run finished: success={}",
        runtime.language(),
        result.success
    );

    if options.json {
        let rendered = serde_json::to_string_pretty(&result)
            .into_diagnostic()
            .wrap_err("Failed to serialize result")?;
        println!("{}", rendered);
    } else {
        print_result(&result);
    }

    Ok(if result.success { None } else { Some(1) })
}

async fn read_source(path: &Path) -> miette::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read {}", path.display()))
}

fn print_result(result: &ExecutionResult) {
    for line in &result.output {
        println!("{}", line);
    }
    let status = status_line(result);
    if result.success {
        println!("{}", status.green());
    } else {
        eprintln!("{}", status.red());
    }
}

/// One-line summary shown after the captured output.
pub fn status_line(result: &ExecutionResult) -> String {
    match (&result.error, result.failure) {
        (None, _) => "✓ Passed".to_string(),
        (Some(error), Some(kind)) => format!("✗ Failed ({}): {}", kind, error),
        (Some(error), None) => format!("✗ Failed: {}", error),
    }
}
