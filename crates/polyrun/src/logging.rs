//! Subscriber setup. Logs go to stderr, or to a daily-rotated file when a
//! log directory is given, so stdout stays reserved for run output.

use anyhow::Context;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "POLYRUN_LOG";

const DEFAULT_DIRECTIVES: &str = "warn";
const LOG_FILE_PREFIX: &str = "polyrun.log";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Directory for rotated log files
    pub dir: Option<PathBuf>,
    /// Emit one JSON object per event
    pub json: bool,
}

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop and must be held until exit.
pub fn init_logging(options: &LogOptions) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::new(directives(std::env::var(LOG_ENV).ok()));

    let Some(dir) = &options.dir else {
        let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
        if options.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        }
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;
        return Ok(None);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false);
    if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    Ok(Some(guard))
}

fn directives(from_env: Option<String>) -> String {
    from_env
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}
