use clap::{Parser, Subcommand};
use polyrun::commands::{RunOptions, load_config, run_code, run_fetch, run_languages};
use polyrun::help::{print_banner, should_show_banner};
use polyrun::logging::{LogOptions, init_logging};
use polyrun_runtime::SandboxConfig;
use starbase::{App, AppResult, AppSession};
use std::path::PathBuf;

/// polyrun - run exercise snippets in a polyglot WebAssembly sandbox
#[derive(Parser)]
#[command(name = "polyrun")]
#[command(about = "Run exercise code in a sandboxed language backend", long_about = None)]
#[command(version)]
#[command(disable_help_flag = true, disable_version_flag = true)]
struct Cli {
    /// Print help
    #[arg(short, long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Print version
    #[arg(short = 'V', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Path to polyrun.toml (discovered from the working directory otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write rotated log files to this directory instead of stderr
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Subcommand)]
enum Commands {
    /// Run a code file and report the result
    Run {
        /// Language id (javascript, python, c, cpp)
        #[arg(short, long)]
        lang: String,
        /// File containing the code to run
        code_file: PathBuf,
        /// Validation script appended after the code
        #[arg(short, long)]
        validation: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List supported languages
    Languages {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download and prepare backends ahead of time
    Fetch {
        /// Only prepare this language
        #[arg(short, long)]
        lang: Option<String>,
    },
}

/// Application session for the polyrun CLI
#[derive(Clone)]
struct PolyrunSession {
    command: Commands,
    config_path: Option<PathBuf>,
    config: SandboxConfig,
}

impl PolyrunSession {
    /// The main execution, passed to [`App::run`].
    async fn dispatch(self) -> AppResult {
        match self.command {
            Commands::Run {
                lang,
                code_file,
                validation,
                json,
            } => {
                run_code(
                    &self.config,
                    RunOptions {
                        language: lang,
                        code_file,
                        validation_file: validation,
                        json,
                    },
                )
                .await
            }
            Commands::Languages { json } => run_languages(&self.config, json),
            Commands::Fetch { lang } => run_fetch(&self.config, lang).await,
        }
    }
}

#[async_trait::async_trait]
impl AppSession for PolyrunSession {
    async fn startup(&mut self) -> AppResult {
        self.config = load_config(self.config_path.as_deref())?;
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> starbase::MainResult {
    let args: Vec<String> = std::env::args().collect();
    if should_show_banner(&args) {
        print_banner();
    }

    let cli = Cli::parse();

    let _log_guard = init_logging(&LogOptions {
        dir: cli.log_dir.clone(),
        json: cli.log_json,
    })
    .map_err(|e| miette::miette!("{:#}", e))?;

    let session = PolyrunSession {
        command: cli.command,
        config_path: cli.config,
        config: SandboxConfig::default(),
    };

    // `AppSession::execute` runs alongside this op, so it must stay a no-op
    let exit_code = App::default()
        .run(session, |session| session.dispatch())
        .await?;

    Ok(std::process::ExitCode::from(exit_code))
}
