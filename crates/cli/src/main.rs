//! Hoteltune CLI
//!
//! Filter raw hotel Q&A data, turn it into tuning records and run a
//! supervised tuning job on Vertex AI.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use hoteltune_core::error::{
    ApiError, ConfigError, DatasetError, ErrorKind, FilterError, TuningError, ValidationError,
};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Clone)]
#[command(author, version, about = "Hoteltune - hotel Q&A data quality and Gemini fine-tuning")]
struct Args {
    /// Log verbosity (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value_t = LogLevel::Info, ignore_case = true, global = true)]
    log_level: LogLevel,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Settings file (defaults to .hoteltune/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Debug,
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Two-stage quality filter: rules, then batched LLM judging
    Filter(commands::FilterArgs),
    /// Convert Q&A pairs into tuning records
    Convert(commands::ConvertArgs),
    /// Split a JSONL file into train and validation sets
    Split(commands::SplitArgs),
    /// Check tuning-format files
    Validate(commands::ValidateArgs),
    /// Upload datasets, submit a tuning job and wait for it
    Tune(commands::TuneArgs),
    /// Show (or wait for) a tuning job
    Status(commands::StatusArgs),
}

fn init_logging(level: LogLevel, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(())
}

/// Classify a failure by the library error underneath any added context.
fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    if let Some(e) = err.downcast_ref::<FilterError>() {
        Some(e.kind())
    } else if let Some(e) = err.downcast_ref::<TuningError>() {
        Some(e.kind())
    } else if let Some(e) = err.downcast_ref::<ApiError>() {
        Some(e.kind())
    } else if err.is::<ConfigError>() {
        Some(ErrorKind::FatalConfig)
    } else if err.is::<DatasetError>() || err.is::<ValidationError>() {
        Some(ErrorKind::Input)
    } else {
        None
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let settings = commands::load_settings(args.config.as_deref()).await?;
    match args.command {
        CliCommand::Filter(cmd) => commands::filter(cmd, settings).await,
        CliCommand::Convert(cmd) => commands::convert(cmd, settings).await,
        CliCommand::Split(cmd) => commands::split(cmd).await,
        CliCommand::Validate(cmd) => commands::validate(cmd).await,
        CliCommand::Tune(cmd) => commands::tune(cmd, settings).await,
        CliCommand::Status(cmd) => commands::status(cmd, settings).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    if let Err(e) = init_logging(args.log_level, args.log_file.as_deref()) {
        eprintln!("error: {:#}", e);
        return ExitCode::from(1);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(ConfigError::Invalid(problems)) = err.downcast_ref::<ConfigError>() {
                for problem in problems {
                    eprintln!("error: {}", problem);
                }
                return ExitCode::from(2);
            }
            eprintln!("error: {:#}", err);
            if let Some(kind) = error_kind(&err) {
                tracing::debug!(?kind, "command failed");
                eprintln!("hint: {}", kind.hint());
            }
            ExitCode::from(1)
        }
    }
}
