//! # canon
//!
//! Command-line interface for the Canon transform registry.
//!
//! Results go to stdout as JSON, diagnostics and logs to stderr. The exit
//! code is non-zero on any failure, and stdout stays empty in that case.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::evolution::{DiffArgs, PatchArgs};
use commands::transform::TransformCommand;
use commands::validate::ValidateArgs;
use config::{CanonConfig, REGISTRY_ENV};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "canon")]
#[command(about = "Canon transform registry CLI")]
#[command(version)]
struct Cli {
    /// Path to configuration file (defaults to ./canon.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Registry root (overrides the config file and CANON_REGISTRY)
    #[arg(short, long, global = true)]
    registry: Option<PathBuf>,

    /// Log more (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run, list, test, and checksum registry transforms
    #[command(subcommand)]
    Transform(TransformCommand),

    /// Validate a JSON document against a schema
    Validate(ValidateArgs),

    /// Classify the changes between two schemas
    Diff(DiffArgs),

    /// Apply a diff to a transform body
    Patch(PatchArgs),
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<Value> {
    let config = CanonConfig::load(cli.config.as_deref())?
        .with_overrides(std::env::var(REGISTRY_ENV).ok(), cli.registry);
    debug!(registry = %config.registry_root.display(), "Resolved configuration");

    match &cli.command {
        Commands::Transform(command) => commands::transform::execute(&config, command),
        Commands::Validate(args) => commands::validate::execute(&config, args),
        Commands::Diff(args) => commands::evolution::diff(&config, args),
        Commands::Patch(args) => commands::evolution::patch(&config, args),
    }
}

fn print_json(document: &Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(document)?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{text}")?;
    stdout.flush()?;
    Ok(())
}

fn report(err: &anyhow::Error) {
    eprintln!("error: {err:#}");

    let validation = err
        .downcast_ref::<canon_validation::ValidationError>()
        .or_else(|| match err.downcast_ref::<canon_runtime::Error>() {
            Some(canon_runtime::Error::Validation(validation)) => Some(validation),
            _ => None,
        });
    if let Some(validation) = validation {
        for violation in &validation.violations {
            eprintln!("  {violation}");
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).and_then(|document| print_json(&document)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}
