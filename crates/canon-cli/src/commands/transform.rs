//! `canon transform ...`

use super::read_json_input;
use crate::config::CanonConfig;
use anyhow::{Result, bail};
use canon_runtime::{
    TransformId, TransformRuntime, compute_checksum, digests_match, discover_transforms, load_transform_spec,
    load_transform_spec_from_path,
};
use clap::{Args, Subcommand};
use serde_json::{Value, json};
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Subcommand)]
pub enum TransformCommand {
    /// Run a transform over a JSON document
    Run(RunArgs),

    /// List transforms in the registry
    List,

    /// Run a transform's golden fixtures
    Test {
        /// Transform identifier, e.g. email/gmail_to_canonical@1-0-0
        id: String,
    },

    /// Compute the body checksum and compare it with the recorded one
    Checksum {
        /// Transform identifier
        id: String,
    },
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Transform identifier, e.g. email/gmail_to_canonical@1-0-0
    pub id: String,

    /// Input JSON file (stdin when omitted)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Treat the input as an array and transform every element
    #[arg(long)]
    pub batch: bool,

    /// Skip input schema validation
    #[arg(long)]
    pub no_validate_input: bool,

    /// Skip output schema validation
    #[arg(long)]
    pub no_validate_output: bool,

    /// Skip checksum verification of the body
    #[arg(long)]
    pub skip_checksum: bool,
}

pub fn execute(config: &CanonConfig, command: &TransformCommand) -> Result<Value> {
    match command {
        TransformCommand::Run(args) => run(config, args),
        TransformCommand::List => list(config),
        TransformCommand::Test { id } => test(config, id),
        TransformCommand::Checksum { id } => checksum(config, id),
    }
}

fn run(config: &CanonConfig, args: &RunArgs) -> Result<Value> {
    let mut options = config.run_options();
    options.validate_input &= !args.no_validate_input;
    options.validate_output &= !args.no_validate_output;
    options.verify_checksum &= !args.skip_checksum;

    let input = read_json_input(args.input.as_deref())?;
    let runtime = TransformRuntime::default();

    if args.batch {
        let Value::Array(items) = input else {
            bail!("--batch expects a JSON array of documents");
        };
        return Ok(Value::Array(runtime.run_batch(&args.id, &items, &options)?));
    }
    Ok(runtime.run_transform(&args.id, &input, &options)?)
}

fn list(config: &CanonConfig) -> Result<Value> {
    let root = &config.registry_root;
    let mut entries = Vec::new();

    for meta_path in discover_transforms(root)? {
        let Some(id) = TransformId::from_meta_path(root, &meta_path) else {
            warn!(path = %meta_path.display(), "Sidecar outside the transforms/{{domain}}/{{name}}/{{version}} layout");
            continue;
        };
        match load_transform_spec_from_path(&meta_path) {
            Ok(spec) => entries.push(json!({
                "id": id.to_string(),
                "status": spec.status,
                "from_schema": spec.source_schema.to_string(),
                "to_schema": spec.target_schema.to_string(),
                "checksum": spec.checksum.is_some(),
            })),
            Err(err) => warn!(transform = %id, error = %err, "Skipping unreadable transform"),
        }
    }

    Ok(Value::Array(entries))
}

fn test(config: &CanonConfig, id: &str) -> Result<Value> {
    let spec = load_transform_spec(id, &config.registry_root)?;
    let reports = TransformRuntime::default().check_fixtures(&spec, &config.run_options())?;
    let failed = reports.iter().filter(|report| !report.passed()).count();

    let summary = json!({
        "id": id,
        "passed": reports.len() - failed,
        "failed": failed,
        "fixtures": reports,
    });
    if failed > 0 {
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
        bail!("{failed} of {} fixture(s) failed for {id}", reports.len());
    }
    Ok(summary)
}

fn checksum(config: &CanonConfig, id: &str) -> Result<Value> {
    let spec = load_transform_spec(id, &config.registry_root)?;
    let actual = compute_checksum(&spec.body_path)?;
    let matches = spec
        .checksum
        .as_deref()
        .is_some_and(|recorded| digests_match(&actual, recorded));

    Ok(json!({
        "id": id,
        "body_path": spec.body_path,
        "sha256": actual,
        "recorded": spec.checksum,
        "matches": matches,
    }))
}
