//! `canon validate`

use super::{read_json_input, resolve_schema};
use crate::config::CanonConfig;
use anyhow::Result;
use canon_validation::{ValidationContext, create_validator};
use clap::Args;
use serde_json::{Value, json};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Schema URI resolved in the registry, or a path to a schema file
    #[arg(short, long)]
    pub schema: String,

    /// Document to validate (stdin when omitted)
    #[arg(short, long)]
    pub data: Option<PathBuf>,
}

pub fn execute(config: &CanonConfig, args: &ValidateArgs) -> Result<Value> {
    let document = resolve_schema(config, &args.schema)?;
    let data = read_json_input(args.data.as_deref())?;

    create_validator(&document.content)?.validate(&data, ValidationContext::Input)?;
    Ok(json!({"valid": true, "schema": document.id}))
}
