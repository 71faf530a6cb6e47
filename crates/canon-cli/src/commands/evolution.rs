//! `canon diff` and `canon patch`

use super::resolve_schema;
use crate::config::CanonConfig;
use anyhow::{Context, Result, bail};
use canon_evolution::{
    DiffOptions, PatchOptions, PatchOutcome, SchemaSide, bump_minor, diff_values, parse_diff,
    patch_transform_with,
};
use canon_runtime::meta::META_FILE_NAME;
use canon_runtime::{
    Checksum, Provenance, TransformId, TransformMeta, TransformSpec, TransformStatus, checksum_bytes,
    load_transform_spec,
};
use chrono::Utc;
use clap::Args;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Old schema (file path or registry URI)
    #[arg(long)]
    pub from: String,

    /// New schema (file path or registry URI)
    #[arg(long)]
    pub to: String,

    /// Edit distance below which a removed/added pair is a rename
    #[arg(long)]
    pub rename_threshold: Option<usize>,
}

#[derive(Debug, Args)]
pub struct PatchArgs {
    /// Transform identifier to patch
    #[arg(short, long)]
    pub transform: String,

    /// Diff JSON produced by `canon diff`
    #[arg(short, long)]
    pub diff: PathBuf,

    /// Which schema of the transform the diff describes (source or target)
    #[arg(long, default_value_t = SchemaSide::Source)]
    pub side: SchemaSide,

    /// Write the result as the next minor version in the registry
    #[arg(long)]
    pub write: bool,
}

pub fn diff(config: &CanonConfig, args: &DiffArgs) -> Result<Value> {
    let from = resolve_schema(config, &args.from)?;
    let to = resolve_schema(config, &args.to)?;
    let options = DiffOptions {
        rename_threshold: args.rename_threshold.unwrap_or(config.rename_threshold),
    };

    let entries = diff_values(&from.content, &to.content, &options);
    info!(from = %from.id, to = %to.id, changes = entries.len(), "Schemas compared");
    Ok(serde_json::to_value(entries)?)
}

pub fn patch(config: &CanonConfig, args: &PatchArgs) -> Result<Value> {
    let spec = load_transform_spec(&args.transform, &config.registry_root)?;
    let diff_text = fs::read_to_string(&args.diff)
        .with_context(|| format!("failed to read diff {}", args.diff.display()))?;
    let entries = parse_diff(&diff_text)?;

    let options = PatchOptions { side: args.side };
    let outcome = patch_transform_with(&spec.body, &entries, &options);
    match &outcome {
        PatchOutcome::Refused {
            blockers, reasons, ..
        } => {
            for reason in reasons {
                eprintln!("blocked: {reason}");
            }
            bail!(
                "patch refused for {}: {} blocking change(s)",
                args.transform,
                blockers.len()
            );
        }
        PatchOutcome::Patched {
            patched, applied, ..
        } if args.write => {
            let written = write_next_version(config, &args.transform, &spec, patched)?;
            Ok(json!({
                "status": "patched",
                "written": written,
                "applied": applied,
            }))
        }
        PatchOutcome::Patched { .. } => Ok(serde_json::to_value(&outcome)?),
    }
}

/// Store `patched` as `{domain}/{name}@{next minor}` next to the source version
fn write_next_version(config: &CanonConfig, transform_id: &str, spec: &TransformSpec, patched: &str) -> Result<Value> {
    let current = TransformId::parse(transform_id)?;
    let next = TransformId {
        version: bump_minor(&current.version)?,
        ..current
    };
    let target_dir = config.registry_root.join(next.relative_dir());
    if target_dir.exists() {
        bail!("{} already exists; refusing to overwrite", target_dir.display());
    }

    let yaml = fs::read_to_string(&spec.meta_path)
        .with_context(|| format!("failed to read {}", spec.meta_path.display()))?;
    let mut meta = TransformMeta::parse(&yaml)?;
    meta.version = bump_minor(&meta.version).unwrap_or_else(|_| next.version.clone());
    meta.checksum = Some(Checksum {
        jsonata_sha256: checksum_bytes(patched.as_bytes()),
    });
    meta.status = TransformStatus::Draft;
    // fixtures stay with the version they were written for
    meta.tests.clear();
    meta.provenance = meta.provenance.map(|provenance| Provenance {
        created_utc: Utc::now(),
        ..provenance
    });

    let body_path = target_dir.join(&meta.spec_path);
    if let Some(parent) = body_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&body_path, patched).with_context(|| format!("failed to write {}", body_path.display()))?;
    let meta_path = target_dir.join(META_FILE_NAME);
    fs::write(&meta_path, meta.to_yaml()?).with_context(|| format!("failed to write {}", meta_path.display()))?;

    info!(transform = %next, "Wrote patched transform");
    Ok(json!({
        "id": next.to_string(),
        "meta_path": meta_path,
        "body_path": body_path,
    }))
}
