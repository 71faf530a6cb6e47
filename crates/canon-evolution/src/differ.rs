//! Schema differ
//!
//! Compares two JSON Schema documents field by field and classifies each
//! difference. Field paths are dot separated; array item fields use `[]`
//! (`lines[].sku`).

use canon_schema::SchemaDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Renames need an edit distance strictly below this by default
pub const DEFAULT_RENAME_THRESHOLD: usize = 4;

/// Classification of a single schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffKind {
    Add,
    Rename,
    Remove,
    TypeChange,
    Complex,
}

impl DiffKind {
    /// Whether the patcher can apply this kind without guessing
    #[must_use]
    pub fn is_mechanical(self) -> bool {
        matches!(self, DiffKind::Add | DiffKind::Rename)
    }
}

impl fmt::Display for DiffKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiffKind::Add => "ADD",
            DiffKind::Rename => "RENAME",
            DiffKind::Remove => "REMOVE",
            DiffKind::TypeChange => "TYPE_CHANGE",
            DiffKind::Complex => "COMPLEX",
        };
        f.write_str(name)
    }
}

/// One classified change between two schemas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub kind: DiffKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_type: Option<String>,

    #[serde(default)]
    pub description: String,
}

impl DiffEntry {
    /// The path used for ordering: `from_path`, else `to_path`
    #[must_use]
    pub fn path(&self) -> &str {
        self.from_path
            .as_deref()
            .or(self.to_path.as_deref())
            .unwrap_or_default()
    }

    fn sort_key(&self) -> (&str, DiffKind) {
        (self.path(), self.kind)
    }
}

impl fmt::Display for DiffEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.path())?;
        if let (Some(_), Some(to)) = (&self.from_path, &self.to_path) {
            if to != self.path() {
                write!(f, " -> {to}")?;
            }
        }
        if !self.description.is_empty() {
            write!(f, ": {}", self.description)?;
        }
        Ok(())
    }
}

/// Differ tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    /// Maximum edit distance (exclusive) for two names to count as a rename
    pub rename_threshold: usize,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            rename_threshold: DEFAULT_RENAME_THRESHOLD,
        }
    }
}

/// Diff two loaded schema documents with default options
#[must_use]
pub fn diff_schemas(from: &SchemaDocument, to: &SchemaDocument) -> Vec<DiffEntry> {
    debug!(from = %from.id, to = %to.id, "Diffing schemas");
    diff_values(&from.content, &to.content, &DiffOptions::default())
}

#[derive(Debug, Clone)]
struct Field {
    ty: String,
    required: bool,
}

impl Field {
    fn is_structured(&self) -> bool {
        self.ty.split('|').any(|t| t == "object" || t == "array")
    }
}

type Fields = BTreeMap<String, Field>;

/// Diff two raw schema values
///
/// The result is sorted by `(from_path or to_path, kind)` and does not
/// depend on property order in either document.
#[must_use]
pub fn diff_values(from: &Value, to: &Value, options: &DiffOptions) -> Vec<DiffEntry> {
    let mut from_fields = Fields::new();
    let mut to_fields = Fields::new();
    flatten(from, "", &mut from_fields);
    flatten(to, "", &mut to_fields);

    let mut entries = Vec::new();

    // fields present on both sides; restructured objects cover their subtree
    let mut restructured: BTreeSet<&str> = BTreeSet::new();
    for (path, old) in &from_fields {
        let Some(new) = to_fields.get(path) else {
            continue;
        };
        if has_ancestor_in(path, &restructured) {
            continue;
        }

        if old.ty != new.ty {
            if old.is_structured() || new.is_structured() {
                restructured.insert(path);
                entries.push(DiffEntry {
                    kind: DiffKind::Complex,
                    from_path: Some(path.clone()),
                    to_path: Some(path.clone()),
                    from_type: Some(old.ty.clone()),
                    to_type: Some(new.ty.clone()),
                    description: format!(
                        "Field '{path}' restructured from {} to {}",
                        old.ty, new.ty
                    ),
                });
            } else {
                entries.push(DiffEntry {
                    kind: DiffKind::TypeChange,
                    from_path: Some(path.clone()),
                    to_path: Some(path.clone()),
                    from_type: Some(old.ty.clone()),
                    to_type: Some(new.ty.clone()),
                    description: format!(
                        "Type of '{path}' changed from {} to {}",
                        old.ty, new.ty
                    ),
                });
            }
        } else if old.required != new.required {
            entries.push(DiffEntry {
                kind: DiffKind::Complex,
                from_path: Some(path.clone()),
                to_path: Some(path.clone()),
                from_type: Some(old.ty.clone()),
                to_type: Some(new.ty.clone()),
                description: format!(
                    "Field '{path}' changed from {} to {}",
                    requiredness(old.required),
                    requiredness(new.required)
                ),
            });
        }
    }

    // one-sided fields, minus those covered by a one-sided or restructured parent
    let one_sided = |own: &Fields, other: &Fields| -> Vec<String> {
        own.keys()
            .filter(|path| !other.contains_key(*path))
            .filter(|path| {
                let parent = parent_path(path);
                parent.is_empty() || other.contains_key(parent)
            })
            .filter(|path| !has_ancestor_in(path, &restructured))
            .cloned()
            .collect()
    };
    let removed = one_sided(&from_fields, &to_fields);
    let added = one_sided(&to_fields, &from_fields);

    let renames = match_renames(&removed, &added, &from_fields, &to_fields, options);
    let mut consumed: BTreeSet<&str> = BTreeSet::new();

    for path in &removed {
        let old = &from_fields[path];
        match renames.get(path.as_str()) {
            Some(RenameMatch::Unique(target)) => {
                let target = *target;
                consumed.insert(target);
                entries.push(DiffEntry {
                    kind: DiffKind::Rename,
                    from_path: Some(path.clone()),
                    to_path: Some(target.to_string()),
                    from_type: Some(old.ty.clone()),
                    to_type: Some(to_fields[target].ty.clone()),
                    description: format!("Renamed field '{path}' to '{target}'"),
                });
            }
            Some(RenameMatch::Ambiguous(target)) => {
                let target = *target;
                consumed.insert(target);
                entries.push(DiffEntry {
                    kind: DiffKind::Complex,
                    from_path: Some(path.clone()),
                    to_path: Some(target.to_string()),
                    from_type: Some(old.ty.clone()),
                    to_type: Some(to_fields[target].ty.clone()),
                    description: format!(
                        "Field '{path}' may have been renamed to '{target}', \
                         but several removed fields match equally well"
                    ),
                });
            }
            None => entries.push(DiffEntry {
                kind: DiffKind::Remove,
                from_path: Some(path.clone()),
                to_path: None,
                from_type: Some(old.ty.clone()),
                to_type: None,
                description: format!(
                    "Removed field '{path}' ({})",
                    requiredness(old.required)
                ),
            }),
        }
    }

    for path in &added {
        if consumed.contains(path.as_str()) {
            continue;
        }
        let new = &to_fields[path];
        entries.push(DiffEntry {
            kind: DiffKind::Add,
            from_path: None,
            to_path: Some(path.clone()),
            from_type: None,
            to_type: Some(new.ty.clone()),
            description: format!("Added field '{path}' ({})", requiredness(new.required)),
        });
    }

    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    debug!(changes = entries.len(), "Schema diff complete");
    entries
}

enum RenameMatch<'a> {
    Unique(&'a str),
    Ambiguous(&'a str),
}

/// Pair removed fields with added siblings of the same type and similar name
///
/// Matching runs in rounds. Each round every unmatched removed field claims
/// its best unclaimed candidate; a field that loses its claim to a closer
/// contender tries again in the next round against the remaining fields.
fn match_renames<'a>(
    removed: &'a [String],
    added: &'a [String],
    from_fields: &Fields,
    to_fields: &Fields,
    options: &DiffOptions,
) -> BTreeMap<&'a str, RenameMatch<'a>> {
    let mut matches = BTreeMap::new();
    let mut claimed: BTreeSet<&'a str> = BTreeSet::new();

    loop {
        // best candidate per removed field: smallest distance, then smallest path
        let mut by_target: BTreeMap<&'a str, Vec<(&'a str, usize)>> = BTreeMap::new();
        for old_path in removed {
            if matches.contains_key(old_path.as_str()) {
                continue;
            }
            let old = &from_fields[old_path];
            let candidate = added
                .iter()
                .filter(|new_path| !claimed.contains(new_path.as_str()))
                .filter(|new_path| parent_path(new_path) == parent_path(old_path))
                .filter(|new_path| to_fields[*new_path].ty == old.ty)
                .filter(|new_path| {
                    !old.is_structured() || same_shape(old_path, from_fields, new_path, to_fields)
                })
                .map(|new_path| {
                    let distance = levenshtein(leaf_name(old_path), leaf_name(new_path));
                    (new_path.as_str(), distance)
                })
                .filter(|(_, distance)| *distance < options.rename_threshold)
                .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));

            if let Some((target, distance)) = candidate {
                by_target
                    .entry(target)
                    .or_default()
                    .push((old_path.as_str(), distance));
            }
        }

        if by_target.is_empty() {
            return matches;
        }

        // an added field claimed by several removed fields goes to the closest;
        // equally close claims cannot be told apart
        for (target, contenders) in by_target {
            let Some(closest) = contenders.iter().map(|(_, d)| *d).min() else {
                continue;
            };
            let winners: Vec<&'a str> = contenders
                .iter()
                .filter(|(_, d)| *d == closest)
                .map(|(path, _)| *path)
                .collect();

            let ambiguous = winners.len() > 1;
            for old_path in winners {
                let found = if ambiguous {
                    RenameMatch::Ambiguous(target)
                } else {
                    RenameMatch::Unique(target)
                };
                matches.insert(old_path, found);
            }
            claimed.insert(target);
        }
    }
}

/// Descendant fields relative to `path`, with types and required flags
fn shape<'a>(path: &str, fields: &'a Fields) -> Vec<(&'a str, &'a str, bool)> {
    fields
        .iter()
        .filter_map(|(p, field)| {
            let rest = p.strip_prefix(path)?;
            (rest.starts_with('.') || rest.starts_with("[]."))
                .then_some((rest, field.ty.as_str(), field.required))
        })
        .collect()
}

fn same_shape(old_path: &str, old_fields: &Fields, new_path: &str, new_fields: &Fields) -> bool {
    shape(old_path, old_fields) == shape(new_path, new_fields)
}

fn flatten(schema: &Value, prefix: &str, out: &mut Fields) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let required: BTreeSet<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, property) in properties {
        let path = format!("{prefix}{name}");
        out.insert(
            path.clone(),
            Field {
                ty: declared_type(property),
                required: required.contains(name.as_str()),
            },
        );

        flatten(property, &format!("{path}."), out);
        if let Some(items) = property.get("items") {
            flatten(items, &format!("{path}[]."), out);
        }
    }
}

/// `type` as written, a sorted `|`-joined union, or inferred from structure
fn declared_type(property: &Value) -> String {
    match property.get("type") {
        Some(Value::String(ty)) => ty.clone(),
        Some(Value::Array(types)) => {
            let mut names: Vec<&str> = types.iter().filter_map(Value::as_str).collect();
            names.sort_unstable();
            names.dedup();
            names.join("|")
        }
        _ if property.get("properties").is_some() => "object".to_string(),
        _ if property.get("items").is_some() => "array".to_string(),
        _ => "any".to_string(),
    }
}

fn requiredness(required: bool) -> &'static str {
    if required { "required" } else { "optional" }
}

/// Parent field path: `a.b` → `a`, `lines[].sku` → `lines`, `a` → ``
fn parent_path(path: &str) -> &str {
    match path.rfind('.') {
        Some(dot) => {
            let parent = &path[..dot];
            parent.strip_suffix("[]").unwrap_or(parent)
        }
        None => "",
    }
}

/// Last segment of a field path
#[must_use]
pub(crate) fn leaf_name(path: &str) -> &str {
    path.rfind('.').map_or(path, |dot| &path[dot + 1..])
}

fn has_ancestor_in(path: &str, set: &BTreeSet<&str>) -> bool {
    let mut current = parent_path(path);
    while !current.is_empty() {
        if set.contains(current) {
            return true;
        }
        current = parent_path(current);
    }
    false
}

/// Levenshtein edit distance over characters
#[must_use]
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}
