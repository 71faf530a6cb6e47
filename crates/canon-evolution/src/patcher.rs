//! Transform patcher
//!
//! Applies `ADD` and `RENAME` diff entries to transform source using the
//! expression lexer, so edits land on exact tokens. Every other kind of
//! change is refused and the source is handed back untouched.
//!
//! A rename edits one side of the transform only. A diff of the source
//! schema rewrites the input paths that reference the field; a diff of the
//! target schema rewrites the output keys that produce it.

use crate::differ::{DiffEntry, DiffKind, leaf_name};
use crate::{Error, Result};
use canon_mapping::lexer::{Token, TokenKind, is_bare_name, tokenize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// The schema of a transform that a diff was computed for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaSide {
    /// Input schema; renames rewrite path references
    #[default]
    Source,
    /// Output schema; renames rewrite object constructor keys
    Target,
}

impl fmt::Display for SchemaSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaSide::Source => f.write_str("source"),
            SchemaSide::Target => f.write_str("target"),
        }
    }
}

impl FromStr for SchemaSide {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" => Ok(SchemaSide::Source),
            "target" => Ok(SchemaSide::Target),
            other => Err(Error::InvalidSide(other.to_string())),
        }
    }
}

/// Patcher tuning
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchOptions {
    pub side: SchemaSide,
}

/// Version increment implied by a successful patch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VersionBump {
    Minor,
}

/// Result of a patch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PatchOutcome {
    /// Every entry applied mechanically
    Patched {
        patched: String,
        version_bump: VersionBump,
        applied: Vec<DiffEntry>,
    },
    /// Nothing applied; `source` is the input byte for byte
    Refused {
        source: String,
        blockers: Vec<DiffEntry>,
        reasons: Vec<String>,
    },
}

impl PatchOutcome {
    #[must_use]
    pub fn is_patched(&self) -> bool {
        matches!(self, PatchOutcome::Patched { .. })
    }

    /// Patched source, or the untouched original when refused
    #[must_use]
    pub fn source_text(&self) -> &str {
        match self {
            PatchOutcome::Patched { patched, .. } => patched,
            PatchOutcome::Refused { source, .. } => source,
        }
    }

    fn refuse(source: &str, blockers: Vec<DiffEntry>, reasons: Vec<String>) -> Self {
        PatchOutcome::Refused {
            source: source.to_string(),
            blockers,
            reasons,
        }
    }
}

/// Patch transform source for a diff of its source schema
#[must_use]
pub fn patch_transform(source: &str, diff: &[DiffEntry]) -> PatchOutcome {
    patch_transform_with(source, diff, &PatchOptions::default())
}

/// Patch transform source for a schema diff
///
/// Renames are applied before additions. Any entry that is not `ADD` or
/// `RENAME`, or that cannot be located in the source, refuses the whole
/// patch.
#[must_use]
pub fn patch_transform_with(source: &str, diff: &[DiffEntry], options: &PatchOptions) -> PatchOutcome {
    if diff.is_empty() {
        return PatchOutcome::refuse(source, Vec::new(), vec!["no changes".to_string()]);
    }

    let blockers: Vec<DiffEntry> = diff
        .iter()
        .filter(|entry| !entry.kind.is_mechanical())
        .cloned()
        .collect();
    if !blockers.is_empty() {
        let reasons = blockers
            .iter()
            .map(|entry| format!("{entry} requires manual review"))
            .collect();
        info!(blockers = blockers.len(), "Refusing patch with non-mechanical changes");
        return PatchOutcome::refuse(source, blockers, reasons);
    }

    let renames = diff.iter().filter(|e| e.kind == DiffKind::Rename);
    let adds = diff.iter().filter(|e| e.kind == DiffKind::Add);

    let mut patched = source.to_string();
    for entry in renames.chain(adds) {
        let step = match entry.kind {
            DiffKind::Rename => match options.side {
                SchemaSide::Source => rename_references(&patched, entry),
                SchemaSide::Target => rename_keys(&patched, entry),
            },
            _ => apply_add(&patched, entry),
        };
        match step {
            Ok(next) => patched = next,
            Err(reason) => {
                warn!(entry = %entry, reason = %reason, "Patch step failed");
                return PatchOutcome::refuse(source, vec![entry.clone()], vec![reason]);
            }
        }
    }

    debug!(applied = diff.len(), side = %options.side, "Patched transform source");
    PatchOutcome::Patched {
        patched,
        version_bump: VersionBump::Minor,
        applied: diff.to_vec(),
    }
}

/// Parse a diff document: a JSON array of entries
///
/// # Errors
///
/// Returns an error for malformed JSON or entries missing the paths their
/// kind requires.
pub fn parse_diff(json: &str) -> Result<Vec<DiffEntry>> {
    let entries: Vec<DiffEntry> = serde_json::from_str(json)?;
    for (index, entry) in entries.iter().enumerate() {
        let missing = match entry.kind {
            DiffKind::Add => entry.to_path.is_none(),
            DiffKind::Remove => entry.from_path.is_none(),
            DiffKind::Rename => entry.from_path.is_none() || entry.to_path.is_none(),
            DiffKind::TypeChange | DiffKind::Complex => {
                entry.from_path.is_none() && entry.to_path.is_none()
            }
        };
        if missing {
            return Err(Error::InvalidDiff(format!(
                "entry {index} ({}) is missing a required path",
                entry.kind
            )));
        }
    }
    Ok(entries)
}

/// Bump the minor component: `1.2.3` → `1.3.0`, `1-2-3` → `1-3-0`
///
/// # Errors
///
/// Returns [`Error::InvalidVersion`] unless the version has three numeric
/// components separated by `.` or `-`.
pub fn bump_minor(version: &str) -> Result<String> {
    let invalid = || Error::InvalidVersion(version.to_string());
    let separator = if version.contains('-') { '-' } else { '.' };
    let parts: Vec<&str> = version.split(separator).collect();
    let [major, minor, _patch] = parts.as_slice() else {
        return Err(invalid());
    };
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
    {
        return Err(invalid());
    }
    let minor: u64 = minor.parse().map_err(|_| invalid())?;
    Ok(format!("{major}{separator}{}{separator}0", minor + 1))
}

fn lex(source: &str) -> std::result::Result<Vec<Token>, String> {
    tokenize(source).map_err(|e| format!("transform source does not tokenize: {e}"))
}

/// Field names of the parents of `path`, with array markers dropped
fn parent_segments(path: &str) -> Vec<&str> {
    let mut segments: Vec<&str> = path
        .split('.')
        .map(|segment| segment.strip_suffix("[]").unwrap_or(segment))
        .collect();
    segments.pop();
    segments
}

/// Rewrite path references to the renamed input field
///
/// Only references whose leading path equals the field's parents are
/// touched, so `supplier.town` survives a rename of `customer.town`.
fn rename_references(source: &str, entry: &DiffEntry) -> std::result::Result<String, String> {
    let (Some(from), Some(to)) = (&entry.from_path, &entry.to_path) else {
        return Err(format!("{entry} needs both paths"));
    };
    let old = leaf_name(from);
    let new = leaf_name(to);
    let parents = parent_segments(from);
    let tokens = lex(source)?;
    let in_predicate = predicate_scopes(&tokens);

    let mut edits: Vec<(std::ops::Range<usize>, String)> = Vec::new();
    for (index, token) in tokens.iter().enumerate() {
        let name = match &token.kind {
            TokenKind::Name(name) if token.is_field_name() => name,
            TokenKind::QuotedName(name) => name,
            _ => continue,
        };
        if name != old {
            continue;
        }
        if in_predicate[index] {
            return Err(format!(
                "reference to '{old}' at offset {} is relative to a predicate; cannot tell whether it is '{from}'",
                token.span.start
            ));
        }
        match path_before(&tokens, index) {
            Some(segments) if segments == parents => {
                edits.push((token.span.clone(), field_reference(new)));
            }
            Some(_) => {}
            None => {
                return Err(format!(
                    "cannot resolve the path of the reference to '{old}' at offset {}",
                    token.span.start
                ));
            }
        }
    }

    if edits.is_empty() {
        debug!(from = %from, "Rename matched no references");
    }
    Ok(apply_edits(source, edits))
}

/// Rewrite the output key that produces the renamed target field
fn rename_keys(source: &str, entry: &DiffEntry) -> std::result::Result<String, String> {
    let (Some(from), Some(to)) = (&entry.from_path, &entry.to_path) else {
        return Err(format!("{entry} needs both paths"));
    };
    if from.contains("[]") {
        return Err(format!("cannot rename '{from}' inside an array item mapping"));
    }
    let old = leaf_name(from);
    let new = leaf_name(to);
    let tokens = lex(source)?;

    let (mut open, mut close) = root_literal(&tokens)
        .ok_or_else(|| "transform body is not an object literal".to_string())?;
    for parent in parent_segments(from) {
        (open, close) = nested_literal(&tokens, open, close, parent).ok_or_else(|| {
            format!("no object literal bound to key '{parent}' for '{from}'")
        })?;
    }

    let keys = literal_keys(&tokens, open, close);
    if keys.iter().any(|(_, key)| *key == new) {
        return Err(format!("output already has a key '{new}'"));
    }

    let edits: Vec<(std::ops::Range<usize>, String)> = keys
        .iter()
        .filter(|(_, key)| *key == old)
        .map(|(index, _)| {
            let span = tokens[*index].span.clone();
            let quote = source[span.clone()].chars().next().unwrap_or('"');
            (span, quote_string(new, quote))
        })
        .collect();

    if edits.is_empty() {
        debug!(from = %from, "Rename matched no output key");
    }
    Ok(apply_edits(source, edits))
}

fn apply_edits(source: &str, edits: Vec<(std::ops::Range<usize>, String)>) -> String {
    let mut patched = source.to_string();
    for (span, replacement) in edits.into_iter().rev() {
        patched.replace_range(span, &replacement);
    }
    patched
}

/// For each token, whether it sits inside a `[...]` predicate
fn predicate_scopes(tokens: &[Token]) -> Vec<bool> {
    let mut stack: Vec<bool> = Vec::new();
    let mut inside = Vec::with_capacity(tokens.len());
    for (index, token) in tokens.iter().enumerate() {
        if token.kind == TokenKind::RBracket {
            stack.pop();
        }
        inside.push(stack.contains(&true));
        if token.kind == TokenKind::LBracket {
            let postfix = index
                .checked_sub(1)
                .is_some_and(|prev| ends_operand(&tokens[prev]));
            stack.push(postfix);
        }
    }
    inside
}

/// Whether a `[` after this token is a predicate rather than an array
fn ends_operand(token: &Token) -> bool {
    match &token.kind {
        TokenKind::Name(name) => !matches!(name.as_str(), "and" | "or"),
        TokenKind::QuotedName(_)
        | TokenKind::Variable(_)
        | TokenKind::Str(_)
        | TokenKind::Number(_)
        | TokenKind::RBracket
        | TokenKind::RParen
        | TokenKind::RBrace => true,
        _ => false,
    }
}

/// Field names on the path leading up to `tokens[index]`, outermost first
///
/// `None` when the path does not start at the input document, for example
/// when it continues the result of a function call.
fn path_before(tokens: &[Token], index: usize) -> Option<Vec<&str>> {
    let mut segments = Vec::new();
    let mut current = index;
    while current > 0 && tokens[current - 1].kind == TokenKind::Dot {
        let mut prev = current.checked_sub(2)?;
        while tokens[prev].kind == TokenKind::RBracket {
            prev = matching_open(tokens, prev)?.checked_sub(1)?;
        }
        match &tokens[prev].kind {
            TokenKind::Name(name) if tokens[prev].is_field_name() => segments.push(name.as_str()),
            TokenKind::QuotedName(name) => segments.push(name.as_str()),
            // `$` and `$$` both denote the input at the top level
            TokenKind::Variable(name) if name.is_empty() || name == "$" => break,
            _ => return None,
        }
        current = prev;
    }
    segments.reverse();
    Some(segments)
}

fn matching_open(tokens: &[Token], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for index in (0..=close).rev() {
        match tokens[index].kind {
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => depth += 1,
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Append `"field": path` to the object literal that holds the field
fn apply_add(source: &str, entry: &DiffEntry) -> std::result::Result<String, String> {
    let Some(path) = &entry.to_path else {
        return Err(format!("{entry} has no target path"));
    };
    if path.contains("[]") {
        return Err(format!("cannot insert '{path}' into an array item mapping"));
    }

    let tokens = lex(source)?;
    let segments: Vec<&str> = path.split('.').collect();
    let Some((field, parents)) = segments.split_last() else {
        return Err(format!("empty path in {entry}"));
    };

    let (mut open, mut close) = root_literal(&tokens)
        .ok_or_else(|| "transform body is not an object literal".to_string())?;
    for parent in parents {
        (open, close) = nested_literal(&tokens, open, close, parent).ok_or_else(|| {
            format!("no object literal bound to key '{parent}' for '{path}'")
        })?;
    }

    if literal_has_key(&tokens, open, close, field) {
        debug!(path = %path, "Field already mapped; nothing to add");
        return Ok(source.to_string());
    }

    let value = segments
        .iter()
        .map(|segment| field_reference(segment))
        .collect::<Vec<_>>()
        .join(".");
    let mapping = format!("{}: {value}", quote_string(field, '"'));

    Ok(insert_mapping(source, &tokens, open, close, &mapping))
}

fn insert_mapping(source: &str, tokens: &[Token], open: usize, close: usize, mapping: &str) -> String {
    let open_span = &tokens[open].span;
    let close_span = &tokens[close].span;
    let multiline = source[open_span.end..close_span.start].contains('\n');
    let mut patched = source.to_string();

    if close == open + 1 {
        let text = if multiline {
            let indent = indent_of(source, close_span.start);
            format!("\n{indent}  {mapping}\n{indent}")
        } else {
            format!(" {mapping} ")
        };
        patched.replace_range(open_span.end..close_span.start, &text);
        return patched;
    }

    // after the last entry, or after its trailing comma
    let trailing_comma = tokens[close - 1].kind == TokenKind::Comma;
    let anchor_end = tokens[close - 1].span.end;

    let text = if multiline {
        let indent = entry_indent(source, tokens, open, close);
        if trailing_comma {
            format!("\n{indent}{mapping},")
        } else {
            format!(",\n{indent}{mapping}")
        }
    } else if trailing_comma {
        format!(" {mapping},")
    } else {
        format!(", {mapping}")
    };

    patched.insert_str(anchor_end, &text);
    patched
}

/// Indentation of the first key inside a multi-line literal
fn entry_indent(source: &str, tokens: &[Token], open: usize, close: usize) -> String {
    let first_key = tokens.get(open + 1).filter(|_| open + 1 < close);
    match first_key {
        Some(token) => indent_of(source, token.span.start),
        None => "  ".to_string(),
    }
}

fn indent_of(source: &str, offset: usize) -> String {
    let line_start = source[..offset].rfind('\n').map_or(0, |i| i + 1);
    source[line_start..offset]
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

/// Token indices of the outermost `{ ... }` when it spans the whole body
fn root_literal(tokens: &[Token]) -> Option<(usize, usize)> {
    if tokens.first()?.kind != TokenKind::LBrace {
        return None;
    }
    let close = matching_close(tokens, 0)?;
    (close == tokens.len() - 1).then_some((0, close))
}

fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (index, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => depth += 1,
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Indices of top-level keys (string token followed by `:`) in a literal
fn literal_keys(tokens: &[Token], open: usize, close: usize) -> Vec<(usize, &str)> {
    let mut keys = Vec::new();
    let mut depth = 0usize;
    for index in open + 1..close {
        match &tokens[index].kind {
            TokenKind::LBrace | TokenKind::LBracket | TokenKind::LParen => depth += 1,
            TokenKind::RBrace | TokenKind::RBracket | TokenKind::RParen => {
                depth = depth.saturating_sub(1);
            }
            TokenKind::Str(key) if depth == 0 && is_object_key(tokens, index) => {
                keys.push((index, key.as_str()));
            }
            _ => {}
        }
    }
    keys
}

fn literal_has_key(tokens: &[Token], open: usize, close: usize, key: &str) -> bool {
    literal_keys(tokens, open, close)
        .iter()
        .any(|(_, k)| *k == key)
}

fn nested_literal(tokens: &[Token], open: usize, close: usize, key: &str) -> Option<(usize, usize)> {
    let (index, _) = literal_keys(tokens, open, close)
        .into_iter()
        .find(|(_, k)| *k == key)?;
    let value = index + 2;
    if tokens.get(value)?.kind != TokenKind::LBrace {
        return None;
    }
    let nested_close = matching_close(tokens, value)?;
    // the literal must be the whole value, not the start of a longer expression
    let after = tokens.get(nested_close + 1)?;
    matches!(after.kind, TokenKind::Comma | TokenKind::RBrace).then_some((value, nested_close))
}

fn is_object_key(tokens: &[Token], index: usize) -> bool {
    tokens
        .get(index + 1)
        .is_some_and(|next| next.kind == TokenKind::Colon)
}

/// A field name as it must be written in a path
fn field_reference(name: &str) -> String {
    if is_bare_name(name) {
        name.to_string()
    } else {
        format!("`{name}`")
    }
}

fn quote_string(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    for c in value.chars() {
        if c == quote || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push(quote);
    out
}
