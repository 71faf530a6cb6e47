//! HTML to Markdown conversion
//!
//! Backs the `html.to_markdown` and `text.strip_html` extensions. Markup is
//! parsed into a small element tree and rendered as Markdown; input that
//! cannot be parsed (unterminated tags, stray closing tags) falls back to
//! plain tag stripping, so conversion itself never fails.

use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static STRIP_BLOCKS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>").ok()
});

static STRIP_TAGS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"<[^>]*>?").ok());

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

const DROPPED_TAGS: &[&str] = &["script", "style", "head", "title", "noscript", "template"];

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
}

/// Why markup could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedHtml {
    pub offset: usize,
    pub reason: String,
}

impl std::fmt::Display for MalformedHtml {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed HTML at offset {}: {}", self.offset, self.reason)
    }
}

impl std::error::Error for MalformedHtml {}

/// Convert HTML to Markdown, falling back to tag stripping on malformed input
///
/// Empty or whitespace-only input yields an empty string.
#[must_use]
pub fn html_to_markdown(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    match try_html_to_markdown(html) {
        Ok(markdown) => markdown,
        Err(err) => {
            debug!(error = %err, "Falling back to tag stripping");
            strip_html(html)
        }
    }
}

/// Strict conversion that reports malformed markup instead of recovering
///
/// # Errors
///
/// Returns [`MalformedHtml`] for unterminated tags and closing tags with no
/// matching open element.
pub fn try_html_to_markdown(html: &str) -> Result<String, MalformedHtml> {
    let nodes = parse_fragment(html)?;
    let mut renderer = Renderer::default();
    let rendered = renderer.render_nodes(&nodes);
    Ok(tidy(&rendered))
}

/// Remove all markup and collapse whitespace
#[must_use]
pub fn strip_html(html: &str) -> String {
    let without_blocks = match STRIP_BLOCKS.as_ref() {
        Some(re) => re.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    };
    let text = match STRIP_TAGS.as_ref() {
        Some(re) => re.replace_all(&without_blocks, " ").into_owned(),
        None => without_blocks,
    };
    normalize_whitespace(&decode_entities(&text))
}

/// Collapse every whitespace run to a single space and trim the ends
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode named and numeric character references
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&rest[1..semi]).map(|c| (c, semi)));

        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => numeric.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }

    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "copy" => '©',
        "reg" => '®',
        "hellip" => '…',
        "mdash" => '—',
        "ndash" => '–',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        _ => return None,
    };
    Some(c)
}

fn parse_fragment(html: &str) -> Result<Vec<Node>, MalformedHtml> {
    // stack of open elements; index 0 is the synthetic root
    let mut stack: Vec<(String, Vec<(String, String)>, Vec<Node>)> =
        vec![(String::new(), Vec::new(), Vec::new())];
    let mut pos = 0;

    while pos < html.len() {
        let Some(lt) = html[pos..].find('<').map(|i| pos + i) else {
            push_text(&mut stack, &html[pos..]);
            break;
        };
        if lt > pos {
            push_text(&mut stack, &html[pos..lt]);
        }

        let rest = &html[lt..];
        if rest.starts_with("<!--") {
            let end = rest.find("-->").ok_or_else(|| MalformedHtml {
                offset: lt,
                reason: "unterminated comment".to_string(),
            })?;
            pos = lt + end + 3;
            continue;
        }

        let close = rest.find('>').ok_or_else(|| MalformedHtml {
            offset: lt,
            reason: "unterminated tag".to_string(),
        })?;
        let inner = &rest[1..close];
        pos = lt + close + 1;

        if inner.starts_with('!') || inner.starts_with('?') {
            continue;
        }

        if let Some(name) = inner.strip_prefix('/') {
            let tag = name.trim().to_ascii_lowercase();
            close_element(&mut stack, &tag, lt)?;
            continue;
        }

        let self_closing = inner.ends_with('/');
        let inner = inner.trim_end_matches('/');
        let (tag, attrs) = parse_tag(inner).ok_or_else(|| MalformedHtml {
            offset: lt,
            reason: format!("invalid tag '<{inner}>'"),
        })?;

        if DROPPED_TAGS.contains(&tag.as_str()) && !self_closing {
            // skip raw content up to the matching close tag
            let end_tag = format!("</{tag}");
            let lower = html[pos..].to_ascii_lowercase();
            let end = lower.find(&end_tag).ok_or_else(|| MalformedHtml {
                offset: lt,
                reason: format!("unclosed <{tag}>"),
            })?;
            let after = pos + end;
            let gt = html[after..].find('>').ok_or_else(|| MalformedHtml {
                offset: after,
                reason: "unterminated tag".to_string(),
            })?;
            pos = after + gt + 1;
            continue;
        }

        if self_closing || VOID_TAGS.contains(&tag.as_str()) {
            push_node(
                &mut stack,
                Node::Element {
                    tag,
                    attrs,
                    children: Vec::new(),
                },
            );
        } else {
            stack.push((tag, attrs, Vec::new()));
        }
    }

    // unclosed elements are closed implicitly at end of input
    while stack.len() > 1 {
        pop_element(&mut stack);
    }
    Ok(stack.pop().map(|(_, _, children)| children).unwrap_or_default())
}

fn push_text(stack: &mut [(String, Vec<(String, String)>, Vec<Node>)], text: &str) {
    if !text.is_empty() {
        push_node(stack, Node::Text(decode_entities(text)));
    }
}

fn push_node(stack: &mut [(String, Vec<(String, String)>, Vec<Node>)], node: Node) {
    if let Some((_, _, children)) = stack.last_mut() {
        children.push(node);
    }
}

fn pop_element(stack: &mut Vec<(String, Vec<(String, String)>, Vec<Node>)>) {
    if let Some((tag, attrs, children)) = stack.pop() {
        push_node(stack, Node::Element {
            tag,
            attrs,
            children,
        });
    }
}

fn close_element(
    stack: &mut Vec<(String, Vec<(String, String)>, Vec<Node>)>,
    tag: &str,
    offset: usize,
) -> Result<(), MalformedHtml> {
    if VOID_TAGS.contains(&tag) {
        return Ok(());
    }
    let Some(depth) = stack.iter().skip(1).rposition(|(open, _, _)| open == tag) else {
        return Err(MalformedHtml {
            offset,
            reason: format!("closing tag </{tag}> has no matching open element"),
        });
    };
    // rposition over skip(1) is relative to index 1
    while stack.len() > depth + 1 {
        pop_element(stack);
    }
    Ok(())
}

fn parse_tag(inner: &str) -> Option<(String, Vec<(String, String)>)> {
    let inner = inner.trim();
    let name_end = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let name = &inner[..name_end];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return None;
    }

    let mut attrs = Vec::new();
    let mut rest = inner[name_end..].trim_start();
    while !rest.is_empty() {
        let key_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .unwrap_or(rest.len());
        let key = rest[..key_end].to_ascii_lowercase();
        rest = rest[key_end..].trim_start();

        let mut value = String::new();
        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (raw, remaining) = match after_eq.chars().next() {
                Some(quote @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let end = body.find(quote)?;
                    (&body[..end], &body[end + 1..])
                }
                _ => {
                    let end = after_eq
                        .find(char::is_whitespace)
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            value = decode_entities(raw);
            rest = remaining.trim_start();
        }

        if !key.is_empty() {
            attrs.push((key, value));
        }
    }

    Some((name.to_ascii_lowercase(), attrs))
}

fn attr<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

#[derive(Default)]
struct Renderer {
    list_depth: usize,
}

impl Renderer {
    fn render_nodes(&mut self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            out.push_str(&self.render(node));
        }
        out
    }

    fn render(&mut self, node: &Node) -> String {
        let (tag, attrs, children) = match node {
            Node::Text(text) => return collapse_spaces(text),
            Node::Element {
                tag,
                attrs,
                children,
            } => (tag.as_str(), attrs.as_slice(), children.as_slice()),
        };

        match tag {
            "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "body"
            | "html" | "table" | "tr" => block(self.render_nodes(children).trim()),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(tag.as_bytes()[1] - b'0');
                let text = self.render_nodes(children);
                block(&format!("{} {}", "#".repeat(level), text.trim()))
            }
            "strong" | "b" => wrap("**", &self.render_nodes(children)),
            "em" | "i" => wrap("_", &self.render_nodes(children)),
            "code" => {
                let text = raw_text(children);
                if text.is_empty() {
                    String::new()
                } else {
                    format!("`{text}`")
                }
            }
            "pre" => {
                let code = raw_text(children);
                block(&format!("```\n{}\n```", code.trim_matches('\n')))
            }
            "a" => {
                let text = self.render_nodes(children);
                let text = text.trim();
                match attr(attrs, "href") {
                    Some(href) if !href.is_empty() => format!("[{text}]({href})"),
                    _ => text.to_string(),
                }
            }
            "img" => {
                let alt = attr(attrs, "alt").unwrap_or_default();
                match attr(attrs, "src") {
                    Some(src) => format!("![{alt}]({src})"),
                    None => alt.to_string(),
                }
            }
            "br" => "\n".to_string(),
            "hr" => block("---"),
            "ul" | "ol" => self.list(tag == "ol", children),
            "li" => self.render_nodes(children).trim().to_string(),
            "blockquote" => {
                let inner = tidy(&self.render_nodes(children));
                let quoted: Vec<String> = inner
                    .lines()
                    .map(|line| {
                        if line.is_empty() {
                            ">".to_string()
                        } else {
                            format!("> {line}")
                        }
                    })
                    .collect();
                block(&quoted.join("\n"))
            }
            "td" | "th" => format!(" {} ", self.render_nodes(children).trim()),
            _ => self.render_nodes(children),
        }
    }

    fn list(&mut self, ordered: bool, children: &[Node]) -> String {
        let indent = "  ".repeat(self.list_depth);
        self.list_depth += 1;

        let mut lines = Vec::new();
        let mut number = 1;
        for child in children {
            let Node::Element { tag, .. } = child else {
                continue;
            };
            if tag != "li" {
                continue;
            }
            let marker = if ordered {
                format!("{number}.")
            } else {
                "-".to_string()
            };
            number += 1;

            let item = tidy(&self.render(child));
            let mut item_lines = item.lines().filter(|line| !line.trim().is_empty());
            let first = item_lines.next().unwrap_or_default();
            lines.push(format!("{indent}{marker} {}", first.trim_start()));
            // nested list lines already carry their own indentation
            lines.extend(item_lines.map(str::to_string));
        }

        self.list_depth -= 1;
        if self.list_depth == 0 {
            block(&lines.join("\n"))
        } else {
            format!("\n{}\n", lines.join("\n"))
        }
    }
}

fn block(content: &str) -> String {
    if content.is_empty() {
        String::new()
    } else {
        format!("\n\n{content}\n\n")
    }
}

fn wrap(marker: &str, content: &str) -> String {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return content.to_string();
    }
    // keep surrounding spaces outside the markers
    let leading = if content.starts_with(' ') { " " } else { "" };
    let trailing = if content.ends_with(' ') { " " } else { "" };
    format!("{leading}{marker}{trimmed}{marker}{trailing}")
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn raw_text(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element { tag, children, .. } => {
                if tag == "br" {
                    out.push('\n');
                } else {
                    out.push_str(&raw_text(children));
                }
            }
        }
    }
    out
}

/// Trim line ends, squeeze blank-line runs to one and trim the document
fn tidy(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank_run = 0;
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        let line = if in_fence { line } else { line.trim_end() };
        let line = if in_fence || line.trim_start().starts_with(['-', '>']) || is_ordered_marker(line) {
            line
        } else {
            line.trim_start()
        };

        if line.is_empty() && !in_fence {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push(line);
    }

    out.join("\n").trim_matches('\n').to_string()
}

fn is_ordered_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && trimmed[digits..].starts_with(". ")
}
