//! Builtin functions
//!
//! Every builtin takes its evaluated arguments as `Option<Value>`, where
//! `None` is an undefined result (a missing field). Most builtins pass an
//! undefined first argument straight through instead of failing.

use crate::parser::number_value;
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Signature shared by all builtins
pub type BuiltinFn = fn(&[Option<Value>]) -> Result<Option<Value>>;

/// Names of every builtin, sorted
pub const BUILTIN_NAMES: &[&str] = &[
    "append",
    "boolean",
    "contains",
    "count",
    "exists",
    "join",
    "keys",
    "length",
    "lookup",
    "lowercase",
    "not",
    "number",
    "string",
    "substring",
    "sum",
    "trim",
    "uppercase",
];

/// Look up a builtin by name (without the `$`)
#[must_use]
pub fn lookup(name: &str) -> Option<BuiltinFn> {
    let function: BuiltinFn = match name {
        "string" => fn_string,
        "number" => fn_number,
        "boolean" => fn_boolean,
        "not" => fn_not,
        "exists" => fn_exists,
        "count" => fn_count,
        "length" => fn_length,
        "sum" => fn_sum,
        "join" => fn_join,
        "uppercase" => fn_uppercase,
        "lowercase" => fn_lowercase,
        "trim" => fn_trim,
        "substring" => fn_substring,
        "contains" => fn_contains,
        "keys" => fn_keys,
        "lookup" => fn_lookup,
        "append" => fn_append,
        _ => return None,
    };
    Some(function)
}

#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.binary_search(&name).is_ok()
}

/// Boolean cast used by conditions, filters and `and`/`or`
#[must_use]
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => items.iter().any(|item| is_truthy(Some(item))),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// String cast used by `$string` and the `&` operator
#[must_use]
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn error(name: &str, message: impl Into<String>) -> Error {
    Error::Function {
        name: name.to_string(),
        message: message.into(),
    }
}

fn arg(args: &[Option<Value>], index: usize) -> Option<&Value> {
    args.get(index).and_then(Option::as_ref)
}

fn arity(name: &str, args: &[Option<Value>], min: usize, max: usize) -> Result<()> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{min} to {max}")
        };
        return Err(error(
            name,
            format!("expected {expected} argument(s), got {}", args.len()),
        ));
    }
    Ok(())
}

fn string_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| error(name, format!("expected a string argument, got {value}")))
}

fn number_arg(name: &str, value: &Value) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| error(name, format!("expected a number argument, got {value}")))
}

fn fn_string(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("string", args, 1, 1)?;
    Ok(arg(args, 0).map(|v| Value::String(stringify(v))))
}

fn fn_number(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("number", args, 1, 1)?;
    let Some(value) = arg(args, 0) else {
        return Ok(None);
    };
    match value {
        Value::Number(_) => Ok(Some(value.clone())),
        Value::Bool(b) => Ok(Some(Value::from(u8::from(*b)))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| Some(number_value(f)))
            .ok_or_else(|| error("number", format!("cannot convert '{s}' to a number"))),
        other => Err(error("number", format!("cannot convert {other} to a number"))),
    }
}

fn fn_boolean(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("boolean", args, 1, 1)?;
    Ok(arg(args, 0).map(|v| Value::Bool(is_truthy(Some(v)))))
}

fn fn_not(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("not", args, 1, 1)?;
    Ok(arg(args, 0).map(|v| Value::Bool(!is_truthy(Some(v)))))
}

fn fn_exists(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("exists", args, 1, 1)?;
    Ok(Some(Value::Bool(arg(args, 0).is_some())))
}

fn fn_count(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("count", args, 1, 1)?;
    let count = match arg(args, 0) {
        None => 0,
        Some(Value::Array(items)) => items.len(),
        Some(_) => 1,
    };
    Ok(Some(Value::from(count)))
}

fn fn_length(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("length", args, 1, 1)?;
    let Some(value) = arg(args, 0) else {
        return Ok(None);
    };
    let s = string_arg("length", value)?;
    Ok(Some(Value::from(s.chars().count())))
}

fn fn_sum(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("sum", args, 1, 1)?;
    let total = match arg(args, 0) {
        None => 0.0,
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| number_arg("sum", item))
            .sum::<Result<f64>>()?,
        Some(other) => number_arg("sum", other)?,
    };
    Ok(Some(number_value(total)))
}

fn fn_join(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("join", args, 1, 2)?;
    let separator = match arg(args, 1) {
        Some(sep) => string_arg("join", sep)?,
        None => "",
    };
    let parts = match arg(args, 0) {
        None => return Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| string_arg("join", item))
            .collect::<Result<Vec<_>>>()?,
        Some(other) => vec![string_arg("join", other)?],
    };
    Ok(Some(Value::String(parts.join(separator))))
}

fn map_string(
    name: &str,
    args: &[Option<Value>],
    f: impl Fn(&str) -> String,
) -> Result<Option<Value>> {
    arity(name, args, 1, 1)?;
    match arg(args, 0) {
        None => Ok(None),
        Some(value) => Ok(Some(Value::String(f(string_arg(name, value)?)))),
    }
}

fn fn_uppercase(args: &[Option<Value>]) -> Result<Option<Value>> {
    map_string("uppercase", args, str::to_uppercase)
}

fn fn_lowercase(args: &[Option<Value>]) -> Result<Option<Value>> {
    map_string("lowercase", args, str::to_lowercase)
}

/// Trims both ends and collapses internal whitespace runs to one space
fn fn_trim(args: &[Option<Value>]) -> Result<Option<Value>> {
    map_string("trim", args, |s| {
        s.split_whitespace().collect::<Vec<_>>().join(" ")
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
fn fn_substring(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("substring", args, 2, 3)?;
    let Some(value) = arg(args, 0) else {
        return Ok(None);
    };
    let chars: Vec<char> = string_arg("substring", value)?.chars().collect();
    let len = chars.len() as i64;

    let start = match arg(args, 1) {
        Some(v) => number_arg("substring", v)?.trunc() as i64,
        None => return Err(error("substring", "start position is undefined")),
    };
    // positions saturate, so out-of-range input clamps to the string bounds
    let start = if start < 0 {
        len.saturating_add(start).max(0)
    } else {
        start.min(len)
    };

    let end = match arg(args, 2) {
        Some(v) => {
            let count = number_arg("substring", v)?.trunc() as i64;
            start.saturating_add(count.max(0)).min(len)
        }
        None => len,
    };

    #[allow(clippy::cast_sign_loss)]
    let slice: String = chars[start as usize..end as usize].iter().collect();
    Ok(Some(Value::String(slice)))
}

fn fn_contains(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("contains", args, 2, 2)?;
    let Some(value) = arg(args, 0) else {
        return Ok(None);
    };
    let haystack = string_arg("contains", value)?;
    let needle = match arg(args, 1) {
        Some(v) => string_arg("contains", v)?,
        None => return Err(error("contains", "pattern is undefined")),
    };
    Ok(Some(Value::Bool(haystack.contains(needle))))
}

fn fn_keys(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("keys", args, 1, 1)?;
    let mut keys: Vec<String> = Vec::new();
    let mut collect = |map: &Map<String, Value>| {
        for key in map.keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
    };

    match arg(args, 0) {
        Some(Value::Object(map)) => collect(map),
        Some(Value::Array(items)) => {
            for item in items {
                if let Value::Object(map) = item {
                    collect(map);
                }
            }
        }
        _ => return Ok(None),
    }

    if keys.is_empty() {
        return Ok(None);
    }
    Ok(Some(Value::Array(keys.into_iter().map(Value::String).collect())))
}

fn fn_lookup(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("lookup", args, 2, 2)?;
    let key = match arg(args, 1) {
        Some(k) => string_arg("lookup", k)?,
        None => return Err(error("lookup", "key is undefined")),
    };
    match arg(args, 0) {
        Some(Value::Object(map)) => Ok(map.get(key).cloned()),
        Some(Value::Array(items)) => {
            let found: Vec<Value> = items
                .iter()
                .filter_map(|item| item.get(key).cloned())
                .collect();
            Ok(match found.len() {
                0 => None,
                1 => found.into_iter().next(),
                _ => Some(Value::Array(found)),
            })
        }
        _ => Ok(None),
    }
}

fn fn_append(args: &[Option<Value>]) -> Result<Option<Value>> {
    arity("append", args, 2, 2)?;
    let into_items = |value: &Value| match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    };
    match (arg(args, 0), arg(args, 1)) {
        (None, None) => Ok(None),
        (Some(a), None) => Ok(Some(a.clone())),
        (None, Some(b)) => Ok(Some(b.clone())),
        (Some(a), Some(b)) => {
            let mut items = into_items(a);
            items.extend(into_items(b));
            Ok(Some(Value::Array(items)))
        }
    }
}
