//! Tree-walking evaluator
//!
//! Intermediate results are `Option<Value>`: `None` is the language's
//! undefined value, produced by missing fields and empty selections.

use crate::ast::{BinaryOp, Expr};
use crate::extensions::ExtensionFn;
use crate::functions::{self, is_truthy, stringify};
use crate::parser::number_value;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Evaluates one expression tree against one input document
pub(crate) struct Evaluator<'a> {
    root: &'a Value,
    bindings: &'a HashMap<String, ExtensionFn>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(root: &'a Value, bindings: &'a HashMap<String, ExtensionFn>) -> Self {
        Self { root, bindings }
    }

    pub(crate) fn evaluate(&self, expr: &Expr) -> Result<Option<Value>> {
        self.eval(expr, Some(self.root))
    }

    fn eval(&self, expr: &Expr, context: Option<&Value>) -> Result<Option<Value>> {
        match expr {
            Expr::Literal(value) => Ok(Some(value.clone())),
            Expr::Field(name) => Ok(context.and_then(|ctx| field(ctx, name))),
            Expr::Context => Ok(context.cloned()),
            Expr::Root => Ok(Some(self.root.clone())),
            Expr::Path(steps) => self.path(steps, context),
            Expr::Filter { base, predicate } => self.filter(base, predicate, context),
            Expr::Object(pairs) => self.object(pairs, context),
            Expr::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = self.eval(item, context)? {
                        values.push(value);
                    }
                }
                Ok(Some(Value::Array(values)))
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, context),
            Expr::Negate(inner) => match self.eval(inner, context)? {
                None => Ok(None),
                Some(Value::Number(n)) => {
                    Ok(Some(number_value(-n.as_f64().unwrap_or_default())))
                }
                Some(other) => Err(Error::evaluate(format!(
                    "cannot negate non-numeric value {other}"
                ))),
            },
            Expr::Condition {
                condition,
                then,
                otherwise,
            } => {
                let test = self.eval(condition, context)?;
                if is_truthy(test.as_ref()) {
                    self.eval(then, context)
                } else if let Some(otherwise) = otherwise {
                    self.eval(otherwise, context)
                } else {
                    Ok(None)
                }
            }
            Expr::Call { name, args } => self.call(name, args, context),
            Expr::Block(exprs) => {
                let mut last = None;
                for expr in exprs {
                    last = self.eval(expr, context)?;
                }
                Ok(last)
            }
        }
    }

    /// Map each step over the results of the previous one, flattening arrays
    fn path(&self, steps: &[Expr], context: Option<&Value>) -> Result<Option<Value>> {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(None);
        };

        let mut current = match self.eval(first, context)? {
            None => return Ok(None),
            Some(Value::Array(items)) => items,
            Some(value) => vec![value],
        };

        for (index, step) in rest.iter().enumerate() {
            // a single item on the final step yields its value unchanged, so
            // array-valued fields survive as arrays
            if index + 1 == rest.len() && current.len() == 1 {
                return self.eval(step, current.first());
            }

            let mut next = Vec::new();
            for item in &current {
                match self.eval(step, Some(item))? {
                    None => {}
                    Some(Value::Array(items)) => next.extend(items),
                    Some(value) => next.push(value),
                }
            }
            if next.is_empty() {
                return Ok(None);
            }
            current = next;
        }

        Ok(collapse(current))
    }

    fn filter(
        &self,
        base: &Expr,
        predicate: &Expr,
        context: Option<&Value>,
    ) -> Result<Option<Value>> {
        let (items, was_array) = match self.eval(base, context)? {
            None => return Ok(None),
            Some(Value::Array(items)) => (items, true),
            Some(value) => (vec![value], false),
        };

        let len = items.len();
        let mut kept = Vec::new();
        for (position, item) in items.into_iter().enumerate() {
            let selected = match self.eval(predicate, Some(&item))? {
                Some(Value::Number(n)) => {
                    let index = n.as_f64().unwrap_or_default().floor();
                    #[allow(clippy::cast_precision_loss)]
                    let resolved = if index < 0.0 { len as f64 + index } else { index };
                    #[allow(clippy::cast_precision_loss)]
                    let matches = resolved == position as f64;
                    if matches {
                        // index selection yields the item itself
                        return Ok(Some(item));
                    }
                    false
                }
                other => is_truthy(other.as_ref()),
            };
            if selected {
                kept.push(item);
            }
        }

        if kept.is_empty() {
            return Ok(None);
        }
        if !was_array && kept.len() == 1 {
            return Ok(kept.pop());
        }
        Ok(Some(Value::Array(kept)))
    }

    fn object(&self, pairs: &[(Expr, Expr)], context: Option<&Value>) -> Result<Option<Value>> {
        let mut map = Map::new();
        for (key_expr, value_expr) in pairs {
            let key = match self.eval(key_expr, context)? {
                Some(Value::String(key)) => key,
                Some(other) => {
                    return Err(Error::evaluate(format!(
                        "object key must be a string, got {other}"
                    )));
                }
                None => return Err(Error::evaluate("object key evaluated to nothing")),
            };
            if map.contains_key(&key) {
                return Err(Error::evaluate(format!(
                    "duplicate key \"{key}\" in object constructor"
                )));
            }
            if let Some(value) = self.eval(value_expr, context)? {
                map.insert(key, value);
            }
        }
        Ok(Some(Value::Object(map)))
    }

    fn binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        context: Option<&Value>,
    ) -> Result<Option<Value>> {
        match op {
            BinaryOp::And => {
                let left = self.eval(lhs, context)?;
                let result = is_truthy(left.as_ref()) && is_truthy(self.eval(rhs, context)?.as_ref());
                return Ok(Some(Value::Bool(result)));
            }
            BinaryOp::Or => {
                let left = self.eval(lhs, context)?;
                let result = is_truthy(left.as_ref()) || is_truthy(self.eval(rhs, context)?.as_ref());
                return Ok(Some(Value::Bool(result)));
            }
            _ => {}
        }

        let left = self.eval(lhs, context)?;
        let right = self.eval(rhs, context)?;

        match op {
            BinaryOp::Concat => {
                let mut joined = left.as_ref().map(stringify).unwrap_or_default();
                joined.push_str(&right.as_ref().map(stringify).unwrap_or_default());
                Ok(Some(Value::String(joined)))
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let (Some(left), Some(right)) = (left, right) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let equal = values_equal(&left, &right);
                Ok(Some(Value::Bool(if op == BinaryOp::Equal { equal } else { !equal })))
            }
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                let (Some(left), Some(right)) = (left, right) else {
                    return Ok(Some(Value::Bool(false)));
                };
                let ordering = compare(op, &left, &right)?;
                let result = match op {
                    BinaryOp::Less => ordering.is_lt(),
                    BinaryOp::LessEqual => ordering.is_le(),
                    BinaryOp::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Some(Value::Bool(result)))
            }
            _ => arithmetic(op, left, right),
        }
    }

    fn call(&self, name: &str, args: &[Expr], context: Option<&Value>) -> Result<Option<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg, context)?);
        }

        if let Some(builtin) = functions::lookup(name) {
            return builtin(&values);
        }

        let Some(function) = self.bindings.get(name) else {
            return Err(Error::evaluate(format!("unknown function ${name}")));
        };

        // extensions see undefined arguments as null
        let values: Vec<Value> = values
            .into_iter()
            .map(|value| value.unwrap_or(Value::Null))
            .collect();
        function(&values).map(Some).map_err(|err| Error::Function {
            name: name.to_string(),
            message: err.to_string(),
        })
    }
}

fn field(context: &Value, name: &str) -> Option<Value> {
    match context {
        Value::Object(map) => map.get(name).cloned(),
        Value::Array(items) => {
            let mut found = Vec::new();
            for item in items {
                match field(item, name) {
                    Some(Value::Array(values)) => found.extend(values),
                    Some(value) => found.push(value),
                    None => {}
                }
            }
            collapse(found)
        }
        _ => None,
    }
}

fn collapse(mut items: Vec<Value>) -> Option<Value> {
    match items.len() {
        0 => None,
        1 => items.pop(),
        _ => Some(Value::Array(items)),
    }
}

/// Deep equality; numbers compare by value so `1` equals `1.0`
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> Result<std::cmp::Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
            a.partial_cmp(&b)
                .ok_or_else(|| Error::evaluate("cannot compare non-finite numbers"))
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        _ => Err(Error::evaluate(format!(
            "operator '{}' needs two numbers or two strings, got {left} and {right}",
            op.symbol()
        ))),
    }
}

fn arithmetic(op: BinaryOp, left: Option<Value>, right: Option<Value>) -> Result<Option<Value>> {
    let (Some(left), Some(right)) = (left, right) else {
        return Ok(None);
    };
    let operand = |value: &Value| {
        value.as_f64().ok_or_else(|| {
            Error::evaluate(format!(
                "operator '{}' needs numeric operands, got {value}",
                op.symbol()
            ))
        })
    };
    let (a, b) = (operand(&left)?, operand(&right)?);

    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
            return Err(Error::evaluate("division by zero"));
        }
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        other => {
            return Err(Error::evaluate(format!(
                "operator '{}' is not arithmetic",
                other.symbol()
            )));
        }
    };

    if !result.is_finite() {
        return Err(Error::evaluate("numeric overflow"));
    }
    Ok(Some(number_value(result)))
}
