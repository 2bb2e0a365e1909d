//! Guard expression evaluator.
//!
//! A small hand-written evaluator, no external grammar machinery. The
//! language is deliberately tiny:
//!
//! - `||` separates alternatives, each alternative is `&&`-joined
//!   comparisons, both short-circuit
//! - comparison operators, in detection priority: `==`, `!=`, `>=`,
//!   `<=`, `>`, `<`
//! - operands are `"string"` literals, integer or float literals, or
//!   dotted paths over `{ payload, session }`
//!
//! Anything malformed evaluates to false: a guard that cannot be read
//! must not fire a transition.

use crate::path::lookup_path;
use serde_json::{json, Value};
use std::cmp::Ordering;


/// Context a guard expression resolves paths against.
#[derive(Debug, Clone)]
pub struct GuardContext {
    root: Value,
}

impl GuardContext {
    pub fn new(payload: Value, resume_token: Option<String>, idempotency_key: String) -> Self {
        Self {
            root: json!({
                "payload": payload,
                "session": {
                    "resumeToken": resume_token,
                    "idempotencyKey": idempotency_key,
                },
            }),
        }
    }

    fn resolve(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.root, path)
    }
}

/// Evaluate a guard expression against the context.
pub fn eval(expr: &str, ctx: &GuardContext) -> bool {
    split_outside_strings(expr, "||")
        .into_iter()
        .any(|alternative| {
            split_outside_strings(alternative, "&&")
                .into_iter()
                .all(|comparison| eval_comparison(comparison, ctx))
        })
}

const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

fn eval_comparison(text: &str, ctx: &GuardContext) -> bool {
    let Some((index, op)) = find_operator(text) else {
        return false;
    };
    let lhs_text = &text[..index];
    let rhs_text = &text[index + op.len()..];
    let (Some(lhs), Some(rhs)) = (operand(lhs_text, ctx), operand(rhs_text, ctx)) else {
        return false;
    };

    match op {
        "==" => values_equal(&lhs, &rhs).unwrap_or(false),
        "!=" => values_equal(&lhs, &rhs).map(|eq| !eq).unwrap_or(false),
        ">=" => matches!(compare(&lhs, &rhs), Ordering::Greater | Ordering::Equal),
        "<=" => matches!(compare(&lhs, &rhs), Ordering::Less | Ordering::Equal),
        ">" => compare(&lhs, &rhs) == Ordering::Greater,
        "<" => compare(&lhs, &rhs) == Ordering::Less,
        _ => false,
    }
}

/// Find the first comparison operator outside string literals, trying
/// operators in priority order so `>=` wins over `>`.
fn find_operator(text: &str) -> Option<(usize, &'static str)> {
    OPERATORS
        .iter()
        .find_map(|op| find_outside_strings(text, op).map(|index| (index, *op)))
}

fn find_outside_strings(text: &str, needle: &str) -> Option<usize> {
    let bytes = text.as_bytes();
    let needle = needle.as_bytes();
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            in_string = !in_string;
            i += 1;
            continue;
        }
        if !in_string && bytes[i..].starts_with(needle) {
            return Some(i);
        }
        i += 1;
    }
    None
}

fn split_outside_strings<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let bytes = text.as_bytes();
    let separator = separator.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'"' {
            in_string = !in_string;
            i += 1;
            continue;
        }
        if !in_string && bytes[i..].starts_with(separator) {
            parts.push(&text[start..i]);
            i += separator.len();
            start = i;
            continue;
        }
        i += 1;
    }
    parts.push(&text[start..]);
    parts
}

fn operand(text: &str, ctx: &GuardContext) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        return Some(Value::String(text[1..text.len() - 1].to_string()));
    }
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::from(int));
    }
    if let Ok(float) = text.parse::<f64>() {
        return Some(Value::from(float));
    }
    ctx.resolve(text).cloned()
}

/// Equality over same-typed scalars, with int/float numeric promotion.
/// Non-scalar or mixed-type pairs are not comparable.
fn values_equal(lhs: &Value, rhs: &Value) -> Option<bool> {
    match (lhs, rhs) {
        (Value::String(a), Value::String(b)) => Some(a == b),
        (Value::Bool(a), Value::Bool(b)) => Some(a == b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a == b),
            _ => Some(a.as_f64() == b.as_f64()),
        },
        _ => None,
    }
}

/// Ordering over ints, floats, cross-type numerics and strings; anything
/// else compares equal.
fn compare(lhs: &Value, rhs: &Value) -> Ordering {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => Ordering::Equal,
    }
}
