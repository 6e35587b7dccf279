//! Conditional-write expressions.
//!
//! A condition is a single boolean test evaluated against a record:
//! a comparison (`field == literal`, `!=`, `<`, `<=`, `>`, `>=`), an
//! `exists(field)` or `empty(field)` check, optionally wrapped in a leading
//! `not`. Writers carry one of these to decide, record by record, whether to
//! write; parse failures surface at `open` time, never mid-run.

use serde_json::Value;
use thiserror::Error;

use crate::record::Record;

/// Error raised when a condition expression cannot be parsed.
#[derive(Debug, Clone, Error)]
#[error("invalid condition '{expression}': {reason}")]
pub struct InvalidCondition {
    /// The expression as configured.
    pub expression: String,
    /// Why it was rejected.
    pub reason: String,
}

impl InvalidCondition {
    fn new(expression: &str, reason: impl Into<String>) -> Self {
        Self {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}

/// Comparison operators usable in a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Test {
    Exists(String),
    Empty(String),
    Compare {
        field: String,
        op: CompareOp,
        literal: Value,
    },
}

/// A parsed conditional-write expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    text: String,
    negated: bool,
    test: Test,
}

impl Condition {
    /// Parses an expression.
    ///
    /// Literals may be quoted strings (single or double quotes), numbers,
    /// `true`/`false`, or bare words (treated as strings).
    pub fn parse(text: &str) -> Result<Self, InvalidCondition> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(InvalidCondition::new(text, "empty expression"));
        }

        let (negated, body) = strip_not(trimmed).map_err(|r| InvalidCondition::new(text, r))?;
        let test = parse_test(body).map_err(|r| InvalidCondition::new(text, r))?;
        Ok(Self {
            text: trimmed.to_string(),
            negated,
            test,
        })
    }

    /// Evaluates the condition against a record.
    ///
    /// A comparison against a missing field is false (before `not` is
    /// applied); ordering comparisons require two numbers or two strings.
    #[must_use]
    pub fn evaluate(&self, record: &Record) -> bool {
        let result = match &self.test {
            Test::Exists(field) => record.contains(field),
            Test::Empty(field) => match record.get(field) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.is_empty(),
                Some(_) => false,
            },
            Test::Compare { field, op, literal } => match record.get(field) {
                Some(value) => compare(value, *op, literal),
                None => false,
            },
        };
        if self.negated {
            !result
        } else {
            result
        }
    }

    /// The expression as configured.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

fn strip_not(text: &str) -> Result<(bool, &str), String> {
    if let Some(rest) = text.strip_prefix("not") {
        if let Some(body) = rest.strip_prefix(char::is_whitespace) {
            return Ok((true, body.trim()));
        }
        if rest.starts_with('(') {
            let inner = rest
                .strip_prefix('(')
                .and_then(|r| r.strip_suffix(')'))
                .ok_or("unclosed parenthesis after not")?;
            return Ok((true, inner.trim()));
        }
    }
    Ok((false, text))
}

fn parse_test(body: &str) -> Result<Test, String> {
    if let Some(field) = parse_call(body, "exists") {
        return Ok(Test::Exists(field?));
    }
    if let Some(field) = parse_call(body, "empty") {
        return Ok(Test::Empty(field?));
    }

    // Two-character operators first so "<=" is not read as "<".
    for (symbol, op) in [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ] {
        if let Some(at) = body.find(symbol) {
            let field = body[..at].trim();
            let literal = body[at + symbol.len()..].trim();
            if field.is_empty() {
                return Err("missing field before operator".to_string());
            }
            if field.contains(char::is_whitespace) {
                return Err(format!("'{field}' is not a field name"));
            }
            if literal.is_empty() {
                return Err("missing literal after operator".to_string());
            }
            return Ok(Test::Compare {
                field: field.to_string(),
                op,
                literal: parse_literal(literal),
            });
        }
    }

    Err("expected a comparison, exists(field) or empty(field)".to_string())
}

fn parse_call(body: &str, keyword: &str) -> Option<Result<String, String>> {
    let rest = body.strip_prefix(keyword)?;
    let rest = rest.trim_start();
    if !rest.starts_with('(') {
        return None;
    }
    Some(
        rest.strip_prefix('(')
            .and_then(|r| r.strip_suffix(')'))
            .map(|field| field.trim().to_string())
            .filter(|field| !field.is_empty())
            .ok_or_else(|| format!("{keyword} needs a field name in parentheses")),
    )
}

fn parse_literal(text: &str) -> Value {
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return Value::String(text[1..text.len() - 1].to_string());
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => value,
        Err(_) => Value::String(text.to_string()),
    }
}

fn compare(value: &Value, op: CompareOp, literal: &Value) -> bool {
    match op {
        CompareOp::Eq => loose_eq(value, literal),
        CompareOp::Ne => !loose_eq(value, literal),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = match (value, literal) {
                (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
                    (Some(a), Some(b)) => a.partial_cmp(&b),
                    _ => None,
                },
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            };
            match ordering {
                Some(ordering) => match op {
                    CompareOp::Lt => ordering.is_lt(),
                    CompareOp::Le => ordering.is_le(),
                    CompareOp::Gt => ordering.is_gt(),
                    CompareOp::Ge => ordering.is_ge(),
                    _ => unreachable!(),
                },
                None => false,
            }
        }
    }
}

// Numbers compare by value so 25 == 25.0 regardless of JSON representation.
fn loose_eq(value: &Value, literal: &Value) -> bool {
    match (value, literal) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
            _ => a == b,
        },
        (a, b) => a == b,
    }
}
