//! Success expressions evaluated against callback payloads
//!
//! Grammar: one or more clauses joined by `&&`. A clause is either
//! `<json-pointer> == <json-literal>`, `<json-pointer> != <json-literal>`,
//! or a bare `<json-pointer>` tested for truthiness.
//!
//! ```text
//! /status == "DONE" && /errors/0 != null
//! /result/approved
//! ```

use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

static COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<pointer>(?:/[^\s=!]*)*)\s*(?P<op>==|!=)\s*(?P<literal>.+)$")
        .expect("comparison pattern is valid")
});

static BARE_POINTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:/[^\s=!]*)+$").expect("pointer pattern is valid"));

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredicateError {
    #[error("Invalid success expression '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("Payload has no value at '{0}'")]
    MissingField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Compare { pointer: String, op: Op, expected: Value },
    Truthy { pointer: String },
}

/// Parsed, reusable success expression
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessPredicate {
    source: String,
    clauses: Vec<Clause>,
}

impl SuccessPredicate {
    pub fn parse(expression: &str) -> Result<Self, PredicateError> {
        let parse_error = |message: String| PredicateError::Parse {
            expression: expression.to_string(),
            message,
        };

        let mut clauses = Vec::new();
        for raw in split_conjunction(expression) {
            let clause = raw.trim();
            if clause.is_empty() {
                return Err(parse_error("empty clause".to_string()));
            }

            if let Some(caps) = COMPARISON.captures(clause) {
                let literal = caps["literal"].trim();
                let expected: Value = serde_json::from_str(literal)
                    .map_err(|e| parse_error(format!("'{}' is not a JSON literal: {}", literal, e)))?;
                let op = if &caps["op"] == "==" { Op::Eq } else { Op::Ne };
                clauses.push(Clause::Compare {
                    pointer: caps["pointer"].to_string(),
                    op,
                    expected,
                });
            } else if BARE_POINTER.is_match(clause) {
                clauses.push(Clause::Truthy {
                    pointer: clause.to_string(),
                });
            } else {
                return Err(parse_error(format!("cannot parse clause '{}'", clause)));
            }
        }

        Ok(Self {
            source: expression.trim().to_string(),
            clauses,
        })
    }

    /// `Ok(false)` means the payload reports failure; `Err` means the
    /// payload could not be judged at all.
    pub fn evaluate(&self, payload: &Value) -> Result<bool, PredicateError> {
        for clause in &self.clauses {
            let holds = match clause {
                Clause::Compare { pointer, op, expected } => {
                    let actual = payload
                        .pointer(pointer)
                        .ok_or_else(|| PredicateError::MissingField(pointer.clone()))?;
                    match op {
                        Op::Eq => actual == expected,
                        Op::Ne => actual != expected,
                    }
                }
                Clause::Truthy { pointer } => payload
                    .pointer(pointer)
                    .map(is_truthy)
                    .ok_or_else(|| PredicateError::MissingField(pointer.clone()))?,
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for SuccessPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Split on `&&` outside of double-quoted strings
fn split_conjunction(expression: &str) -> Vec<&str> {
    let bytes = expression.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if b == b'"' {
            in_string = true;
        } else if b == b'&' && bytes.get(i + 1) == Some(&b'&') {
            parts.push(&expression[start..i]);
            start = i + 2;
            i += 1;
        }
        i += 1;
    }
    parts.push(&expression[start..]);
    parts
}
