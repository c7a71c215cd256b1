//! The `test` annotation mini-language.
//!
//! ```text
//! test   := "~" regex                  single clause, nothing else allowed
//!         | clause ("," clause)*       all must hold
//! clause := op operand                 op is one of = < > <= >=
//!         | "$(" name ")"              registered test predicate
//! ```
//!
//! Ordering operators need a numeric operand and a numeric field; `=` also
//! compares strings and booleans. Integers are compared exactly (widened to
//! `i128`), anything involving a float is compared as `f64`.

use std::cmp::Ordering;
use std::fmt;

use regex::Regex;
use thiserror::Error;

use crate::annotation::func_name;
use crate::error::TagfigError;
use crate::registry::FunctionRegistry;
use crate::value::{FieldValue, Value};
use crate::walk::FieldCx;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("regex may not be combined with other tests")]
    RegexCombined,

    #[error("invalid test operation")]
    InvalidOperator,

    #[error("bad operand")]
    MissingOperand,

    #[error("operand {0} is not a number")]
    OperandNotANumber(String),

    #[error("regexp {pattern} failed to compile: {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },
}

impl ExprError {
    fn at(self, cx: &FieldCx) -> TagfigError {
        match self {
            ExprError::Regex { pattern, source } => TagfigError::RegexCompileFailure {
                path: cx.path(),
                pattern,
                source,
            },
            other => TagfigError::InvalidTestOperator {
                path: cx.path(),
                expression: cx.desc.test.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
    Gt,
    Lte,
    Gte,
}

impl Op {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            Op::Eq => ord == Ordering::Equal,
            Op::Lt => ord == Ordering::Less,
            Op::Gt => ord == Ordering::Greater,
            Op::Lte => ord != Ordering::Greater,
            Op::Gte => ord != Ordering::Less,
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Op::Eq => "=",
            Op::Lt => "<",
            Op::Gt => ">",
            Op::Lte => "<=",
            Op::Gte => ">=",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Int(i128),
    Float(f64),
}

impl Number {
    fn parse(s: &str) -> Option<Self> {
        s.parse::<i128>()
            .map(Number::Int)
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(Number::Float))
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(Number::Int(i128::from(*i))),
            Value::Uint(u) => Some(Number::Int(i128::from(*u))),
            Value::Float(x) => Some(Number::Float(*x)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(x) => x,
        }
    }

    fn cmp(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Clause {
    Compare { op: Op, operand: String },
    Regex(Regex),
    Func(String),
}

/// A parsed `test` annotation.
#[derive(Debug, Clone)]
pub struct TestExpr {
    clauses: Vec<Clause>,
}

impl TestExpr {
    pub fn parse(raw: &str) -> Result<Self, ExprError> {
        let raw = raw.trim();
        if let Some(pattern) = raw.strip_prefix('~') {
            if trailing_clause(pattern) {
                return Err(ExprError::RegexCombined);
            }
            let regex = Regex::new(pattern).map_err(|source| ExprError::Regex {
                pattern: pattern.to_string(),
                source,
            })?;
            return Ok(Self {
                clauses: vec![Clause::Regex(regex)],
            });
        }
        let clauses = raw
            .split(',')
            .map(parse_clause)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { clauses })
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// True when every clause is a `$(name)` predicate, the only form that
    /// applies to non-primitive fields.
    pub fn is_predicate_only(&self) -> bool {
        self.clauses.iter().all(|c| matches!(c, Clause::Func(_)))
    }

    /// Check every clause against the field; the first failure wins.
    pub(crate) fn evaluate(
        &self,
        cx: &FieldCx,
        value: &FieldValue<'_>,
        type_name: &str,
        registry: &FunctionRegistry,
    ) -> Result<(), TagfigError> {
        for clause in &self.clauses {
            match clause {
                Clause::Func(name) => {
                    let f = registry
                        .test_func(name)
                        .ok_or_else(|| TagfigError::UnknownFunction {
                            path: cx.path(),
                            name: name.clone(),
                            registry: "test",
                        })?;
                    if !f(value, cx.desc.name) {
                        return Err(TagfigError::PredicateFailed {
                            path: cx.path(),
                            name: name.clone(),
                        });
                    }
                }
                Clause::Regex(regex) => {
                    let Some(actual) = value.as_str() else {
                        return Err(unsupported(cx, "~", value, type_name));
                    };
                    if !regex.is_match(actual) {
                        return Err(TagfigError::TestAssertionFailed {
                            path: cx.path(),
                            op: "~".into(),
                            expected: regex.as_str().to_string(),
                            actual: actual.to_string(),
                        });
                    }
                }
                Clause::Compare { op, operand } => {
                    let Some(actual) = value.primitive() else {
                        return Err(unsupported(cx, &op.to_string(), value, type_name));
                    };
                    if !compare(cx, *op, operand, actual)? {
                        return Err(TagfigError::TestAssertionFailed {
                            path: cx.path(),
                            op: op.to_string(),
                            expected: operand.clone(),
                            actual: actual.to_string(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

/// Whether a comma outside any `()`, `[]` or `{}` group is followed by
/// something that parses as its own clause, as in `~abc,>1`. Commas inside
/// groups (`a{1,2}`) or before plain text (`a,b`) stay in the pattern.
fn trailing_clause(pattern: &str) -> bool {
    let mut depth = 0usize;
    let mut escaped = false;
    let mut cuts = Vec::new();
    for (i, c) in pattern.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => cuts.push(i),
            _ => {}
        }
    }
    cuts.iter().enumerate().any(|(n, &at)| {
        let end = cuts.get(n + 1).copied().unwrap_or(pattern.len());
        matches!(parse_clause(&pattern[at + 1..end]), Ok(_) | Err(ExprError::RegexCombined))
    })
}

fn parse_clause(raw: &str) -> Result<Clause, ExprError> {
    if let Some(name) = func_name(raw) {
        return Ok(Clause::Func(name.to_string()));
    }

    let s = raw.trim();
    let mut op = None;
    let mut operand = "";
    for (i, c) in s.char_indices() {
        match c {
            ' ' => continue,
            '<' => op = Some(Op::Lt),
            '>' => op = Some(Op::Gt),
            '~' => return Err(ExprError::RegexCombined),
            '=' => {
                op = Some(match op {
                    Some(Op::Lt) => Op::Lte,
                    Some(Op::Gt) => Op::Gte,
                    _ => Op::Eq,
                });
                operand = &s[i + 1..];
                break;
            }
            _ => match op {
                Some(Op::Lt | Op::Gt) => {
                    operand = &s[i..];
                    break;
                }
                _ => return Err(ExprError::InvalidOperator),
            },
        }
    }

    let op = op.ok_or(ExprError::InvalidOperator)?;
    let operand = operand.trim();
    if operand.is_empty() {
        return Err(ExprError::MissingOperand);
    }
    if op != Op::Eq && Number::parse(operand).is_none() {
        return Err(ExprError::OperandNotANumber(operand.to_string()));
    }
    Ok(Clause::Compare {
        op,
        operand: operand.to_string(),
    })
}

fn compare(cx: &FieldCx, op: Op, operand: &str, actual: &Value) -> Result<bool, TagfigError> {
    match actual {
        Value::Str(s) if op == Op::Eq => Ok(s == operand),
        Value::Bool(b) if op == Op::Eq => Ok(b.to_string() == operand),
        Value::Str(_) | Value::Bool(_) => Err(TagfigError::UnsupportedTestKind {
            path: cx.path(),
            op: op.to_string(),
            kind: actual.kind().to_string(),
        }),
        _ => {
            let (Some(lhs), Some(rhs)) = (Number::of(actual), Number::parse(operand)) else {
                return Err(ExprError::OperandNotANumber(operand.to_string()).at(cx));
            };
            Ok(lhs.cmp(rhs).is_some_and(|ord| op.holds(ord)))
        }
    }
}

fn unsupported(cx: &FieldCx, op: &str, value: &FieldValue<'_>, type_name: &str) -> TagfigError {
    let kind = match value.primitive() {
        Some(v) => v.kind().to_string(),
        None => type_name.to_string(),
    };
    TagfigError::UnsupportedTestKind {
        path: cx.path(),
        op: op.to_string(),
        kind,
    }
}

/// Parse a field's `test` annotation, attaching the field path to errors.
pub(crate) fn parse_for(cx: &FieldCx) -> Result<TestExpr, TagfigError> {
    TestExpr::parse(cx.desc.test).map_err(|e| e.at(cx))
}
