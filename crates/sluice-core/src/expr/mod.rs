//! A small, sandboxed expression language over envelopes.
//!
//! Expressions read envelope fields through `headers.*` and `body.*` paths and
//! combine them with comparisons and boolean operators. There is no way to
//! call functions or mutate anything, so user-supplied expressions can be
//! evaluated without trusting their author.
//!
//! ```text
//! expr    := or
//! or      := and ('||' and)*
//! and     := unary ('&&' unary)*
//! unary   := '!' unary | compare
//! compare := primary (('=='|'!='|'<'|'<='|'>'|'>=') primary)?
//! primary := number | string | true | false | null | path | '(' expr ')'
//! path    := ('headers' | 'body') ('.' segment)*
//! ```
//!
//! ```rust,ignore
//! use sluice_core::expr::Expression;
//!
//! let expr: Expression = "body.amount > 100 && headers.region == 'eu'".parse()?;
//! if expr.test(&envelope) { /* ... */ }
//! ```

mod parser;
mod template;

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_json::{Number, Value};
use thiserror::Error;

use crate::envelope::Envelope;

pub use template::Template;

/// Errors raised while parsing an expression or template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// A character that cannot start any token.
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar {
        /// The offending character.
        ch: char,
        /// Byte offset in the source.
        offset: usize,
    },

    /// A token that does not fit the grammar at this point.
    #[error("unexpected '{found}' at offset {offset}")]
    UnexpectedToken {
        /// Rendering of the token found.
        found: String,
        /// Byte offset in the source.
        offset: usize,
    },

    /// The input ended in the middle of an expression.
    #[error("unexpected end of expression")]
    UnexpectedEnd,

    /// A string literal or `${` placeholder was never closed.
    #[error("unterminated {what} starting at offset {offset}")]
    Unterminated {
        /// What was left open.
        what: &'static str,
        /// Byte offset where it started.
        offset: usize,
    },

    /// A bare identifier that is neither a literal nor a path root.
    #[error("unknown identifier '{0}', paths must start with 'headers' or 'body'")]
    UnknownIdentifier(String),

    /// A numeric literal that cannot be represented.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Compare(CompareOp, Box<Node>, Box<Node>),
}

impl Node {
    fn evaluate(&self, envelope: &Envelope) -> Value {
        match self {
            Node::Literal(value) => value.clone(),
            Node::Path(segments) => {
                let path: Vec<&str> = segments.iter().map(String::as_str).collect();
                envelope.lookup(&path).unwrap_or(Value::Null)
            }
            Node::Not(inner) => Value::Bool(!truthy(&inner.evaluate(envelope))),
            Node::And(lhs, rhs) => {
                Value::Bool(truthy(&lhs.evaluate(envelope)) && truthy(&rhs.evaluate(envelope)))
            }
            Node::Or(lhs, rhs) => {
                Value::Bool(truthy(&lhs.evaluate(envelope)) || truthy(&rhs.evaluate(envelope)))
            }
            Node::Compare(op, lhs, rhs) => {
                let (lhs, rhs) = (lhs.evaluate(envelope), rhs.evaluate(envelope));
                Value::Bool(match op {
                    CompareOp::Eq => loose_eq(&lhs, &rhs),
                    CompareOp::Ne => !loose_eq(&lhs, &rhs),
                    CompareOp::Lt => ordering(&lhs, &rhs) == Some(Ordering::Less),
                    CompareOp::Le => matches!(
                        ordering(&lhs, &rhs),
                        Some(Ordering::Less | Ordering::Equal)
                    ),
                    CompareOp::Gt => ordering(&lhs, &rhs) == Some(Ordering::Greater),
                    CompareOp::Ge => matches!(
                        ordering(&lhs, &rhs),
                        Some(Ordering::Greater | Ordering::Equal)
                    ),
                })
            }
        }
    }
}

// ============================================================================
// Expression
// ============================================================================

/// A parsed, reusable expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    /// Parses an expression.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            source: source.to_owned(),
            root: parser::parse(source)?,
        })
    }

    /// Returns the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression against an envelope.
    pub fn evaluate(&self, envelope: &Envelope) -> Value {
        self.root.evaluate(envelope)
    }

    /// Evaluates the expression and applies [`truthy`] to the result.
    pub fn test(&self, envelope: &Envelope) -> bool {
        truthy(&self.evaluate(envelope))
    }
}

impl FromStr for Expression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// Value semantics
// ============================================================================

/// `null`, `false`, `0` and `""` are false; everything else is true.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Equality where `1` and `1.0` are the same number.
pub fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b) == Some(Ordering::Equal),
        _ => lhs == rhs,
    }
}

/// Integers compare exactly; only a mixed integer/float pair goes through `f64`.
fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    fn integer(n: &Number) -> Option<i128> {
        n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from))
    }

    match (integer(a), integer(b)) {
        (Some(a), Some(b)) => Some(a.cmp(&b)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn ordering(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => compare_numbers(a, b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
