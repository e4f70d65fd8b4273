//! Sandboxed assignment.
//!
//! `set` evaluates an expression against the envelope and stores the result
//! in a header or somewhere in the body:
//!
//! ```rust,ignore
//! route
//!     .set("headers.priority", "body.amount > 1000")?
//!     .set("body.customer.vip", "headers.tier == 'gold'")?;
//! ```

use serde_json::{Map, Value};
use sluice_core::{
    BuildError, BuildResult, Capability, EXCEPTION_HEADER, Emitter, Envelope, Expression, Fault,
};

/// Where a [`Set`] stores its result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A top-level header.
    Header(String),
    /// The body itself (empty path) or a nested object field.
    Body(Vec<String>),
}

impl Target {
    /// Parses `headers.<name>`, `body` or `body.<field>[.<field>…]`.
    pub fn parse(path: &str) -> BuildResult<Self> {
        let mut segments = path.split('.');
        let target = match (segments.next(), path.contains("..")) {
            (_, true) => None,
            (Some("headers"), false) => match (segments.next(), segments.next()) {
                (Some(name), None) if !name.is_empty() && name != EXCEPTION_HEADER => {
                    Some(Target::Header(name.to_owned()))
                }
                _ => None,
            },
            (Some("body"), false) => {
                let fields: Vec<String> = segments.map(str::to_owned).collect();
                (!fields.iter().any(String::is_empty)).then_some(Target::Body(fields))
            }
            _ => None,
        };
        target.ok_or_else(|| {
            BuildError::invalid_args(
                "set",
                format!("'{path}' is not a writable path (headers.<name> or body[.<field>])"),
            )
        })
    }

    fn assign(&self, envelope: &mut Envelope, value: Value) {
        match self {
            Target::Header(name) => {
                envelope.headers.insert(name.clone(), value);
            }
            Target::Body(fields) => {
                let mut slot = &mut envelope.body;
                for field in fields {
                    if !slot.is_object() {
                        *slot = Value::Object(Map::new());
                    }
                    slot = &mut slot[field.as_str()];
                }
                *slot = value;
            }
        }
    }
}

/// Evaluates an expression and writes the result to a [`Target`].
#[derive(Debug, Clone)]
pub struct Set {
    target: Target,
    expression: Expression,
}

impl Set {
    pub fn new(target: Target, expression: Expression) -> Self {
        Self { target, expression }
    }

    /// Parses both the target path and the expression.
    pub fn parse(target: &str, expression: &str) -> BuildResult<Self> {
        Ok(Self::new(Target::parse(target)?, Expression::parse(expression)?))
    }

    /// Registry constructor: target path and expression strings.
    pub fn from_args(args: &[Value]) -> BuildResult<Self> {
        match args {
            [Value::String(target), Value::String(expression)] => Self::parse(target, expression),
            _ => Err(BuildError::invalid_args(
                "set",
                "expected a target path and an expression",
            )),
        }
    }
}

impl Capability for Set {
    fn data(&self, mut envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        let value = self.expression.evaluate(&envelope);
        self.target.assign(&mut envelope, value);
        emitter.emit(envelope);
        Ok(())
    }
}
