//! `${...}` string templates.

use std::fmt;

use serde_json::Value;

use super::{ExpressionError, Node, parser};
use crate::envelope::Envelope;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Placeholder(Node),
}

/// A string with `${expression}` placeholders evaluated against an envelope.
///
/// ```rust,ignore
/// let template = Template::parse("order ${body.id} failed: ${headers._exception.cause}")?;
/// let line = template.render(&envelope);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    /// Parses a template.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let mut parts = Vec::new();
        let mut rest = source;
        let mut consumed = 0;

        while let Some(start) = rest.find("${") {
            if start > 0 {
                parts.push(Part::Text(rest[..start].to_owned()));
            }
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or(ExpressionError::Unterminated {
                what: "placeholder",
                offset: consumed + start,
            })?;
            parts.push(Part::Placeholder(parser::parse(&after[..end])?));

            let advance = start + 2 + end + 1;
            consumed += advance;
            rest = &rest[advance..];
        }
        if !rest.is_empty() {
            parts.push(Part::Text(rest.to_owned()));
        }

        Ok(Self {
            source: source.to_owned(),
            parts,
        })
    }

    /// Returns the source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Renders the template. Strings are inserted unquoted, `null` as nothing.
    pub fn render(&self, envelope: &Envelope) -> String {
        let mut out = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Placeholder(node) => match node.evaluate(envelope) {
                    Value::Null => {}
                    Value::String(s) => out.push_str(&s),
                    other => out.push_str(&other.to_string()),
                },
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
