//! Event envelopes.
//!
//! An [`Envelope`] is the unit of data travelling through a chain: a bag of
//! headers plus an arbitrary JSON body. The reserved `_exception` header is
//! kept as a typed [`ExceptionState`] and exposed to expressions under
//! `headers._exception.*`.
//!
//! ```rust,ignore
//! use serde_json::json;
//! use sluice_core::Envelope;
//!
//! let envelope = Envelope::from(json!({ "x": 1 })).with_header("source", "api");
//! assert_eq!(envelope.lookup(&["body", "x"]), Some(json!(1)));
//!
//! // Converting an envelope is the identity conversion.
//! let same = Envelope::from(envelope.clone());
//! ```

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::error::BoxError;

/// Name of the reserved header carrying failure context.
pub const EXCEPTION_HEADER: &str = "_exception";

/// Envelope headers. Insertion order is irrelevant.
pub type Headers = HashMap<String, Value>;

// ============================================================================
// Cause
// ============================================================================

#[derive(Debug, Error)]
#[error("{0}")]
struct Message(String);

/// A cheaply cloneable handle to the error that made a processor fail.
#[derive(Clone)]
pub struct Cause(Arc<dyn Error + Send + Sync>);

impl Cause {
    /// Wraps any error value.
    pub fn new(error: impl Into<BoxError>) -> Self {
        Self(Arc::from(error.into()))
    }

    /// Creates a cause from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(Message(message.into())))
    }

    /// Returns the underlying error.
    pub fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.0.as_ref()
    }

    /// Attempts to downcast the underlying error.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref()
    }
}

impl From<BoxError> for Cause {
    fn from(error: BoxError) -> Self {
        Self(Arc::from(error))
    }
}

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

// ============================================================================
// Exception State
// ============================================================================

/// Failure context attached to an envelope under `_exception`.
///
/// Only the latest cause, timestamp and processor are kept; the attempt
/// counter is the sole history.
#[derive(Debug, Clone)]
pub struct ExceptionState {
    /// The most recent failure.
    pub cause: Cause,
    /// When the most recent failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// How many times processing has failed so far.
    pub number_of_attempts: u32,
    /// Id of the processor that failed last, if the failure came from one.
    pub processor_id: Option<String>,
}

impl ExceptionState {
    /// Creates the state for a failure not attributable to any processor.
    pub fn uncaught(cause: Cause) -> Self {
        Self {
            cause,
            timestamp: Utc::now(),
            number_of_attempts: 0,
            processor_id: None,
        }
    }

    /// Returns the JSON view used by expressions and logging.
    pub fn to_value(&self) -> Value {
        json!({
            "cause": self.cause.to_string(),
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "numberOfAttempts": self.number_of_attempts,
            "processorId": self.processor_id,
        })
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// The headers + body unit flowing through a chain.
///
/// Forwarding an envelope moves it, so a capability cannot keep mutating an
/// envelope after handing it on.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Arbitrary headers.
    pub headers: Headers,
    /// The payload.
    pub body: Value,
    exception: Option<ExceptionState>,
}

impl Envelope {
    /// Wraps a body into a fresh envelope with no headers.
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            headers: Headers::new(),
            body: body.into(),
            exception: None,
        }
    }

    /// Sets a header (builder pattern).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns a header value.
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    /// Returns the failure context, if any failure has been recorded.
    pub fn exception(&self) -> Option<&ExceptionState> {
        self.exception.as_ref()
    }

    /// Replaces the failure context.
    pub fn set_exception(&mut self, exception: Option<ExceptionState>) {
        self.exception = exception;
    }

    /// Records a processor failure and returns the new attempt count.
    pub(crate) fn record_failure(&mut self, cause: Cause, processor_id: &str) -> u32 {
        let state = self
            .exception
            .get_or_insert_with(|| ExceptionState::uncaught(cause.clone()));
        state.cause = cause;
        state.timestamp = Utc::now();
        state.processor_id = Some(processor_id.to_owned());
        state.number_of_attempts += 1;
        state.number_of_attempts
    }

    /// Resolves a dotted path rooted at `headers` or `body`.
    ///
    /// Object keys and array indices are both accepted as segments. Returns
    /// `None` when any segment is missing.
    pub fn lookup(&self, path: &[&str]) -> Option<Value> {
        let (root, rest) = path.split_first()?;
        match *root {
            "body" => descend(&self.body, rest).cloned(),
            "headers" => {
                let (name, rest) = match rest.split_first() {
                    Some(split) => split,
                    None => return Some(self.headers_value()),
                };
                if *name == EXCEPTION_HEADER {
                    let exception = self.exception.as_ref()?.to_value();
                    descend(&exception, rest).cloned()
                } else {
                    descend(self.headers.get(*name)?, rest).cloned()
                }
            }
            _ => None,
        }
    }

    fn headers_value(&self) -> Value {
        let mut map: Map<String, Value> = self
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(exception) = &self.exception {
            map.insert(EXCEPTION_HEADER.to_owned(), exception.to_value());
        }
        Value::Object(map)
    }

    /// Returns the full JSON view of the envelope.
    pub fn to_value(&self) -> Value {
        json!({ "headers": self.headers_value(), "body": self.body })
    }
}

fn descend<'a>(mut value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    for segment in path {
        value = match value {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl From<Value> for Envelope {
    fn from(body: Value) -> Self {
        Self::new(body)
    }
}

impl From<&str> for Envelope {
    fn from(body: &str) -> Self {
        Self::new(body)
    }
}

impl From<String> for Envelope {
    fn from(body: String) -> Self {
        Self::new(body)
    }
}
