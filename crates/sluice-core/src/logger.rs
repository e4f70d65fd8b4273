//! Built-in logging capabilities.
//!
//! These are the capabilities error routes are pre-populated with; they are
//! also registered under `trace`, `debug`, `info`, `warn`, `error` and
//! `fatal`, taking an optional template argument.

use std::fmt::Write;

use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use crate::capability::{Capability, Emitter, Fault};
use crate::envelope::Envelope;
use crate::error::{BuildError, BuildResult};
use crate::expr::Template;
use crate::registry::CapabilityRegistry;

/// Log severity of a [`Logger`].
///
/// `Fatal` is logged at `ERROR` level with a `fatal = true` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Severity {
    /// All severities, lowest first.
    pub const ALL: [Severity; 6] = [
        Severity::Trace,
        Severity::Debug,
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Fatal,
    ];

    /// The capability name this severity is registered under.
    pub fn name(self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        }
    }

    /// Looks a severity up by its capability name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|severity| severity.name().eq_ignore_ascii_case(name))
    }
}

/// What a [`Logger`] writes for each envelope.
#[derive(Debug, Clone)]
pub enum LogMessage {
    /// The whole envelope as JSON.
    Envelope,
    /// The recorded failure cause and its source chain.
    Cause,
    /// A rendered template.
    Template(Template),
}

/// Logs every envelope and forwards it unchanged.
#[derive(Debug, Clone)]
pub struct Logger {
    severity: Severity,
    message: LogMessage,
}

impl Logger {
    /// Logs the whole envelope.
    pub fn new(severity: Severity) -> Self {
        Self {
            severity,
            message: LogMessage::Envelope,
        }
    }

    /// Logs the failure cause recorded on the envelope.
    pub fn cause(severity: Severity) -> Self {
        Self {
            severity,
            message: LogMessage::Cause,
        }
    }

    /// Logs a rendered template.
    pub fn template(severity: Severity, template: Template) -> Self {
        Self {
            severity,
            message: LogMessage::Template(template),
        }
    }

    /// Builds a logger from registry arguments: none, or one template string.
    pub fn from_args(severity: Severity, args: &[Value]) -> BuildResult<Self> {
        match args {
            [] => Ok(Self::new(severity)),
            [Value::String(source)] => Ok(Self::template(severity, Template::parse(source)?)),
            _ => Err(BuildError::invalid_args(
                severity.name(),
                "expected no arguments or a single template string",
            )),
        }
    }

    /// Returns the severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    fn render(&self, envelope: &Envelope) -> String {
        match &self.message {
            LogMessage::Envelope => envelope.to_string(),
            LogMessage::Template(template) => template.render(envelope),
            LogMessage::Cause => match envelope.exception() {
                Some(exception) => {
                    let mut line = format!("Cause: {}", exception.cause);
                    let mut source = exception.cause.as_error().source();
                    while let Some(err) = source {
                        let _ = write!(line, ": {err}");
                        source = err.source();
                    }
                    line
                }
                None => "Cause: none recorded".to_owned(),
            },
        }
    }
}

impl Capability for Logger {
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        let line = self.render(&envelope);
        let processor = emitter.processor().id();
        match self.severity {
            Severity::Trace => trace!(processor = %processor, "{line}"),
            Severity::Debug => debug!(processor = %processor, "{line}"),
            Severity::Info => info!(processor = %processor, "{line}"),
            Severity::Warn => warn!(processor = %processor, "{line}"),
            Severity::Error => error!(processor = %processor, "{line}"),
            Severity::Fatal => error!(processor = %processor, fatal = true, "{line}"),
        }
        emitter.emit(envelope);
        Ok(())
    }
}

pub(crate) fn register_builtins(registry: &mut CapabilityRegistry) {
    for severity in Severity::ALL {
        registry.register(severity.name(), move |args| {
            Ok(Box::new(Logger::from_args(severity, args)?) as Box<dyn Capability>)
        });
    }
}
