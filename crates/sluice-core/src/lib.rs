//! # Sluice Core
//!
//! The dispatch core of the Sluice event-routing engine.
//!
//! Sluice moves [`Envelope`]s through named [`Route`]s. Each route owns an
//! append-only chain of [`Processor`]s, each wrapping a [`Capability`]: a unit
//! of work that signals completion through an [`Emitter`].
//!
//! ## Building Blocks
//!
//! - **Envelopes**: headers plus a JSON body, with typed failure context ([`Envelope`], [`ExceptionState`])
//! - **Capabilities**: the processor contract ([`Capability`], [`Emitter`], [`Fault`])
//! - **Routes**: chains, scheduling, retry and error routing ([`Route`], [`RouteBuilder`])
//! - **Context**: retry policy, statistics and registry shared by routes ([`RouteContext`])
//! - **Registry**: name-keyed capability constructors ([`CapabilityRegistry`])
//! - **Expressions**: a sandboxed evaluator over envelopes ([`Expression`], [`Template`])
//! - **Failure sink**: the process-wide destination for uncaught failures ([`failure`])
//!
//! ## Failure Flow
//!
//! ```text
//!                ┌──────── retry (delay) ────────┐
//!                ▼                               │
//! inject ──▶ Processor ──▶ Processor ──▶ …    failure
//!                │                               │
//!                └─────── attempts exhausted ────┴──▶ Error route ──▶ log
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use sluice_core::{Capability, Emitter, Envelope, Fault, RouteContext};
//!
//! struct Greet;
//!
//! impl Capability for Greet {
//!     fn data(&self, mut envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
//!         envelope.body = json!(format!("hello {}", envelope.body));
//!         emitter.emit(envelope);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let context = RouteContext::new();
//!     let route = context.route().name("greeter").build().then("greet", Greet);
//!     route.inject("world");
//! }
//! ```

pub mod capability;
pub mod context;
pub mod envelope;
pub mod error;
pub mod expr;
pub mod failure;
pub mod logger;
pub mod processor;
pub mod registry;
pub mod route;
pub mod statistics;

mod scheduler;

pub use capability::{Capability, Emitter, Fault};
pub use context::{
    DEFAULT_RETRY_DELAY, DEFAULT_RETRY_LIMIT, RouteConfig, RouteContext, RouteContextBuilder,
};
pub use envelope::{Cause, EXCEPTION_HEADER, Envelope, ExceptionState, Headers};
pub use error::{BoxError, BuildError, BuildResult, FailureSinkError, ShutdownError};
pub use expr::{Expression, ExpressionError, Template};
pub use failure::{FailureSink, UNCAUGHT_EXIT_CODE};
pub use logger::{LogMessage, Logger, Severity};
pub use processor::Processor;
pub use registry::{CapabilityRegistry, Constructor};
pub use route::{ERROR_ROUTE_SUFFIX, Route, RouteBuilder, RouteOptions};
pub use statistics::{
    CountingStatistics, NoopStatistics, ProcessorCounters, StatisticsHandler, StatisticsSnapshot,
};

/// Prelude for common imports.
pub mod prelude {
    pub use super::{
        BoxError, BuildError, Capability, Emitter, Envelope, Expression, Fault, Route,
        RouteContext, Template,
    };
}
