//! # Sluice Capabilities
//!
//! The standard capability set: closures ([`Process`], [`Map`]), content
//! filtering ([`Filter`]), content-based routing ([`Choice`]), fan-out
//! ([`Dispatch`]), an array sink ([`ToArray`]) and sandboxed assignment
//! ([`Set`]).
//!
//! Routes in code use the [`RouteExt`] methods; routes assembled from data
//! use the names installed by [`register_standard`].
//!
//! ```rust,ignore
//! use sluice_capabilities::{Collector, RouteExt, When};
//!
//! let audit = Collector::new();
//! let route = context
//!     .route()
//!     .name("orders")
//!     .build()
//!     .filter("body.amount > 0")?
//!     .set("headers.large", "body.amount >= 1000")?
//!     .choice("headers.large", [When::value(true, review.clone())])?
//!     .to_array(&audit);
//! ```

mod assign;
mod choice;
mod collector;
mod dispatcher;
mod ext;
mod filter;
mod mapper;

use serde_json::Value;
use sluice_core::{BuildError, Capability, CapabilityRegistry, Logger, Severity};

pub use assign::{Set, Target};
pub use choice::{Choice, When};
pub use collector::{Collector, ToArray};
pub use dispatcher::Dispatch;
pub use ext::RouteExt;
pub use filter::Filter;
pub use mapper::{Map, Process};

/// Registers the data-constructible standard capabilities:
///
/// - `filter`: `[condition]`
/// - `set`: `[target, expression]`
/// - `log`: `[severity]` or `[severity, template]`
pub fn register_standard(registry: &mut CapabilityRegistry) {
    registry
        .register("filter", |args| {
            Ok(Box::new(Filter::from_args(args)?) as Box<dyn Capability>)
        })
        .register("set", |args| {
            Ok(Box::new(Set::from_args(args)?) as Box<dyn Capability>)
        })
        .register("log", |args| {
            let Some((Value::String(level), rest)) = args.split_first() else {
                return Err(BuildError::invalid_args("log", "expected a severity first"));
            };
            let severity = Severity::from_name(level).ok_or_else(|| {
                BuildError::invalid_args("log", format!("unknown severity '{level}'"))
            })?;
            Ok(Box::new(Logger::from_args(severity, rest)?) as Box<dyn Capability>)
        });
}
