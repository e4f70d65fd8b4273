//! The global failure sink.
//!
//! Failures that cannot be attributed to a processor (a panic anywhere in the
//! process outside a capability call) are wrapped into a fresh envelope and
//! injected into a process-wide error route. Installing the panic hook wires
//! this up; once the sink is cleared, such a failure terminates the process
//! with [`UNCAUGHT_EXIT_CODE`].
//!
//! ```rust,ignore
//! let context = RouteContext::new();
//! failure::install(&context);
//!
//! std::thread::spawn(|| panic!("worker died")); // routed to "GlobalErrorroute"
//! ```

use std::any::Any;
use std::cell::Cell;
use std::panic;
use std::sync::{Once, OnceLock};

use parking_lot::RwLock;
use tracing::{error, info};

use crate::context::RouteContext;
use crate::envelope::{Cause, Envelope, ExceptionState};
use crate::error::FailureSinkError;
use crate::logger::{Logger, Severity};
use crate::route::Route;

/// Exit status used when an uncaught failure has nowhere to go.
pub const UNCAUGHT_EXIT_CODE: i32 = 8;

/// Name of the default sink route.
pub const GLOBAL_SINK_NAME: &str = "GlobalErrorroute";

/// Body of the envelope synthesised for an uncaught failure.
pub const UNCAUGHT_BODY: &str = "Uncaught exception.";

static GLOBAL: OnceLock<FailureSink> = OnceLock::new();
static HOOK: Once = Once::new();

thread_local! {
    static CAPABILITY_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as running capability code.
///
/// Panics raised while a scope is open are caught by the dispatch core, so
/// the panic hook leaves them alone.
pub(crate) struct CapabilityScope(());

impl CapabilityScope {
    pub(crate) fn enter() -> Self {
        CAPABILITY_DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self(())
    }
}

impl Drop for CapabilityScope {
    fn drop(&mut self) {
        CAPABILITY_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Returns whether the current thread is inside a capability call.
pub fn inside_capability() -> bool {
    CAPABILITY_DEPTH.with(Cell::get) > 0
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

// =============================================================================
// FailureSink
// =============================================================================

/// Holder of the route receiving uncaught failures.
#[derive(Debug)]
pub struct FailureSink {
    route: RwLock<Option<Route>>,
}

impl FailureSink {
    /// Creates a sink backed by the default `GlobalErrorroute`.
    pub fn new(context: &RouteContext) -> Self {
        Self::with_route(default_route(context))
    }

    /// Creates a sink backed by `route`.
    pub fn with_route(route: Route) -> Self {
        Self {
            route: RwLock::new(Some(route)),
        }
    }

    /// Returns the sink route, unless it has been cleared.
    pub fn route(&self) -> Option<Route> {
        self.route.read().clone()
    }

    /// Replaces the sink route.
    pub fn replace(&self, route: Route) -> Option<Route> {
        self.route.write().replace(route)
    }

    /// Removes the sink route. Uncaught failures then terminate the process.
    pub fn clear(&self) -> Option<Route> {
        self.route.write().take()
    }

    /// Injects an uncaught failure into the sink route.
    pub fn report(&self, cause: Cause) -> Result<(), FailureSinkError> {
        let route = self.route().ok_or(FailureSinkError::Cleared)?;
        let mut envelope = Envelope::new(UNCAUGHT_BODY);
        envelope.set_exception(Some(ExceptionState::uncaught(cause)));
        route.inject(envelope);
        Ok(())
    }
}

/// Builds the default sink route: async, an error route, two `fatal` loggers.
pub fn default_route(context: &RouteContext) -> Route {
    context
        .route()
        .name(GLOBAL_SINK_NAME)
        .error_route(true)
        .build()
        .then("fatal", Logger::new(Severity::Fatal))
        .then("fatal", Logger::cause(Severity::Fatal))
}

// =============================================================================
// Process-wide installation
// =============================================================================

/// Installs the global sink and the panic hook feeding it.
///
/// The sink is created once; later calls return the existing one.
pub fn install(context: &RouteContext) -> &'static FailureSink {
    let sink = GLOBAL.get_or_init(|| {
        info!(route = GLOBAL_SINK_NAME, "Installed global failure sink");
        FailureSink::new(context)
    });
    install_panic_hook();
    sink
}

/// Returns the installed global sink.
pub fn global() -> Option<&'static FailureSink> {
    GLOBAL.get()
}

/// Clears the global sink route.
pub fn clear() -> Option<Route> {
    global().and_then(FailureSink::clear)
}

/// Reports an uncaught failure to the global sink.
pub fn report_uncaught(cause: Cause) -> Result<(), FailureSinkError> {
    global().ok_or(FailureSinkError::Cleared)?.report(cause)
}

/// Installs a panic hook routing panics outside capability calls to the
/// global sink. Installing twice has no effect.
///
/// Such a panic is logged and passed to the previously installed hook before
/// it is injected into the sink.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if inside_capability() {
                return;
            }
            let mut message = panic_message(info.payload());
            if let Some(location) = info.location() {
                message = format!("{message} at {location}");
            }
            error!(cause = %message, "Uncaught panic");
            previous(info);
            if let Err(err) = report_uncaught(Cause::msg(message)) {
                error!(error = %err, "Uncaught failure with no sink, exiting");
                std::process::exit(UNCAUGHT_EXIT_CODE);
            }
        }));
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, Emitter, Fault};
    use std::sync::Arc;

    struct Capture(Arc<parking_lot::Mutex<Vec<Envelope>>>);

    impl Capability for Capture {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            self.0.lock().push(envelope.clone());
            emitter.emit(envelope);
            Ok(())
        }
    }

    #[test]
    fn test_default_route_shape() {
        let context = RouteContext::new();
        let route = default_route(&context);
        assert_eq!(route.name(), "GlobalErrorroute");
        assert!(route.is_error_route());
        assert!(!route.is_sync());
        assert!(route.error_route().is_none());
        let names: Vec<String> = route.processors().iter().map(|p| p.name().to_owned()).collect();
        assert_eq!(names, ["fatal", "fatal"]);
    }

    #[test]
    fn test_report_builds_uncaught_envelope() {
        let context = RouteContext::new();
        let captured = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let route = context
            .route()
            .sync(true)
            .error_route(true)
            .build()
            .then("capture", Capture(Arc::clone(&captured)));
        let sink = FailureSink::with_route(route);

        sink.report(Cause::msg("worker died")).unwrap();

        let captured = captured.lock();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].body, serde_json::json!("Uncaught exception."));
        let exception = captured[0].exception().unwrap();
        assert_eq!(exception.number_of_attempts, 0);
        assert!(exception.processor_id.is_none());
        assert_eq!(exception.cause.to_string(), "worker died");
    }

    #[test]
    fn test_cleared_sink_rejects_reports() {
        let context = RouteContext::new();
        let sink = FailureSink::new(&context);
        assert!(sink.clear().is_some());
        assert_eq!(
            sink.report(Cause::msg("lost")),
            Err(FailureSinkError::Cleared)
        );
    }

    #[test]
    fn test_capability_scope_nests() {
        assert!(!inside_capability());
        {
            let _outer = CapabilityScope::enter();
            let _inner = CapabilityScope::enter();
            assert!(inside_capability());
        }
        assert!(!inside_capability());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
