//! Routes and the dispatch engine.
//!
//! A [`Route`] owns an append-only chain of [`Processor`]s and moves envelopes
//! through it one hop at a time. Every completion signal goes through a single
//! state transition deciding between forwarding, retrying, error-routing and
//! dropping.
//!
//! ## Scheduling
//!
//! - **async** routes (the default) defer each hop to the next executor turn
//! - **sync** routes run the whole chain inline in the caller's stack
//! - retries always use the synchronous send path after the retry delay
//!
//! ```rust,ignore
//! let context = RouteContext::new();
//! let route = context
//!     .route()
//!     .name("orders")
//!     .build()
//!     .then("validate", Validate)
//!     .with_capability("info", &[json!("order ${body.id} accepted")])?;
//!
//! route.inject(json!({ "id": 42 }));
//! ```

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, trace, warn};

use crate::capability::{Capability, Emitter};
use crate::context::RouteContext;
use crate::envelope::{Cause, Envelope};
use crate::error::{BoxError, BuildResult, ShutdownError};
use crate::failure::{self, CapabilityScope};
use crate::logger::{Logger, Severity};
use crate::processor::Processor;
use crate::scheduler;

/// Suffix appended to a route name to name its error route.
pub const ERROR_ROUTE_SUFFIX: &str = ".Errorroute";

/// Per-route dispatch options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOptions {
    /// Run hops inline instead of deferring them.
    pub sync: bool,
    /// The route is an error route and owns no error route of its own.
    pub is_error_route: bool,
}

pub(crate) struct RouteInner {
    name: String,
    options: RouteOptions,
    processors: RwLock<Vec<Arc<Processor>>>,
    error_route: Option<Route>,
    context: RouteContext,
}

/// A named pipeline of processors.
///
/// `Route` is a cheap handle; clones refer to the same chain.
#[derive(Clone)]
pub struct Route {
    inner: Arc<RouteInner>,
}

impl Route {
    pub(crate) fn from_inner(inner: Arc<RouteInner>) -> Self {
        Self { inner }
    }

    /// Starts building a route in `context`.
    pub fn builder(context: &RouteContext) -> RouteBuilder {
        RouteBuilder::new(context.clone())
    }

    /// Returns the route name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the dispatch options.
    pub fn options(&self) -> RouteOptions {
        self.inner.options
    }

    /// Returns whether hops run inline.
    pub fn is_sync(&self) -> bool {
        self.inner.options.sync
    }

    /// Returns whether this is an error route.
    pub fn is_error_route(&self) -> bool {
        self.inner.options.is_error_route
    }

    /// Returns the nested error route. Error routes never have one.
    pub fn error_route(&self) -> Option<&Route> {
        self.inner.error_route.as_ref()
    }

    /// Returns the context this route was built in.
    pub fn context(&self) -> &RouteContext {
        &self.inner.context
    }

    /// Returns the chain length.
    pub fn len(&self) -> usize {
        self.inner.processors.read().len()
    }

    /// Returns whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.processors.read().is_empty()
    }

    /// Returns a copy of the chain.
    pub fn processors(&self) -> Vec<Arc<Processor>> {
        self.inner.processors.read().clone()
    }

    /// Returns the processor at `index`.
    pub fn processor(&self, index: usize) -> Option<Arc<Processor>> {
        self.inner.processors.read().get(index).cloned()
    }

    /// Returns whether both handles refer to the same route.
    pub fn ptr_eq(&self, other: &Route) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Chain building
    // =========================================================================

    /// Appends a capability under `name`.
    pub fn then(self, name: impl Into<String>, capability: impl Capability) -> Self {
        self.append(name.into(), Box::new(capability));
        self
    }

    /// Appends an already boxed capability under `name`.
    pub fn then_boxed(self, name: impl Into<String>, capability: Box<dyn Capability>) -> Self {
        self.append(name.into(), capability);
        self
    }

    /// Appends a capability constructed by the context's registry.
    pub fn with_capability(self, name: &str, args: &[Value]) -> BuildResult<Self> {
        let capability = self.inner.context.registry().construct(name, args)?;
        Ok(self.then_boxed(name, capability))
    }

    fn append(&self, name: String, capability: Box<dyn Capability>) {
        let mut processors = self.inner.processors.write();
        let processor = Processor::new(
            &self.inner.name,
            name,
            processors.len(),
            Arc::downgrade(&self.inner),
            capability,
        );
        debug!(route = %self.inner.name, processor = %processor.id(), "Appended processor");
        processors.push(Arc::new(processor));
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Injects an event at the head of the chain.
    ///
    /// Does nothing when the chain is empty. Failures never propagate back
    /// to the caller.
    pub fn inject(&self, event: impl Into<Envelope>) -> &Self {
        let Some(first) = self.processor(0) else {
            trace!(route = %self.name(), "Injected into empty route, ignoring");
            return self;
        };
        self.context().statistics().event_injected(self);
        self.send_to_processor(first, event.into());
        self
    }

    fn send_to_processor(&self, processor: Arc<Processor>, envelope: Envelope) {
        if self.is_sync() {
            self.send_to_processor_sync(&processor, envelope);
        } else {
            let route = self.clone();
            scheduler::defer(move || route.send_to_processor_sync(&processor, envelope));
        }
    }

    fn send_to_processor_sync(&self, processor: &Arc<Processor>, envelope: Envelope) {
        self.context()
            .statistics()
            .event_received_by_processor(self, processor);

        let snapshot = envelope.clone();
        let emitter = Emitter::new(self.clone(), Arc::clone(processor));
        let outcome = {
            let _scope = CapabilityScope::enter();
            panic::catch_unwind(AssertUnwindSafe(|| {
                processor.capability().data(envelope, emitter)
            }))
        };

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(fault)) => self.dispatch_event(processor, Some(fault.cause), fault.envelope),
            Err(payload) => {
                let message = failure::panic_message(payload.as_ref());
                let cause = Cause::msg(format!("capability panicked: {message}"));
                self.dispatch_event(processor, Some(cause), snapshot);
            }
        }
    }

    /// Handles the completion signal of `processor`.
    pub(crate) fn dispatch_event(
        &self,
        processor: &Arc<Processor>,
        err: Option<Cause>,
        mut envelope: Envelope,
    ) {
        self.context()
            .statistics()
            .event_emitted_by_processor(self, processor);

        let Some(cause) = err else {
            match self.processor(processor.index() + 1) {
                Some(next) => self.send_to_processor(next, envelope),
                None => trace!(route = %self.name(), "Envelope reached the end of the chain"),
            }
            return;
        };

        let attempt = envelope.record_failure(cause.clone(), processor.id());
        let config = self.context().config();
        warn!(
            route = %self.name(),
            processor = %processor.id(),
            attempt,
            retry_limit = config.retry_limit,
            error = %cause,
            "Processor failed"
        );

        if attempt < config.retry_limit {
            let route = self.clone();
            let processor = Arc::clone(processor);
            scheduler::defer_after(config.retry_delay, move || {
                route.send_to_processor_sync(&processor, envelope);
            });
        } else if let Some(error_route) = self.error_route() {
            warn!(
                route = %self.name(),
                processor = %processor.id(),
                error_route = %error_route.name(),
                "Retries exhausted, forwarding to error route"
            );
            error_route.inject(envelope);
        } else {
            error!(
                route = %self.name(),
                processor = %processor.id(),
                envelope = %envelope,
                "Unrecoverable failure, dropping envelope"
            );
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Shuts every processor down in chain order.
    ///
    /// Stops at the first failure, leaving the remaining processors running,
    /// and returns that failure. The error route is not shut down.
    pub async fn shut_down(&self) -> Result<(), ShutdownError> {
        for processor in self.processors() {
            trace!(route = %self.name(), processor = %processor.id(), "Shutting down processor");

            let mut pending = processor.capability().shut_down();
            let scoped = futures::future::poll_fn(|cx| {
                let _scope = CapabilityScope::enter();
                pending.as_mut().poll(cx)
            });
            let result = match AssertUnwindSafe(scoped).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(BoxError::from(format!(
                    "shutdown panicked: {}",
                    failure::panic_message(payload.as_ref())
                ))),
            };

            if let Err(source) = result {
                error!(
                    route = %self.name(),
                    processor = %processor.id(),
                    error = %source,
                    "Processor failed to shut down"
                );
                return Err(ShutdownError {
                    processor_id: processor.id().to_owned(),
                    source,
                });
            }
        }
        debug!(route = %self.name(), "Route shut down");
        Ok(())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let processors: Vec<String> = self
            .inner
            .processors
            .read()
            .iter()
            .map(|p| p.id().to_owned())
            .collect();
        f.debug_struct("Route")
            .field("name", &self.inner.name)
            .field("options", &self.inner.options)
            .field("processors", &processors)
            .field("error_route", &self.error_route().map(Route::name))
            .finish()
    }
}

// =============================================================================
// RouteBuilder
// =============================================================================

/// Builder for [`Route`].
#[derive(Debug)]
pub struct RouteBuilder {
    context: RouteContext,
    name: Option<String>,
    options: RouteOptions,
}

impl RouteBuilder {
    fn new(context: RouteContext) -> Self {
        Self {
            context,
            name: None,
            options: RouteOptions::default(),
        }
    }

    /// Sets the route name. Unnamed routes are called `Route<N>`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Runs hops inline instead of deferring them.
    pub fn sync(mut self, sync: bool) -> Self {
        self.options.sync = sync;
        self
    }

    /// Marks the route as an error route.
    pub fn error_route(mut self, is_error_route: bool) -> Self {
        self.options.is_error_route = is_error_route;
        self
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: RouteOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the route, together with its error route unless it is one.
    pub fn build(self) -> Route {
        let name = self
            .name
            .unwrap_or_else(|| self.context.next_route_name());
        self.context.claim_route_name(&name);

        let error_route = if self.options.is_error_route {
            None
        } else {
            Some(
                RouteBuilder::new(self.context.clone())
                    .name(format!("{name}{ERROR_ROUTE_SUFFIX}"))
                    .sync(true)
                    .error_route(true)
                    .build()
                    .then("error", Logger::new(Severity::Error))
                    .then("error", Logger::cause(Severity::Error)),
            )
        };

        debug!(
            route = %name,
            sync = self.options.sync,
            is_error_route = self.options.is_error_route,
            "Built route"
        );
        Route::from_inner(Arc::new(RouteInner {
            name,
            options: self.options,
            processors: RwLock::new(Vec::new()),
            error_route,
            context: self.context,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Fault;
    use crate::error::BuildError;
    use crate::statistics::CountingStatistics;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records its label and forwards.
    struct Record {
        label: &'static str,
        log: Log,
    }

    impl Capability for Record {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            self.log.lock().push(self.label.to_owned());
            emitter.emit(envelope);
            Ok(())
        }
    }

    /// Fails every call, remembering the attempt count it was handed.
    struct AlwaysFail {
        seen: Arc<Mutex<Vec<Option<u32>>>>,
    }

    impl Capability for AlwaysFail {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            self.seen
                .lock()
                .push(envelope.exception().map(|e| e.number_of_attempts));
            emitter.emit_error("boom", envelope);
            Ok(())
        }
    }

    /// Keeps every envelope it receives.
    struct Capture(Arc<Mutex<Vec<Envelope>>>);

    impl Capability for Capture {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            self.0.lock().push(envelope.clone());
            emitter.emit(envelope);
            Ok(())
        }
    }

    /// Records its shutdown and optionally fails it.
    struct Closing {
        label: &'static str,
        fail: bool,
        log: Log,
    }

    #[async_trait]
    impl Capability for Closing {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            emitter.emit(envelope);
            Ok(())
        }

        async fn shut_down(&self) -> Result<(), BoxError> {
            tokio::task::yield_now().await;
            self.log.lock().push(self.label.to_owned());
            if self.fail {
                return Err(format!("{} refused", self.label).into());
            }
            Ok(())
        }
    }

    fn record(label: &'static str, log: &Log) -> Record {
        Record {
            label,
            log: Arc::clone(log),
        }
    }

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_order_once() {
        let statistics = Arc::new(CountingStatistics::new());
        let context = RouteContext::builder()
            .statistics(statistics.clone())
            .build();
        let log = Log::default();
        let route = context
            .route()
            .name("orders")
            .build()
            .then("a", record("a", &log))
            .then("b", record("b", &log))
            .then("c", record("c", &log));

        route.inject(json!({"id": 1}));
        assert!(log.lock().is_empty(), "async route must not run inline");

        settle().await;
        assert_eq!(*log.lock(), ["a", "b", "c"]);
        assert_eq!(statistics.injected("orders"), 1);
        for id in ["orders#1(a)", "orders#2(b)", "orders#3(c)"] {
            let counters = statistics.processor(id);
            assert_eq!((counters.received, counters.emitted), (1, 1), "{id}");
        }
    }

    #[test]
    fn test_sync_route_runs_inline() {
        let context = RouteContext::new();
        let log = Log::default();
        let route = context
            .route()
            .sync(true)
            .build()
            .then("a", record("a", &log))
            .then("b", record("b", &log));

        route.inject("payload");
        assert_eq!(*log.lock(), ["a", "b"]);
    }

    #[test]
    fn test_inject_into_empty_route_is_noop() {
        let statistics = Arc::new(CountingStatistics::new());
        let context = RouteContext::builder()
            .statistics(statistics.clone())
            .build();
        let route = context.route().name("empty").build();

        route.inject("ignored");
        assert_eq!(statistics.injected("empty"), 0);
    }

    #[test]
    fn test_names_ids_and_links() {
        let context = RouteContext::new();
        let log = Log::default();
        let route = context
            .route()
            .build()
            .then("first", record("a", &log))
            .then("second", record("b", &log));

        assert_eq!(route.name(), "Route1");
        let error_route = route.error_route().unwrap();
        assert_eq!(error_route.name(), "Route1.Errorroute");
        assert!(error_route.is_sync());
        assert!(error_route.error_route().is_none());
        assert_eq!(error_route.len(), 2);

        let first = route.processor(0).unwrap();
        let second = first.next().unwrap();
        assert_eq!(first.id(), "Route1#1(first)");
        assert_eq!(second.id(), "Route1#2(second)");
        assert!(first.previous().is_none());
        assert!(second.next().is_none());
        assert_eq!(second.previous().unwrap().id(), first.id());
        assert!(second.route().unwrap().ptr_eq(&route));
    }

    #[test]
    fn test_error_route_owns_no_error_route() {
        let context = RouteContext::new();
        let route = context.route().name("sink").error_route(true).build();
        assert!(route.error_route().is_none());
        assert!(route.is_error_route());
    }

    #[test]
    fn test_with_capability() {
        let context = RouteContext::new();
        let route = context
            .route()
            .build()
            .with_capability("info", &[json!("id=${body.id}")])
            .unwrap();
        assert_eq!(route.processor(0).unwrap().name(), "info");

        let err = context.route().build().with_capability("missing", &[]);
        assert!(matches!(err, Err(BuildError::UnknownCapability { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_then_error_route() {
        let context = RouteContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::new(Mutex::new(Vec::new()));
        let route = context.route().name("orders").build().then(
            "fail",
            AlwaysFail {
                seen: Arc::clone(&seen),
            },
        );
        route
            .error_route()
            .unwrap()
            .clone()
            .then("capture", Capture(Arc::clone(&captured)));

        route.inject(json!({"x": 1}));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(*seen.lock(), [None, Some(1)]);
        assert!(captured.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*seen.lock(), [None, Some(1), Some(2)]);

        let captured = captured.lock();
        assert_eq!(captured.len(), 1);
        let exception = captured[0].exception().unwrap();
        assert_eq!(exception.number_of_attempts, 3);
        assert_eq!(exception.processor_id.as_deref(), Some("orders#1(fail)"));
        assert_eq!(exception.cause.to_string(), "boom");
        assert_eq!(captured[0].body, json!({"x": 1}));
    }

    #[test]
    fn test_unrecoverable_failure_is_dropped() {
        let context = RouteContext::builder()
            .retry_limit(2)
            .retry_delay(Duration::ZERO)
            .build();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Log::default();
        let route = context
            .route()
            .sync(true)
            .error_route(true)
            .build()
            .then(
                "fail",
                AlwaysFail {
                    seen: Arc::clone(&seen),
                },
            )
            .then("after", record("after", &log));

        route.inject(json!({"x": 1}));
        assert_eq!(*seen.lock(), [None, Some(1)]);
        assert!(log.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_returned_fault_and_panic_are_failures() {
        struct Faulty;
        impl Capability for Faulty {
            fn data(&self, envelope: Envelope, _emitter: Emitter) -> Result<(), Fault> {
                Err(Fault::new("bad input", envelope))
            }
        }

        struct Panicky;
        impl Capability for Panicky {
            fn data(&self, _envelope: Envelope, _emitter: Emitter) -> Result<(), Fault> {
                panic!("kaboom");
            }
        }

        let context = RouteContext::builder().retry_limit(1).build();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let faulty = context.route().name("faulty").build().then("faulty", Faulty);
        let panicky = context.route().name("panicky").build().then("panicky", Panicky);
        for route in [&faulty, &panicky] {
            route
                .error_route()
                .unwrap()
                .clone()
                .then("capture", Capture(Arc::clone(&captured)));
        }

        faulty.inject(json!({"n": 1}));
        panicky.inject(json!({"n": 2}));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let captured = captured.lock();
        assert_eq!(captured.len(), 2);
        let causes: Vec<String> = captured
            .iter()
            .map(|e| e.exception().unwrap().cause.to_string())
            .collect();
        assert!(causes.contains(&"bad input".to_owned()));
        assert!(causes.contains(&"capability panicked: kaboom".to_owned()));
        assert!(captured.iter().any(|e| e.body == json!({"n": 2})));
    }

    #[tokio::test]
    async fn test_emit_from_spawned_task() {
        struct Later;
        impl Capability for Later {
            fn data(&self, mut envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    envelope.body = json!("late");
                    emitter.emit(envelope);
                });
                Ok(())
            }
        }

        let context = RouteContext::new();
        let captured = Arc::new(Mutex::new(Vec::new()));
        let route = context
            .route()
            .build()
            .then("later", Later)
            .then("capture", Capture(Arc::clone(&captured)));

        route.inject("early");
        settle().await;
        assert_eq!(captured.lock()[0].body, json!("late"));
    }

    #[tokio::test]
    async fn test_shutdown_in_order() {
        let context = RouteContext::new();
        let log = Log::default();
        let closing = |label, fail| Closing {
            label,
            fail,
            log: Arc::clone(&log),
        };
        let route = context
            .route()
            .build()
            .then("one", closing("one", false))
            .then("two", closing("two", false));

        tokio_test::assert_ok!(route.shut_down().await);
        assert_eq!(*log.lock(), ["one", "two"]);
    }

    #[tokio::test]
    async fn test_shutdown_stops_at_first_failure() {
        let context = RouteContext::new();
        let log = Log::default();
        let closing = |label, fail| Closing {
            label,
            fail,
            log: Arc::clone(&log),
        };
        let route = context
            .route()
            .name("svc")
            .build()
            .then("one", closing("one", false))
            .then("two", closing("two", true))
            .then("three", closing("three", false))
            .then("four", closing("four", false));

        let err = tokio_test::assert_err!(route.shut_down().await);
        assert_eq!(err.processor_id, "svc#2(two)");
        assert_eq!(err.source.to_string(), "two refused");
        assert_eq!(*log.lock(), ["one", "two"]);
    }
}
