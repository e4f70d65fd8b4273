//! Statistics collaborator.
//!
//! The dispatch core reports three kinds of observations and never consumes
//! a return value: an envelope was injected into a route, a processor received
//! an envelope, and a processor emitted (successfully or not).

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;

use crate::processor::Processor;
use crate::route::Route;

/// Side-effect-only hooks called by the dispatch core.
pub trait StatisticsHandler: Send + Sync {
    /// An envelope was injected into `route`.
    fn event_injected(&self, _route: &Route) {}

    /// `processor` signalled completion, successful or not.
    fn event_emitted_by_processor(&self, _route: &Route, _processor: &Processor) {}

    /// `processor` is about to process an envelope.
    fn event_received_by_processor(&self, _route: &Route, _processor: &Processor) {}
}

/// A collaborator that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStatistics;

impl StatisticsHandler for NoopStatistics {}

/// Per-processor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorCounters {
    /// Envelopes handed to the processor, retries included.
    pub received: u64,
    /// Completion signals, failures included.
    pub emitted: u64,
}

/// A point-in-time copy of [`CountingStatistics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    /// Injections per route name.
    pub injected: BTreeMap<String, u64>,
    /// Counters per processor id.
    pub processors: BTreeMap<String, ProcessorCounters>,
}

#[derive(Default)]
struct Counters {
    injected: HashMap<String, u64>,
    processors: HashMap<String, ProcessorCounters>,
}

/// A collaborator that counts every observation.
#[derive(Default)]
pub struct CountingStatistics {
    counters: Mutex<Counters>,
}

impl CountingStatistics {
    /// Creates an empty counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        let counters = self.counters.lock();
        StatisticsSnapshot {
            injected: counters
                .injected
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            processors: counters
                .processors
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Returns the number of injections into a route.
    pub fn injected(&self, route: &str) -> u64 {
        self.counters
            .lock()
            .injected
            .get(route)
            .copied()
            .unwrap_or_default()
    }

    /// Returns the counters of one processor.
    pub fn processor(&self, id: &str) -> ProcessorCounters {
        self.counters
            .lock()
            .processors
            .get(id)
            .copied()
            .unwrap_or_default()
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        *self.counters.lock() = Counters::default();
    }
}

impl StatisticsHandler for CountingStatistics {
    fn event_injected(&self, route: &Route) {
        trace!(route = %route.name(), "Envelope injected");
        *self
            .counters
            .lock()
            .injected
            .entry(route.name().to_owned())
            .or_default() += 1;
    }

    fn event_emitted_by_processor(&self, route: &Route, processor: &Processor) {
        trace!(route = %route.name(), processor = %processor.id(), "Envelope emitted");
        self.counters
            .lock()
            .processors
            .entry(processor.id().to_owned())
            .or_default()
            .emitted += 1;
    }

    fn event_received_by_processor(&self, route: &Route, processor: &Processor) {
        trace!(route = %route.name(), processor = %processor.id(), "Envelope received");
        self.counters
            .lock()
            .processors
            .entry(processor.id().to_owned())
            .or_default()
            .received += 1;
    }
}

impl std::fmt::Display for StatisticsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let injected: u64 = self.injected.values().sum();
        let received: u64 = self.processors.values().map(|c| c.received).sum();
        write!(
            f,
            "{injected} injected across {} route(s), {received} processor receipts",
            self.injected.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, Emitter, Fault};
    use crate::context::RouteContext;
    use crate::envelope::Envelope;
    use std::sync::Arc;
    use std::time::Duration;

    struct FailOnce(Mutex<bool>);

    impl Capability for FailOnce {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            let first_call = !std::mem::replace(&mut *self.0.lock(), true);
            if first_call {
                emitter.emit_error("flaky", envelope);
            } else {
                emitter.emit(envelope);
            }
            Ok(())
        }
    }

    #[test]
    fn test_retries_count_as_receipts() {
        let statistics = Arc::new(CountingStatistics::new());
        let context = RouteContext::builder()
            .statistics(statistics.clone())
            .retry_delay(Duration::ZERO)
            .build();
        let route = context
            .route()
            .name("flaky")
            .sync(true)
            .build()
            .then("once", FailOnce(Mutex::new(false)));

        route.inject("payload");

        let snapshot = statistics.snapshot();
        assert_eq!(snapshot.injected["flaky"], 1);
        assert_eq!(
            snapshot.processors["flaky#1(once)"],
            ProcessorCounters {
                received: 2,
                emitted: 2
            }
        );
        assert_eq!(
            snapshot.to_string(),
            "1 injected across 1 route(s), 2 processor receipts"
        );

        statistics.reset();
        assert_eq!(statistics.snapshot(), StatisticsSnapshot::default());
    }
}
