//! Array sink.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use sluice_core::{Capability, Emitter, Envelope, Fault};

/// A shared, growable list of envelopes.
///
/// Clones share the same storage, so the application keeps one handle and
/// gives another to [`ToArray`].
#[derive(Debug, Clone, Default)]
pub struct Collector {
    envelopes: Arc<Mutex<Vec<Envelope>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.envelopes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.envelopes.lock().is_empty()
    }

    /// Returns copies of the collected envelopes.
    pub fn snapshot(&self) -> Vec<Envelope> {
        self.envelopes.lock().clone()
    }

    /// Returns copies of the collected bodies.
    pub fn bodies(&self) -> Vec<Value> {
        self.envelopes
            .lock()
            .iter()
            .map(|envelope| envelope.body.clone())
            .collect()
    }

    /// Removes and returns everything collected so far.
    pub fn take(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.envelopes.lock())
    }

    fn push(&self, envelope: Envelope) {
        self.envelopes.lock().push(envelope);
    }
}

/// Appends a copy of each envelope to a [`Collector`] and forwards it.
#[derive(Debug, Clone)]
pub struct ToArray {
    collector: Collector,
}

impl ToArray {
    pub fn new(collector: Collector) -> Self {
        Self { collector }
    }
}

impl Capability for ToArray {
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        self.collector.push(envelope.clone());
        emitter.emit(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RouteExt;
    use serde_json::json;
    use sluice_core::RouteContext;

    #[test]
    fn test_collects_in_order_and_takes() {
        let context = RouteContext::new();
        let collector = Collector::new();
        let route = context.route().sync(true).build().to_array(&collector);

        route.inject(json!(1)).inject(json!(2));
        assert_eq!(collector.bodies(), [json!(1), json!(2)]);

        assert_eq!(collector.take().len(), 2);
        assert!(collector.is_empty());
    }
}
