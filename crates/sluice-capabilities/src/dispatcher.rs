//! Fan-out.

use sluice_core::{Capability, Emitter, Envelope, Fault, Route};

/// Injects a copy of each envelope into every destination route, then
/// forwards the original.
#[derive(Debug, Clone)]
pub struct Dispatch {
    routes: Vec<Route>,
}

impl Dispatch {
    pub fn new(routes: impl IntoIterator<Item = Route>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }
}

impl Capability for Dispatch {
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        for route in &self.routes {
            route.inject(envelope.clone());
        }
        emitter.emit(envelope);
        Ok(())
    }
}
