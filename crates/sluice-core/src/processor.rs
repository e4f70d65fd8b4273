//! Chain nodes.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::capability::Capability;
use crate::route::{Route, RouteInner};

/// A capability placed at a fixed position in a route's chain.
///
/// The processor does not own its neighbours or its route: `next`, `previous`
/// and `route` are resolved through a weak handle and the position index.
pub struct Processor {
    id: String,
    name: String,
    index: usize,
    route: Weak<RouteInner>,
    capability: Box<dyn Capability>,
}

impl Processor {
    pub(crate) fn new(
        route_name: &str,
        name: String,
        index: usize,
        route: Weak<RouteInner>,
        capability: Box<dyn Capability>,
    ) -> Self {
        Self {
            id: format!("{route_name}#{}({name})", index + 1),
            name,
            index,
            route,
            capability,
        }
    }

    /// Returns the id, `<route>#<position>(<capability>)`.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the capability name this processor was built with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the zero-based position in the chain.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the owning route, if it is still alive.
    pub fn route(&self) -> Option<Route> {
        self.route.upgrade().map(Route::from_inner)
    }

    /// Returns the following processor in the chain.
    pub fn next(&self) -> Option<Arc<Processor>> {
        self.route()?.processor(self.index + 1)
    }

    /// Returns the preceding processor in the chain.
    pub fn previous(&self) -> Option<Arc<Processor>> {
        let index = self.index.checked_sub(1)?;
        self.route()?.processor(index)
    }

    pub(crate) fn capability(&self) -> &dyn Capability {
        self.capability.as_ref()
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
