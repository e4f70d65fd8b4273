//! Route context: the explicit dependency every route is built with.
//!
//! Instead of process-wide mutable settings, retry policy, the statistics
//! collaborator and the capability registry are bundled into a
//! [`RouteContext`] and handed to each [`RouteBuilder`].
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use sluice_core::{CountingStatistics, RouteContext};
//!
//! let context = RouteContext::builder()
//!     .retry_limit(5)
//!     .retry_delay(Duration::from_millis(250))
//!     .statistics(Arc::new(CountingStatistics::new()))
//!     .build();
//!
//! let route = context.route().name("orders").build();
//! ```

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::warn;

use crate::capability::Capability;
use crate::error::BuildResult;
use crate::registry::CapabilityRegistry;
use crate::route::{Route, RouteBuilder};
use crate::statistics::{NoopStatistics, StatisticsHandler};

/// Default number of attempts before a failure is treated as exhausted.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Default delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Retry policy shared by all routes built from a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteConfig {
    /// Maximum attempts per processor before the envelope is error-routed.
    pub retry_limit: u32,
    /// Delay before re-sending a failed envelope to the same processor.
    pub retry_delay: Duration,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_RETRY_LIMIT,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

struct ContextInner {
    config: RouteConfig,
    statistics: Arc<dyn StatisticsHandler>,
    registry: CapabilityRegistry,
    route_counter: AtomicUsize,
    route_names: Mutex<HashSet<String>>,
}

/// Shared configuration, statistics and registry for a set of routes.
///
/// Cloning is cheap; clones share the route-name counter.
#[derive(Clone)]
pub struct RouteContext {
    inner: Arc<ContextInner>,
}

impl Default for RouteContext {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RouteContext {
    /// Creates a context with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder for a customised context.
    pub fn builder() -> RouteContextBuilder {
        RouteContextBuilder::default()
    }

    /// Returns the retry policy.
    pub fn config(&self) -> RouteConfig {
        self.inner.config
    }

    /// Returns the statistics collaborator.
    pub fn statistics(&self) -> &Arc<dyn StatisticsHandler> {
        &self.inner.statistics
    }

    /// Returns the capability registry.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.inner.registry
    }

    /// Starts building a route in this context.
    pub fn route(&self) -> RouteBuilder {
        Route::builder(self)
    }

    /// Generates the next `Route<N>` name.
    pub(crate) fn next_route_name(&self) -> String {
        let n = self.inner.route_counter.fetch_add(1, Ordering::Relaxed);
        format!("Route{n}")
    }

    /// Records a route name, warning when it is already taken.
    pub(crate) fn claim_route_name(&self, name: &str) {
        if !self.inner.route_names.lock().insert(name.to_owned()) {
            warn!(route = %name, "Route name is already in use");
        }
    }
}

impl fmt::Debug for RouteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteContext")
            .field("config", &self.inner.config)
            .field("capabilities", &self.inner.registry.len())
            .finish()
    }
}

// =============================================================================
// RouteContextBuilder
// =============================================================================

/// Builder for [`RouteContext`].
///
/// Capabilities must be registered here, before any route using them is built.
pub struct RouteContextBuilder {
    config: RouteConfig,
    statistics: Arc<dyn StatisticsHandler>,
    registry: CapabilityRegistry,
}

impl Default for RouteContextBuilder {
    fn default() -> Self {
        Self {
            config: RouteConfig::default(),
            statistics: Arc::new(NoopStatistics),
            registry: CapabilityRegistry::new(),
        }
    }
}

impl RouteContextBuilder {
    /// Replaces the whole retry policy.
    pub fn config(mut self, config: RouteConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the retry limit.
    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.config.retry_limit = limit;
        self
    }

    /// Sets the retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Sets the statistics collaborator.
    pub fn statistics(mut self, statistics: Arc<dyn StatisticsHandler>) -> Self {
        self.statistics = statistics;
        self
    }

    /// Replaces the capability registry.
    pub fn registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Registers one capability constructor.
    pub fn register<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&[Value]) -> BuildResult<Box<dyn Capability>> + Send + Sync + 'static,
    {
        self.registry.register(name, constructor);
        self
    }

    /// Applies a registration function, e.g. a capability crate's `register_standard`.
    pub fn with_registry(mut self, apply: impl FnOnce(&mut CapabilityRegistry)) -> Self {
        apply(&mut self.registry);
        self
    }

    /// Builds the context.
    pub fn build(self) -> RouteContext {
        RouteContext {
            inner: Arc::new(ContextInner {
                config: self.config,
                statistics: self.statistics,
                registry: self.registry,
                route_counter: AtomicUsize::new(1),
                route_names: Mutex::new(HashSet::new()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let context = RouteContext::new();
        assert_eq!(context.config().retry_limit, 3);
        assert_eq!(context.config().retry_delay, Duration::from_millis(1000));
    }

    #[test]
    fn test_route_names_are_numbered_from_one() {
        let context = RouteContext::new();
        assert_eq!(context.next_route_name(), "Route1");
        assert_eq!(context.next_route_name(), "Route2");
        assert_eq!(context.clone().next_route_name(), "Route3");
    }

    #[test]
    fn test_builder_overrides() {
        let context = RouteContext::builder()
            .retry_limit(7)
            .retry_delay(Duration::ZERO)
            .build();
        assert_eq!(
            context.config(),
            RouteConfig {
                retry_limit: 7,
                retry_delay: Duration::ZERO
            }
        );
    }
}
