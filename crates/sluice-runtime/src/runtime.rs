//! Runtime orchestration.
//!
//! The runtime owns the [`RouteContext`] every route is built in, installs
//! the global failure sink, assembles the routes declared in configuration
//! and shuts everything down in registration order.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sluice_runtime::SluiceRuntime;
//!
//! // Loads sluice.toml from the current directory when present
//! let runtime = SluiceRuntime::new();
//!
//! // Custom configuration path and extra capabilities
//! let runtime = SluiceRuntime::builder()
//!     .config_file("config/sluice.toml")
//!     .register_capability("stamp", |args| Stamp::from_args(args))
//!     .build()?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::signal;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, RouteDefinition, SluiceConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use sluice_capabilities::register_standard;
use sluice_core::{
    BuildResult, Capability, CapabilityRegistry, CountingStatistics, FailureSink, Route,
    RouteContext, failure,
};

type Registration = Box<dyn FnOnce(&mut CapabilityRegistry)>;

/// The Sluice runtime.
///
/// ```rust,ignore
/// let runtime = SluiceRuntime::builder().build()?;
///
/// let orders = runtime.context().route().name("orders").build().filter("body.amount > 0")?;
/// runtime.register(orders.clone())?;
///
/// orders.inject(json!({"amount": 12}));
/// runtime.run().await?;
/// ```
pub struct SluiceRuntime {
    config: SluiceConfig,
    context: RouteContext,
    statistics: Arc<CountingStatistics>,
    sink: &'static FailureSink,
    routes: RwLock<Vec<Route>>,
}

impl SluiceRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Falls back to the default configuration when loading fails; configured
    /// routes that fail to build are logged and skipped.
    pub fn new() -> Self {
        let config = ConfigLoader::new()
            .with_current_dir()
            .load()
            .unwrap_or_else(|e| {
                eprintln!("Warning: Failed to load config ({e}), using defaults");
                SluiceConfig::default()
            });

        let runtime = Self::assemble(config, Vec::new());
        if let Err(e) = runtime.build_configured_routes() {
            error!(error = %e, "Failed to build configured routes");
        }
        runtime
    }

    /// Creates a runtime builder for custom configuration.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Creates a runtime from an already loaded configuration.
    pub fn from_config(config: &SluiceConfig) -> RuntimeResult<Self> {
        let runtime = Self::assemble(config.clone(), Vec::new());
        runtime.build_configured_routes()?;
        Ok(runtime)
    }

    fn assemble(config: SluiceConfig, registrations: Vec<Registration>) -> Self {
        logging::init_from_config(&config.logging);

        let statistics = Arc::new(CountingStatistics::new());
        let mut builder = RouteContext::builder()
            .config(config.routing.to_route_config())
            .statistics(statistics.clone())
            .with_registry(register_standard);
        for registration in registrations {
            builder = builder.with_registry(registration);
        }
        let context = builder.build();
        let sink = failure::install(&context);

        info!(
            log_level = %config.logging.level,
            retry_limit = config.routing.retry_limit,
            retry_delay_ms = config.routing.retry_delay_ms,
            capabilities = context.registry().len(),
            "Runtime initialized from configuration"
        );

        Self {
            config,
            context,
            statistics,
            sink,
            routes: RwLock::new(Vec::new()),
        }
    }

    fn build_configured_routes(&self) -> RuntimeResult<()> {
        for definition in &self.config.routes {
            let route = self.build_route(definition)?;
            self.register(route)?;
        }
        Ok(())
    }

    /// Assembles one route from its definition through the registry.
    pub fn build_route(&self, definition: &RouteDefinition) -> RuntimeResult<Route> {
        let mut route = self
            .context
            .route()
            .name(&definition.name)
            .sync(definition.sync)
            .build();

        for step in &definition.steps {
            route = route
                .with_capability(&step.capability, &step.args)
                .map_err(|source| RuntimeError::Build {
                    route: definition.name.clone(),
                    source,
                })?;
        }

        debug!(route = %route.name(), processors = route.len(), "Built configured route");
        Ok(route)
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &SluiceConfig {
        &self.config
    }

    /// Returns the context new routes should be built in.
    pub fn context(&self) -> &RouteContext {
        &self.context
    }

    /// Returns the statistics collected for every route of this runtime.
    pub fn statistics(&self) -> &Arc<CountingStatistics> {
        &self.statistics
    }

    /// Returns the process-wide failure sink.
    pub fn failure_sink(&self) -> &'static FailureSink {
        self.sink
    }

    /// Registers a route so it can be looked up and is shut down with the runtime.
    pub fn register(&self, route: Route) -> RuntimeResult<()> {
        let mut routes = self.routes.write();
        if routes.iter().any(|r| r.name() == route.name()) {
            return Err(RuntimeError::RouteExists(route.name().to_owned()));
        }
        info!(route = %route.name(), processors = route.len(), "Registered route");
        routes.push(route);
        Ok(())
    }

    /// Looks a registered route up by name.
    pub fn route(&self, name: &str) -> Option<Route> {
        self.routes.read().iter().find(|r| r.name() == name).cloned()
    }

    /// Returns every registered route in registration order.
    pub fn routes(&self) -> Vec<Route> {
        self.routes.read().clone()
    }

    /// Shuts every registered route down in registration order.
    ///
    /// A route stops at its first failing processor; the failure is logged
    /// and the remaining routes are still shut down. Returns the number of
    /// routes whose shutdown failed.
    pub async fn shutdown(&self) -> usize {
        let routes = self.routes();
        info!(routes = routes.len(), "Stopping Sluice runtime");

        let mut failed = 0;
        for route in &routes {
            match route.shut_down().await {
                Ok(()) => debug!(route = %route.name(), "Route shut down"),
                Err(e) => {
                    failed += 1;
                    error!(route = %route.name(), error = %e, "Error during route shutdown");
                }
            }
        }

        info!("Runtime stopped");
        failed
    }

    /// Runs until a shutdown signal is received, then shuts down.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!("Sluice runtime is now running. Press Ctrl+C to stop.");

        self.wait_for_shutdown().await?;
        self.shutdown().await;

        Ok(())
    }

    /// Runs until `shutdown` completes, then shuts down.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        shutdown.await;
        self.shutdown().await;

        Ok(())
    }

    /// Waits for shutdown signals (Ctrl+C or SIGTERM).
    async fn wait_for_shutdown(&self) -> RuntimeResult<()> {
        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .map_err(RuntimeError::Signal)?;

            tokio::select! {
                result = signal::ctrl_c() => {
                    result.map_err(RuntimeError::Signal)?;
                    info!("Received Ctrl+C, shutting down");
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
            info!("Received Ctrl+C, shutting down");
        }

        Ok(())
    }
}

impl Default for SluiceRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SluiceRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SluiceRuntime")
            .field("context", &self.context)
            .field("routes", &self.routes.read().len())
            .finish()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for creating a [`SluiceRuntime`] with custom configuration.
///
/// ```rust,ignore
/// let runtime = SluiceRuntime::builder()
///     .config_file("config/production.toml")
///     .profile("production")
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    registrations: Vec<Registration>,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new().with_current_dir(),
            registrations: Vec::new(),
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: SluiceConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Registers a capability constructor next to the standard ones, so
    /// configured routes can use it.
    pub fn register_capability<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(&[Value]) -> BuildResult<Box<dyn Capability>> + Send + Sync + 'static,
    {
        let name = name.into();
        self.registrations.push(Box::new(move |registry| {
            registry.register(name, constructor);
        }));
        self
    }

    /// Applies a registration function to the runtime's registry.
    pub fn with_registry(mut self, apply: impl FnOnce(&mut CapabilityRegistry) + 'static) -> Self {
        self.registrations.push(Box::new(apply));
        self
    }

    /// Loads the configuration and builds the runtime with its routes.
    pub fn build(self) -> RuntimeResult<SluiceRuntime> {
        let config = self.config_loader.load()?;
        if config.routes.is_empty() {
            warn!("No routes configured");
        }
        let runtime = SluiceRuntime::assemble(config, self.registrations);
        runtime.build_configured_routes()?;
        Ok(runtime)
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteDefinition, StepDefinition};
    use serde_json::json;
    use sluice_capabilities::{Collector, RouteExt, ToArray};
    use sluice_core::{BuildError, Emitter, Envelope, Fault};

    fn step(capability: &str, args: Vec<Value>) -> StepDefinition {
        StepDefinition {
            capability: capability.to_owned(),
            args,
        }
    }

    fn builder(routes: Vec<RouteDefinition>) -> RuntimeBuilder {
        SluiceRuntime::builder()
            .search_path("does-not-exist")
            .without_env()
            .merge(SluiceConfig {
                routes,
                ..Default::default()
            })
    }

    #[tokio::test]
    async fn test_configured_routes_use_registered_capabilities() {
        let collected = Collector::new();
        let sink = collected.clone();

        let runtime = builder(vec![RouteDefinition {
            name: "audit".into(),
            sync: true,
            steps: vec![
                step("filter", vec![json!("body.amount > 100")]),
                step("set", vec![json!("headers.flagged"), json!("true")]),
                step("collect", vec![]),
            ],
        }])
        .register_capability("collect", move |_| {
            Ok(Box::new(ToArray::new(sink.clone())) as Box<dyn Capability>)
        })
        .build()
        .unwrap();

        let audit = runtime.route("audit").unwrap();
        assert!(audit.is_sync());
        audit.inject(json!({"amount": 150}));
        audit.inject(json!({"amount": 5}));

        let envelopes = collected.snapshot();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].header("flagged"), Some(&json!(true)));
        assert_eq!(runtime.statistics().injected("audit"), 2);
        assert_eq!(runtime.statistics().processor("audit#1(filter)").emitted, 1);
    }

    #[tokio::test]
    async fn test_unknown_capability_fails_build() {
        let result = builder(vec![RouteDefinition {
            name: "broken".into(),
            sync: false,
            steps: vec![step("teleport", vec![])],
        }])
        .build();

        assert!(matches!(
            result,
            Err(RuntimeError::Build { route, source: BuildError::UnknownCapability { .. } })
                if route == "broken"
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_names() {
        let runtime = SluiceRuntime::from_config(&SluiceConfig::default()).unwrap();
        let first = runtime.context().route().name("dup").build();
        let second = runtime.context().route().name("dup").build();

        runtime.register(first).unwrap();
        assert!(matches!(
            runtime.register(second),
            Err(RuntimeError::RouteExists(name)) if name == "dup"
        ));
        assert_eq!(runtime.routes().len(), 1);
        assert!(runtime.route("missing").is_none());
    }

    struct Stubborn;

    #[async_trait::async_trait]
    impl Capability for Stubborn {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            emitter.emit(envelope);
            Ok(())
        }

        async fn shut_down(&self) -> Result<(), sluice_core::BoxError> {
            Err("still busy".into())
        }
    }

    #[tokio::test]
    async fn test_run_until_shuts_routes_down() {
        let runtime = SluiceRuntime::from_config(&SluiceConfig::default()).unwrap();
        let collected = Collector::new();
        let ok = runtime
            .context()
            .route()
            .name("ok")
            .build()
            .to_array(&collected);
        let failing = runtime
            .context()
            .route()
            .name("failing")
            .build()
            .then("stubborn", Stubborn);
        runtime.register(ok).unwrap();
        runtime.register(failing).unwrap();

        assert_eq!(runtime.shutdown().await, 1);
        runtime.run_until(async {}).await.unwrap();
    }
}
