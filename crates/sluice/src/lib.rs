//! # Sluice
//!
//! A process-local event-routing engine in the style of enterprise
//! integration patterns.
//!
//! ## Overview
//!
//! Applications inject envelopes into named routes. Each route runs its
//! envelopes through an ordered chain of processors; a failing processor is
//! retried after a delay, and once its attempts are exhausted the envelope
//! moves to the route's error route, which logs it. Failures that escape
//! every route end up in a process-wide sink.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────────────────────────────────┐
//! │   Runtime   │────▶│ Route "orders"   filter ─▶ set ─▶ …   │──▶ Errorroute ──▶ log
//! │  (config)   │────▶│ Route "audit"    choice ─▶ dispatch   │──▶ Errorroute ──▶ log
//! └─────────────┘     └───────────────────────────────────────┘
//!                                      │ uncaught
//!                                      ▼
//!                              GlobalErrorroute
//! ```
//!
//! - **Runtime**: loads configuration, sets up logging, owns the route context
//! - **Routes**: append-only processor chains with retry and error routing
//! - **Capabilities**: the work each processor does (filter, choice, set, …)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sluice::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SluiceRuntime::builder().build()?;
//!
//!     let orders = runtime
//!         .context()
//!         .route()
//!         .name("orders")
//!         .build()
//!         .filter("body.amount > 0")?
//!         .log(Severity::Info, "order ${body.id} accepted")?;
//!     runtime.register(orders.clone())?;
//!
//!     orders.inject(serde_json::json!({"id": 1, "amount": 30}));
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `sluice.toml` configuration files (default)
//! - `json-log`: JSON log output

pub use sluice_capabilities as capabilities;
pub use sluice_core as core;
pub use sluice_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use sluice::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use sluice_runtime::{RuntimeError, SluiceRuntime};

    // Routing core
    pub use sluice_core::{
        BoxError, BuildError, Capability, Cause, Emitter, Envelope, Expression, Fault, Route,
        RouteContext, Severity, Template,
    };

    // Standard capabilities and fluent chain building
    pub use sluice_capabilities::{Collector, RouteExt, When};
}
