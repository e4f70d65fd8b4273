//! Sluice Runtime - Configuration, logging and orchestration for Sluice.
//!
//! This crate provides:
//! - Layered configuration (`SluiceConfig`, `ConfigLoader`)
//! - Logging setup on `tracing-subscriber` (`LoggingBuilder`)
//! - Runtime orchestration (`SluiceRuntime`): a shared route context,
//!   the global failure sink, configured routes and ordered shutdown
//!
//! # Configured Routes
//!
//! Routes can be declared in `sluice.toml` and are assembled from registered
//! capabilities at startup:
//!
//! ```toml
//! [routing]
//! retry_limit = 3
//! retry_delay_ms = 1000
//!
//! [[routes]]
//! name = "large-orders"
//! steps = [
//!     { capability = "filter", args = ["body.amount > 1000"] },
//!     { capability = "warn", args = ["large order ${body.id}"] },
//! ]
//! ```
//!
//! ```ignore
//! use sluice_runtime::SluiceRuntime;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SluiceRuntime::builder().build()?;
//!
//!     let orders = runtime.route("large-orders").expect("configured");
//!     orders.inject(serde_json::json!({"id": 7, "amount": 5000}));
//!
//!     // Run until Ctrl+C
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, RouteDefinition, SluiceConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{RuntimeBuilder, SluiceRuntime};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// This provides the commonly used logging macros and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
