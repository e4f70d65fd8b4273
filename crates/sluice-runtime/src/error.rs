//! Runtime error types.

use sluice_core::BuildError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A configured route could not be assembled.
    #[error("Failed to build route '{route}': {source}")]
    Build {
        route: String,
        #[source]
        source: BuildError,
    },

    /// A route with this name is already registered.
    #[error("Route already registered: {0}")]
    RouteExists(String),

    /// Listening for shutdown signals failed.
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(#[source] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
