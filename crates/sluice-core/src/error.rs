//! Unified error types for the Sluice core.
//!
//! Capability failures travel as [`BoxError`] values wrapped in a
//! [`Cause`](crate::envelope::Cause); the enums below cover chain building,
//! shutdown sequencing and the global failure sink.

use thiserror::Error;

use crate::expr::ExpressionError;

/// A type-erased error produced by a capability.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Build Errors
// =============================================================================

/// Errors that abort a chain-building call.
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    /// No constructor is registered under the requested name.
    #[error("unknown capability '{name}'")]
    UnknownCapability {
        /// The requested capability name.
        name: String,
    },

    /// The constructor rejected its arguments.
    #[error("invalid arguments for capability '{capability}': {reason}")]
    InvalidArguments {
        /// The capability being constructed.
        capability: String,
        /// Why the arguments were rejected.
        reason: String,
    },

    /// An expression or template argument failed to parse.
    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

impl BuildError {
    /// Creates an invalid-arguments error.
    pub fn invalid_args(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            capability: capability.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Shutdown Errors
// =============================================================================

/// The first failure reported while shutting a route down.
#[derive(Debug, Error)]
#[error("processor '{processor_id}' failed to shut down: {source}")]
pub struct ShutdownError {
    /// Id of the processor whose shutdown failed.
    pub processor_id: String,
    /// The error reported by the capability.
    #[source]
    pub source: BoxError,
}

// =============================================================================
// Failure Sink Errors
// =============================================================================

/// Errors reported by the global failure sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FailureSinkError {
    /// The sink route has been cleared; the failure cannot be routed anywhere.
    #[error("global failure sink has been cleared")]
    Cleared,
}

/// Result type for chain-building operations.
pub type BuildResult<T> = Result<T, BuildError>;
