//! Configuration module for the Sluice runtime.
//!
//! Layered TOML/environment configuration for the retry policy, logging and
//! routes assembled from registered capabilities.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, RouteDefinition, RoutingConfig,
    SluiceConfig, SpanEventConfig, StepDefinition,
};
pub use validation::validate_config;
