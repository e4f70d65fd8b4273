//! Configuration validation utilities.

use std::collections::HashSet;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, RouteDefinition, RoutingConfig, SluiceConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SluiceConfig) -> ConfigResult<()> {
    validate_routing_config(&config.routing)?;
    validate_logging_config(&config.logging)?;
    validate_routes(&config.routes)?;
    Ok(())
}

fn validate_routing_config(routing: &RoutingConfig) -> ConfigResult<()> {
    if routing.retry_limit == 0 {
        return Err(ConfigError::validation(
            "routing.retry_limit must be at least 1",
        ));
    }
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}

fn validate_routes(routes: &[RouteDefinition]) -> ConfigResult<()> {
    let mut seen = HashSet::new();

    for route in routes {
        if !seen.insert(route.name.as_str()) {
            return Err(ConfigError::DuplicateRoute(route.name.clone()));
        }
        validate_route(route)?;
    }

    Ok(())
}

fn validate_route(route: &RouteDefinition) -> ConfigResult<()> {
    if route.name.is_empty() {
        return Err(ConfigError::missing_field("routes.name"));
    }

    if route.name.chars().any(char::is_whitespace) {
        return Err(ConfigError::validation(format!(
            "Route name '{}' cannot contain whitespace",
            route.name
        )));
    }

    for (index, step) in route.steps.iter().enumerate() {
        if step.capability.is_empty() {
            return Err(ConfigError::missing_field(format!(
                "routes.{}.steps[{index}].capability",
                route.name
            )));
        }
    }

    Ok(())
}
