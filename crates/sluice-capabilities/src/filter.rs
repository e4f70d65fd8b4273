//! Content filter.

use serde_json::Value;
use sluice_core::{BuildError, BuildResult, Capability, Emitter, Envelope, Expression, Fault};
use tracing::trace;

/// Forwards envelopes for which the condition is truthy and silently drops
/// the rest.
#[derive(Debug, Clone)]
pub struct Filter {
    condition: Expression,
}

impl Filter {
    pub fn new(condition: Expression) -> Self {
        Self { condition }
    }

    /// Parses a condition.
    pub fn parse(condition: &str) -> BuildResult<Self> {
        Ok(Self::new(Expression::parse(condition)?))
    }

    /// Registry constructor: one expression string.
    pub fn from_args(args: &[Value]) -> BuildResult<Self> {
        match args {
            [Value::String(condition)] => Self::parse(condition),
            _ => Err(BuildError::invalid_args(
                "filter",
                "expected a single condition string",
            )),
        }
    }
}

impl Capability for Filter {
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        if self.condition.test(&envelope) {
            emitter.emit(envelope);
        } else {
            trace!(processor = %emitter.processor().id(), condition = %self.condition, "Envelope filtered out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collector, RouteExt};
    use serde_json::json;
    use sluice_core::{CountingStatistics, RouteContext};
    use std::sync::Arc;

    #[test]
    fn test_from_args() {
        assert!(Filter::from_args(&[json!("body.x > 1")]).is_ok());
        assert!(matches!(
            Filter::from_args(&[]),
            Err(BuildError::InvalidArguments { .. })
        ));
        assert!(matches!(
            Filter::from_args(&[json!("body.x >")]),
            Err(BuildError::Expression(_))
        ));
    }

    #[test]
    fn test_filter_drops_falsy() {
        let context = RouteContext::new();
        let collected = Collector::new();
        let route = context
            .route()
            .sync(true)
            .build()
            .filter("body.amount >= 100")
            .unwrap()
            .to_array(&collected);

        route
            .inject(json!({"amount": 50}))
            .inject(json!({"amount": 100}))
            .inject(json!({"other": true}));
        assert_eq!(collected.bodies(), [json!({"amount": 100})]);
    }

    #[tokio::test]
    async fn test_dropped_envelope_never_reaches_error_route() {
        let statistics = Arc::new(CountingStatistics::new());
        let context = RouteContext::builder()
            .statistics(statistics.clone())
            .build();
        let route = context
            .route()
            .name("scenario")
            .build()
            .process(|envelope, emitter| {
                emitter.emit(envelope);
                Ok(())
            })
            .filter("body.x == 2")
            .unwrap();

        route.inject(json!({"x": 1}));
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }

        let filter = statistics.processor("scenario#2(filter)");
        assert_eq!((filter.received, filter.emitted), (1, 0));
        assert_eq!(statistics.injected("scenario.Errorroute"), 0);
    }
}
