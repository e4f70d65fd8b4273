//! Content-based routing.
//!
//! ```rust,ignore
//! let route = context.route().build().choice(
//!     "body.kind",
//!     [
//!         When::value("refund", refunds.clone()),
//!         When::value("order", orders.clone()),
//!         When::otherwise(unknown.clone()),
//!     ],
//! )?;
//! ```

use serde_json::Value;
use sluice_core::expr::loose_eq;
use sluice_core::{Capability, Emitter, Envelope, Expression, Fault, Route};
use tracing::trace;

/// One branch of a [`Choice`].
#[derive(Debug, Clone)]
pub enum When {
    /// Taken when the choice expression evaluates to this value.
    Value(Value, Route),
    /// Taken when no value branch matched.
    Otherwise(Route),
}

impl When {
    pub fn value(value: impl Into<Value>, route: Route) -> Self {
        When::Value(value.into(), route)
    }

    pub fn otherwise(route: Route) -> Self {
        When::Otherwise(route)
    }
}

/// Injects a copy of each envelope into every branch whose value matches the
/// evaluated expression, or into the otherwise branch if none matched, then
/// forwards the original.
#[derive(Debug, Clone)]
pub struct Choice {
    expression: Expression,
    branches: Vec<(Value, Route)>,
    otherwise: Option<Route>,
}

impl Choice {
    /// Creates a choice. With several otherwise branches the last one wins.
    pub fn new(expression: Expression, whens: impl IntoIterator<Item = When>) -> Self {
        let mut branches = Vec::new();
        let mut otherwise = None;
        for when in whens {
            match when {
                When::Value(value, route) => branches.push((value, route)),
                When::Otherwise(route) => otherwise = Some(route),
            }
        }
        Self {
            expression,
            branches,
            otherwise,
        }
    }
}

impl Capability for Choice {
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        let chosen = self.expression.evaluate(&envelope);
        let mut matched = false;
        for (value, route) in &self.branches {
            if loose_eq(&chosen, value) {
                trace!(value = %chosen, route = %route.name(), "Choice matched");
                route.inject(envelope.clone());
                matched = true;
            }
        }
        if !matched && let Some(route) = &self.otherwise {
            trace!(value = %chosen, route = %route.name(), "Choice fell through to otherwise");
            route.inject(envelope.clone());
        }
        emitter.emit(envelope);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collector, RouteExt};
    use serde_json::json;
    use sluice_core::RouteContext;

    fn sink(context: &RouteContext, collector: &Collector) -> Route {
        context.route().sync(true).build().to_array(collector)
    }

    #[test]
    fn test_every_matching_branch_receives_a_copy() {
        let context = RouteContext::new();
        let (ones, also_ones, others, passed) = (
            Collector::new(),
            Collector::new(),
            Collector::new(),
            Collector::new(),
        );
        let route = context
            .route()
            .sync(true)
            .build()
            .choice(
                "body.n",
                [
                    When::value(1, sink(&context, &ones)),
                    When::value(1.0, sink(&context, &also_ones)),
                    When::otherwise(sink(&context, &others)),
                ],
            )
            .unwrap()
            .to_array(&passed);

        route.inject(json!({"n": 1})).inject(json!({"n": 2}));

        assert_eq!(ones.bodies(), [json!({"n": 1})]);
        assert_eq!(also_ones.bodies(), [json!({"n": 1})]);
        assert_eq!(others.bodies(), [json!({"n": 2})]);
        assert_eq!(passed.len(), 2);
    }

    #[test]
    fn test_no_match_without_otherwise_still_forwards() {
        let context = RouteContext::new();
        let (matched, passed) = (Collector::new(), Collector::new());
        let route = context
            .route()
            .sync(true)
            .build()
            .choice(
                "headers.kind",
                [When::value("refund", sink(&context, &matched))],
            )
            .unwrap()
            .to_array(&passed);

        route.inject(Envelope::from(json!({})).with_header("kind", "order"));
        assert!(matched.is_empty());
        assert_eq!(passed.len(), 1);
    }
}
