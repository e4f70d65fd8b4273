//! Closure-backed capabilities.

use std::fmt;

use sluice_core::{BoxError, Capability, Emitter, Envelope, Fault};

/// Hands each envelope and its emitter to a closure.
///
/// The closure owns the completion signal: it may emit right away, move the
/// emitter into a spawned task, or drop the envelope.
pub struct Process<F> {
    f: F,
}

impl<F> Process<F>
where
    F: Fn(Envelope, Emitter) -> Result<(), Fault> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Capability for Process<F>
where
    F: Fn(Envelope, Emitter) -> Result<(), Fault> + Send + Sync + 'static,
{
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        (self.f)(envelope, emitter)
    }
}

impl<F> fmt::Debug for Process<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Process").finish_non_exhaustive()
    }
}

/// Transforms each envelope in place and forwards it.
pub struct Map<F> {
    f: F,
}

impl<F> Map<F>
where
    F: Fn(&mut Envelope) -> Result<(), BoxError> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Capability for Map<F>
where
    F: Fn(&mut Envelope) -> Result<(), BoxError> + Send + Sync + 'static,
{
    fn data(&self, mut envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        match (self.f)(&mut envelope) {
            Ok(()) => {
                emitter.emit(envelope);
                Ok(())
            }
            Err(err) => Err(Fault::new(err, envelope)),
        }
    }
}

impl<F> fmt::Debug for Map<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Collector, RouteExt};
    use serde_json::json;
    use sluice_core::RouteContext;
    use std::time::Duration;

    #[test]
    fn test_map_transforms_in_place() {
        let context = RouteContext::new();
        let collected = Collector::new();
        let route = context
            .route()
            .sync(true)
            .build()
            .map(|envelope| {
                envelope.body["total"] = json!(10);
                Ok(())
            })
            .to_array(&collected);

        route.inject(json!({"id": 1}));
        assert_eq!(collected.bodies(), [json!({"id": 1, "total": 10})]);
    }

    #[test]
    fn test_map_error_is_a_failure() {
        let context = RouteContext::builder()
            .retry_limit(2)
            .retry_delay(Duration::ZERO)
            .build();
        let collected = Collector::new();
        let route = context
            .route()
            .sync(true)
            .build()
            .map(|_| Err("not today".into()));
        route.error_route().unwrap().clone().to_array(&collected);

        route.inject(json!(1));
        let envelopes = collected.snapshot();
        assert_eq!(envelopes.len(), 1);
        let exception = envelopes[0].exception().unwrap();
        assert_eq!(exception.number_of_attempts, 2);
        assert_eq!(exception.cause.to_string(), "not today");
    }

    #[test]
    fn test_process_controls_the_signal() {
        let context = RouteContext::new();
        let collected = Collector::new();
        let route = context
            .route()
            .sync(true)
            .build()
            .process(|envelope, emitter| {
                if envelope.body != json!("skip") {
                    emitter.emit(envelope);
                }
                Ok(())
            })
            .to_array(&collected);

        route.inject("skip").inject("keep");
        assert_eq!(collected.bodies(), [json!("keep")]);
    }
}
