//! The panic hook is process-wide, so it gets a test binary of its own.

use std::panic;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use sluice_core::{Capability, Emitter, Envelope, Fault, RouteContext, failure};

/// Keeps every envelope it receives.
struct Capture(Arc<Mutex<Vec<Envelope>>>);

impl Capability for Capture {
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        self.0.lock().push(envelope.clone());
        emitter.emit(envelope);
        Ok(())
    }
}

struct Explode;

impl Capability for Explode {
    fn data(&self, _envelope: Envelope, _emitter: Emitter) -> Result<(), Fault> {
        panic!("stock ledger exploded");
    }
}

#[test]
fn test_uncaught_panics_reach_the_sink() {
    let forwarded = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&forwarded);
    panic::set_hook(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let context = RouteContext::builder()
        .retry_limit(1)
        .retry_delay(Duration::ZERO)
        .build();
    let sink = failure::install(&context);

    let uncaught = Arc::new(Mutex::new(Vec::new()));
    sink.replace(
        context
            .route()
            .name("capture")
            .sync(true)
            .error_route(true)
            .build()
            .then("capture", Capture(Arc::clone(&uncaught))),
    );

    // A panic inside a capability is a processor failure, not an uncaught one.
    let passed = Arc::new(Mutex::new(Vec::new()));
    let failed = Arc::new(Mutex::new(Vec::new()));
    let route = context
        .route()
        .name("orders")
        .sync(true)
        .build()
        .then("pass", Capture(Arc::clone(&passed)))
        .then("explode", Explode);
    route
        .error_route()
        .unwrap()
        .clone()
        .then("capture", Capture(Arc::clone(&failed)));

    route.inject(json!({"sku": "A-1"}));

    assert_eq!(passed.lock().len(), 1);
    {
        let failed = failed.lock();
        assert_eq!(failed.len(), 1);
        let exception = failed[0].exception().unwrap();
        assert!(exception.cause.to_string().contains("stock ledger exploded"));
    }
    assert!(uncaught.lock().is_empty());
    assert_eq!(forwarded.load(Ordering::SeqCst), 0);

    // A panic on a plain thread goes to the previous hook and then the sink.
    let worker = std::thread::spawn(|| panic!("worker died"));
    assert!(worker.join().is_err());

    assert_eq!(forwarded.load(Ordering::SeqCst), 1);
    let uncaught = uncaught.lock();
    assert_eq!(uncaught.len(), 1);
    assert_eq!(uncaught[0].body, json!("Uncaught exception."));
    let exception = uncaught[0].exception().unwrap();
    assert!(exception.processor_id.is_none());
    assert!(exception.cause.to_string().starts_with("worker died at "));
}
