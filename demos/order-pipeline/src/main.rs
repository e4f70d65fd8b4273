//! Order Pipeline Demo
//!
//! Routes a handful of orders through Sluice:
//!
//! ```text
//! orders: stamp ─▶ filter(quantity > 0) ─▶ dispatch(audit) ─▶ choice(body.tier)
//!                                                               ├── "gold"  ─▶ priority
//!                                                               └── other   ─▶ standard
//! ```
//!
//! The warehouse behind `priority` is down for its first two calls, so the
//! first gold order is retried. Discontinued items fail every attempt and end
//! up in `priority.Errorroute`, which logs them with their cause.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package order-pipeline
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use sluice::prelude::*;
use tracing::info;

// ============================================================================
// Capabilities
// ============================================================================

/// Reserves stock in a warehouse that is unavailable for its first few calls.
struct ReserveStock {
    outages: AtomicU32,
}

impl ReserveStock {
    fn new(outages: u32) -> Self {
        Self {
            outages: AtomicU32::new(outages),
        }
    }
}

impl Capability for ReserveStock {
    fn data(&self, mut envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
        if envelope.body["sku"] == "discontinued" {
            let id = envelope.body["id"].clone();
            return Err(Fault::new(format!("order {id}: item is discontinued"), envelope));
        }

        let down = self
            .outages
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if down {
            return Err(Fault::new("warehouse unavailable", envelope));
        }

        envelope.headers.insert("reserved".into(), json!(true));
        emitter.emit(envelope);
        Ok(())
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let runtime = SluiceRuntime::builder()
        .search_path(env!("CARGO_MANIFEST_DIR"))
        .build()?;
    let context = runtime.context();

    let audit = runtime
        .route("audit")
        .context("the audit route is declared in sluice.toml")?;

    let priority = context
        .route()
        .name("priority")
        .build()
        .then("reserve", ReserveStock::new(2))
        .log(Severity::Info, "priority shipment for order ${body.id}")?;

    let standard = context
        .route()
        .name("standard")
        .build()
        .then("reserve", ReserveStock::new(0))
        .log(Severity::Info, "standard shipment for order ${body.id}")?;

    let orders = context
        .route()
        .name("orders")
        .build()
        .map(|envelope| {
            envelope
                .headers
                .insert("received_at".into(), json!(chrono::Utc::now().to_rfc3339()));
            Ok(())
        })
        .filter("body.quantity > 0")?
        .dispatch([audit])
        .choice(
            "body.tier",
            [
                When::value("gold", priority.clone()),
                When::otherwise(standard.clone()),
            ],
        )?;

    runtime.register(orders.clone())?;
    runtime.register(priority)?;
    runtime.register(standard)?;

    for order in [
        json!({"id": 1, "tier": "gold", "sku": "kettle", "quantity": 2}),
        json!({"id": 2, "tier": "silver", "sku": "mug", "quantity": 6}),
        json!({"id": 3, "tier": "gold", "sku": "discontinued", "quantity": 1}),
        json!({"id": 4, "tier": "bronze", "sku": "teapot", "quantity": 0}),
    ] {
        orders.inject(order);
    }

    // Long enough for every retry to play out.
    runtime
        .run_until(tokio::time::sleep(Duration::from_secs(2)))
        .await?;

    let snapshot = runtime.statistics().snapshot();
    info!("Final statistics:\n{}", serde_json::to_string_pretty(&snapshot)?);

    Ok(())
}
