//! The capability contract.
//!
//! A [`Capability`] is the unit of work held by a processor. The dispatch core
//! hands it an [`Envelope`] together with an [`Emitter`]; the capability does
//! its work and signals the outcome through exactly one of:
//!
//! - [`Emitter::emit`]: success, forward the envelope down the chain
//! - [`Emitter::emit_error`]: failure, let the route retry or error-route it
//! - returning `Err(Fault)` from [`Capability::data`]: same as `emit_error`
//!
//! A capability may also consume the envelope without signalling anything
//! (a filter dropping an envelope), which ends that envelope's journey.
//!
//! ```rust,ignore
//! use sluice_core::{Capability, Emitter, Envelope, Fault};
//!
//! struct Uppercase;
//!
//! impl Capability for Uppercase {
//!     fn data(&self, mut envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
//!         let Some(text) = envelope.body.as_str().map(str::to_uppercase) else {
//!             return Err(Fault::new("body is not a string", envelope));
//!         };
//!         envelope.body = text.into();
//!         emitter.emit(envelope);
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::{Cause, Envelope};
use crate::error::BoxError;
use crate::processor::Processor;
use crate::route::Route;

/// A unit of work in a chain.
///
/// Construction plays the role of `init`: capabilities are configured once,
/// when they are built, and never reconfigured afterwards.
#[async_trait]
pub trait Capability: Send + Sync + 'static {
    /// Processes one envelope.
    ///
    /// The emitter may be moved into a spawned task and used later. Returning
    /// `Err` (or panicking) is treated exactly like [`Emitter::emit_error`].
    fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault>;

    /// Releases resources held by the capability.
    ///
    /// Called once, in chain order, when the owning route shuts down.
    async fn shut_down(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// A synchronous failure returned from [`Capability::data`].
///
/// The envelope travels with the error so the route can retry it.
#[derive(Debug)]
pub struct Fault {
    /// What went wrong.
    pub cause: Cause,
    /// The envelope being processed, with any mutations made so far.
    pub envelope: Envelope,
}

impl Fault {
    /// Creates a fault from any error value.
    pub fn new(cause: impl Into<BoxError>, envelope: Envelope) -> Self {
        Self {
            cause: Cause::new(cause),
            envelope,
        }
    }
}

/// Completion handle given to a capability for one envelope.
///
/// Both signalling methods consume the emitter, so a capability can signal
/// at most once per envelope.
pub struct Emitter {
    route: Route,
    processor: Arc<Processor>,
}

impl Emitter {
    pub(crate) fn new(route: Route, processor: Arc<Processor>) -> Self {
        Self { route, processor }
    }

    /// Returns the route this envelope is travelling through.
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Returns the processor currently holding the envelope.
    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    /// Signals success and forwards the envelope.
    pub fn emit(self, envelope: Envelope) {
        self.route.dispatch_event(&self.processor, None, envelope);
    }

    /// Signals failure.
    pub fn emit_error(self, cause: impl Into<BoxError>, envelope: Envelope) {
        self.route
            .dispatch_event(&self.processor, Some(Cause::new(cause)), envelope);
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("route", &self.route.name())
            .field("processor", &self.processor.id())
            .finish()
    }
}
