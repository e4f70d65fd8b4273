//! Capability registry.
//!
//! The registry binds capability names to constructors so routes can be
//! assembled from plain data (configuration files, admin APIs) through
//! [`Route::with_capability`](crate::Route::with_capability). Adding a new
//! capability kind never requires touching the dispatch core.
//!
//! ```rust,ignore
//! let mut registry = CapabilityRegistry::new();
//! registry.register("stamp", |args| {
//!     let key = args.first().and_then(|v| v.as_str()).unwrap_or("stamped");
//!     Ok(Box::new(Stamp::new(key)) as Box<dyn Capability>)
//! });
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::capability::Capability;
use crate::error::{BuildError, BuildResult};
use crate::logger;

/// A capability constructor. Receives the builder-time arguments.
pub type Constructor = Arc<dyn Fn(&[Value]) -> BuildResult<Box<dyn Capability>> + Send + Sync>;

/// Name-keyed capability constructors.
#[derive(Clone)]
pub struct CapabilityRegistry {
    constructors: HashMap<String, Constructor>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    /// Creates a registry holding the built-in logging capabilities.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        logger::register_builtins(&mut registry);
        registry
    }

    /// Creates a registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Registers a constructor. A later registration replaces an earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F) -> &mut Self
    where
        F: Fn(&[Value]) -> BuildResult<Box<dyn Capability>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self
            .constructors
            .insert(name.clone(), Arc::new(constructor))
            .is_some()
        {
            warn!(capability = %name, "Capability re-registered, previous constructor replaced");
        } else {
            debug!(capability = %name, "Registered capability");
        }
        self
    }

    /// Returns whether a capability is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Returns the registered names in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    /// Returns the number of registered capabilities.
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Instantiates a capability by name.
    pub fn construct(&self, name: &str, args: &[Value]) -> BuildResult<Box<dyn Capability>> {
        let constructor =
            self.constructors
                .get(name)
                .ok_or_else(|| BuildError::UnknownCapability {
                    name: name.to_owned(),
                })?;
        constructor(args)
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("CapabilityRegistry")
            .field("capabilities", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Emitter, Fault};
    use crate::envelope::Envelope;

    struct Passthrough;

    impl Capability for Passthrough {
        fn data(&self, envelope: Envelope, emitter: Emitter) -> Result<(), Fault> {
            emitter.emit(envelope);
            Ok(())
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = CapabilityRegistry::new();
        for name in ["trace", "debug", "info", "warn", "error", "fatal"] {
            assert!(registry.contains(name), "missing {name}");
        }
        assert!(CapabilityRegistry::empty().is_empty());
    }

    #[test]
    fn test_register_and_construct() {
        let mut registry = CapabilityRegistry::empty();
        registry.register("passthrough", |_| Ok(Box::new(Passthrough) as Box<dyn Capability>));
        assert!(registry.construct("passthrough", &[]).is_ok());
    }

    #[test]
    fn test_unknown_capability() {
        let registry = CapabilityRegistry::empty();
        assert!(matches!(
            registry.construct("nope", &[]),
            Err(BuildError::UnknownCapability { name }) if name == "nope"
        ));
    }
}
