//! Typed topic identifiers and the well-known system payloads.

use std::fmt;
use std::marker::PhantomData;

use crate::lifecycle::ModuleIdentity;

/// A topic identifier carrying the payload type of its events.
///
/// Two topics are the same topic when both the name and the payload type
/// match, so a listener can never observe a payload of the wrong type.
pub struct Topic<P> {
    name: &'static str,
    _payload: PhantomData<fn(&P)>,
}

impl<P> Topic<P> {
    /// Declare a topic. Usually bound to a `const`.
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _payload: PhantomData,
        }
    }

    /// Topic name, used in logs and errors.
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<P> Clone for Topic<P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Topic<P> {}

impl<P> fmt::Debug for Topic<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Topic").field(&self.name).finish()
    }
}

/// Payload of module lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEvent {
    pub identity: ModuleIdentity,
}

impl ModuleEvent {
    pub fn new(identity: ModuleIdentity) -> Self {
        Self { identity }
    }
}

/// Payload of the reload event.
///
/// Factories ignore the contents and evict everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadEvent {
    /// What triggered the reload (file path, "sighup", "manual").
    pub origin: String,
}

impl ReloadEvent {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { origin: origin.into() }
    }
}

/// Published before a module's `run` starts.
pub const MODULE_START: Topic<ModuleEvent> = Topic::new("module.start");

/// Published after a module's `run` returned, successfully or not.
pub const MODULE_SHUTDOWN: Topic<ModuleEvent> = Topic::new("module.shutdown");

/// Published whenever configuration changed.
pub const RELOAD: Topic<ReloadEvent> = Topic::new("config.reload");
