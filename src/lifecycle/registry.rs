//! Ordered collection of captured modules and cleanups.
//!
//! # Design Decisions
//! - Registration order is preserved: start events follow it, and cleanups
//!   run in reverse of it
//! - Cleanups share the registry with runnable modules but are never
//!   started by `serve`; `drain_cleanups` runs them at teardown

use std::sync::{Arc, Mutex, PoisonError};

use crate::lifecycle::module::{Cleanup, Module, ModuleIdentity};

/// One registered item.
#[derive(Clone)]
pub enum Registered {
    Runnable(Arc<dyn Module>),
    Cleanup(Arc<Cleanup>),
}

impl Registered {
    pub fn identity(&self) -> ModuleIdentity {
        match self {
            Registered::Runnable(module) => module.identity(),
            Registered::Cleanup(cleanup) => cleanup.identity().clone(),
        }
    }
}

/// Every module captured during bootstrap, in registration order.
#[derive(Default)]
pub struct ModuleRegistry {
    entries: Mutex<Vec<Registered>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a runnable module.
    pub fn add_module(&self, module: Arc<dyn Module>) {
        tracing::debug!(module = %module.identity(), "Module registered");
        self.lock().push(Registered::Runnable(module));
    }

    /// Append a cleanup callback.
    pub fn add_cleanup(&self, cleanup: Cleanup) {
        tracing::debug!(cleanup = %cleanup.identity(), "Cleanup registered");
        self.lock().push(Registered::Cleanup(Arc::new(cleanup)));
    }

    /// Runnable modules in registration order.
    pub fn modules(&self) -> Vec<Arc<dyn Module>> {
        self.lock()
            .iter()
            .filter_map(|entry| match entry {
                Registered::Runnable(module) => Some(Arc::clone(module)),
                Registered::Cleanup(_) => None,
            })
            .collect()
    }

    /// Identities of every registered item, cleanups included.
    pub fn identities(&self) -> Vec<ModuleIdentity> {
        self.lock().iter().map(Registered::identity).collect()
    }

    /// Run every pending cleanup in reverse registration order.
    ///
    /// Returns how many callbacks actually ran.
    pub fn drain_cleanups(&self) -> usize {
        let cleanups: Vec<Arc<Cleanup>> = self
            .lock()
            .iter()
            .filter_map(|entry| match entry {
                Registered::Cleanup(cleanup) => Some(Arc::clone(cleanup)),
                Registered::Runnable(_) => None,
            })
            .collect();

        cleanups
            .iter()
            .rev()
            .filter(|cleanup| {
                let ran = cleanup.run();
                if ran {
                    tracing::debug!(cleanup = %cleanup.identity(), "Cleanup executed");
                }
                ran
            })
            .count()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registered>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::module::ModuleKind;
    use crate::BoxError;
    use futures_util::future::BoxFuture;
    use tokio_util::sync::CancellationToken;

    struct Named(ModuleIdentity);

    impl Module for Named {
        fn identity(&self) -> ModuleIdentity {
            self.0.clone()
        }

        fn run(&self, _shutdown: CancellationToken) -> BoxFuture<'_, Result<(), BoxError>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[test]
    fn keeps_registration_order() {
        let registry = ModuleRegistry::new();
        registry.add_module(Arc::new(Named(ModuleIdentity::new(ModuleKind::Http, "a"))));
        registry.add_cleanup(Cleanup::new("c", || {}));
        registry.add_module(Arc::new(Named(ModuleIdentity::new(ModuleKind::Rpc, "b"))));

        let labels: Vec<_> = registry.identities().into_iter().map(|id| id.label).collect();
        assert_eq!(labels, vec!["a", "c", "b"]);

        let runnable: Vec<_> = registry.modules().iter().map(|m| m.identity().label).collect();
        assert_eq!(runnable, vec!["a", "b"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn cleanups_drain_in_reverse_once() {
        let registry = ModuleRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second"] {
            let order = order.clone();
            registry.add_cleanup(Cleanup::new(name, move || order.lock().unwrap().push(name)));
        }

        assert_eq!(registry.drain_cleanups(), 2);
        assert_eq!(registry.drain_cleanups(), 0);
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }
}
