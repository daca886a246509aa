//! The runnable capability shared by every module.
//!
//! # Responsibilities
//! - Define what the orchestrator can run (`Module`)
//! - Identify a running instance for events, logs and tests
//! - Wrap cleanup callbacks so they run exactly once

use std::fmt;
use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::BoxError;

/// The family a module belongs to.
///
/// The kind decides which configuration section can disable the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Http,
    Rpc,
    Cron,
    Command,
    Cleanup,
}

impl ModuleKind {
    /// Configuration section owning `<section>.disable`.
    pub fn section(&self) -> &'static str {
        match self {
            ModuleKind::Http => "http",
            ModuleKind::Rpc => "rpc",
            ModuleKind::Cron => "cron",
            ModuleKind::Command => "command",
            ModuleKind::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section())
    }
}

/// Identity of one module instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleIdentity {
    /// Module family.
    pub kind: ModuleKind,
    /// Human readable label: bound address for servers, name otherwise.
    pub label: String,
    /// Unique per constructed module.
    pub instance: Uuid,
}

impl ModuleIdentity {
    pub fn new(kind: ModuleKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
            instance: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.label)
    }
}

/// A long-running or one-shot runnable unit.
///
/// `run` must return promptly once `shutdown` is cancelled; the
/// orchestrator never aborts a module.
pub trait Module: Send + Sync + 'static {
    /// Identity used in lifecycle events.
    fn identity(&self) -> ModuleIdentity;

    /// Run until completion or cancellation.
    fn run(&self, shutdown: CancellationToken) -> BoxFuture<'_, Result<(), BoxError>>;
}

type CleanupFn = Box<dyn FnOnce() + Send>;

/// A teardown callback captured from a constructor.
///
/// Runs at most once no matter how many times `run` is called.
pub struct Cleanup {
    identity: ModuleIdentity,
    callback: Mutex<Option<CleanupFn>>,
}

impl Cleanup {
    pub fn new(label: impl Into<String>, callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            identity: ModuleIdentity::new(ModuleKind::Cleanup, label),
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    /// Execute the callback. Returns `false` when it already ran.
    pub fn run(&self) -> bool {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        match callback {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// Whether the callback already ran.
    pub fn is_done(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cleanup")
            .field("identity", &self.identity)
            .field("done", &self.is_done())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn cleanup_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let cleanup = Cleanup::new("db", move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!cleanup.is_done());
        assert!(cleanup.run());
        assert!(!cleanup.run());
        assert!(cleanup.is_done());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanup_runs_once_across_threads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let cleanup = Arc::new(Cleanup::new("cache", move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cleanup = cleanup.clone();
                std::thread::spawn(move || cleanup.run())
            })
            .collect();
        let ran: usize = handles.into_iter().map(|h| h.join().unwrap() as usize).sum();

        assert_eq!(ran, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identity_display() {
        let id = ModuleIdentity::new(ModuleKind::Http, "127.0.0.1:8080");
        assert_eq!(id.to_string(), "http[127.0.0.1:8080]");
        assert_ne!(id.instance, ModuleIdentity::new(ModuleKind::Http, "x").instance);
    }
}
