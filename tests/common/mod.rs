//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bootkit::events::{Dispatcher, ModuleEvent, MODULE_SHUTDOWN, MODULE_START};
use bootkit::lifecycle::{Module, ModuleIdentity, ModuleKind};
use bootkit::{App, BoxError, Config};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Build an app from an inline TOML document, essentials provided.
pub fn app(toml: &str) -> App {
    let app = App::new(Config::from_toml_str(toml).unwrap()).unwrap();
    app.provide_essentials().unwrap();
    app
}

/// Records lifecycle events as `("start" | "shutdown", label)`.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(&'static str, String)>>>,
}

impl Recorder {
    pub fn attach(dispatcher: &Dispatcher) -> Self {
        let recorder = Self::default();
        let starts = recorder.events.clone();
        dispatcher.subscribe(MODULE_START, move |event: &ModuleEvent| {
            starts.lock().unwrap().push(("start", event.identity.label.clone()));
            Ok(())
        });
        let stops = recorder.events.clone();
        dispatcher.subscribe(MODULE_SHUTDOWN, move |event: &ModuleEvent| {
            stops.lock().unwrap().push(("shutdown", event.identity.label.clone()));
            Ok(())
        });
        recorder
    }

    pub fn events(&self) -> Vec<(&'static str, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn labels(&self, kind: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, label)| label)
            .collect()
    }
}

/// What a [`TestModule`] does when run.
#[derive(Clone, Copy)]
pub enum Behavior {
    /// Wait for cancellation, then return Ok.
    UntilCancelled,
    /// Fail after the delay.
    FailAfter(Duration),
    /// Return Ok after the delay.
    FinishAfter(Duration),
    /// Panic after the delay.
    PanicAfter(Duration),
}

/// A scripted module that records whether it saw cancellation.
pub struct TestModule {
    identity: ModuleIdentity,
    behavior: Behavior,
    pub cancelled: Arc<AtomicBool>,
}

impl TestModule {
    pub fn new(kind: ModuleKind, label: &str, behavior: Behavior) -> Self {
        Self {
            identity: ModuleIdentity::new(kind, label),
            behavior,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn command(label: &str, behavior: Behavior) -> Self {
        Self::new(ModuleKind::Command, label, behavior)
    }
}

impl Module for TestModule {
    fn identity(&self) -> ModuleIdentity {
        self.identity.clone()
    }

    fn run(&self, shutdown: CancellationToken) -> BoxFuture<'_, Result<(), BoxError>> {
        Box::pin(async move {
            match self.behavior {
                Behavior::UntilCancelled => {
                    shutdown.cancelled().await;
                    self.cancelled.store(true, Ordering::SeqCst);
                    Ok(())
                }
                Behavior::FailAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(BoxError::from(format!("{} failed", self.identity.label)))
                }
                Behavior::FinishAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                Behavior::PanicAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    panic!("{} exploded", self.identity.label);
                }
            }
        })
    }
}
