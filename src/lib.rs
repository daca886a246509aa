//! Process bootstrap runtime.
//!
//! Wires configuration, named infrastructure connections, lifecycle events
//! and long-running modules together for a service process.
//!
//! # Architecture Overview
//!
//! ```text
//!   constructors ──▶ di::Container ──▶ lifecycle::ModuleRegistry ──▶ lifecycle::Orchestrator
//!                        │                 (modules, cleanups)            │
//!                        ▼                                                ▼
//!                 factory::Factory<T> ◀── events::Dispatcher ◀── MODULE_START / MODULE_SHUTDOWN
//!                  (named, lazy)              ▲
//!                                             │ RELOAD
//!                                      config::Config (+ watcher, SIGHUP)
//! ```

// Core subsystems
pub mod app;
pub mod di;
pub mod factory;
pub mod lifecycle;

// Built-in modules
pub mod modules;

// Cross-cutting concerns
pub mod config;
pub mod events;
pub mod observability;

use thiserror::Error;

pub use app::App;
pub use config::{Config, ConfigAccessor, ConfigAccessorExt};
pub use di::{Container, Provide};
pub use events::Dispatcher;
pub use factory::{Factory, Maker, Pair};
pub use lifecycle::{Module, ModuleIdentity, ModuleKind, Shutdown};

/// Boxed error for user supplied callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Any error surfaced by the runtime.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Dispatch(#[from] events::DispatchError),

    #[error(transparent)]
    Container(#[from] di::ContainerError),

    #[error(transparent)]
    Factory(#[from] factory::FactoryError),

    #[error(transparent)]
    Serve(#[from] lifecycle::ServeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
