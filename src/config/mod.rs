//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! TOML files + inline overrides
//!     → loader.rs (parse & deep-merge layers)
//!     → validation.rs (semantic checks)
//!     → Config snapshot (ArcSwap<toml::Table>)
//!     → read through ConfigAccessor by modules and factories
//!
//! On reload:
//!     watcher.rs / SIGHUP / explicit call
//!     → Config::reload (re-read, re-validate, swap)
//!     → RELOAD event on the dispatcher
//!     → factories evict their cached connections
//! ```
//!
//! # Design Decisions
//! - Values are addressed by dotted path, so adapters only need the
//!   `ConfigAccessor` trait and never a concrete schema
//! - Typed sections (schema.rs) default every field to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod accessor;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use accessor::{route, ConfigAccessor, ConfigAccessorExt, Routed};
pub use loader::{Config, ConfigBuilder, ConfigError};
pub use schema::{AppName, AppSection, CommandConfig, CronConfig, Env, HttpConfig, LogConfig, RpcConfig};
pub use validation::{ValidationError, Validator};
pub use watcher::ConfigWatcher;

use crate::events::{Dispatcher, ReloadEvent, RELOAD};

/// Reload `config` and, if that succeeds, publish a reload event.
///
/// Listener errors are returned after the new snapshot is already live.
pub fn reload_and_notify(config: &Config, dispatcher: &Dispatcher, origin: &str) -> Result<(), crate::Error> {
    config.reload()?;
    dispatcher.dispatch(RELOAD, &ReloadEvent::new(origin))?;
    Ok(())
}
