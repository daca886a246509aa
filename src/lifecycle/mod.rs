//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Bootstrap:
//!     constructors → Container → ModuleRegistry (modules + cleanups)
//!
//! Serve (serve.rs):
//!     Orchestrator → MODULE_START → run(scope) ... → MODULE_SHUTDOWN
//!
//! Shutdown (shutdown.rs):
//!     Signal received → cancel root token → modules drain → cleanups run
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Trigger config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: start events follow registration order
//! - Ordered teardown: cleanups run in reverse registration order, once
//! - One cancellation scope per serve call

pub mod module;
pub mod registry;
pub mod serve;
pub mod shutdown;
pub mod signals;

pub use module::{Cleanup, Module, ModuleIdentity, ModuleKind};
pub use registry::{ModuleRegistry, Registered};
pub use serve::{Orchestrator, ServeError, ServeState};
pub use shutdown::Shutdown;
