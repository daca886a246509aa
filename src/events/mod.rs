//! Event dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Orchestrator (serve.rs)
//!     → MODULE_START / MODULE_SHUTDOWN around every module run
//!
//! Config watcher / SIGHUP
//!     → RELOAD
//!     → every Factory subscribed via subscribe_reload_event_from
//!     → evict + tear down cached connections
//! ```
//!
//! # Design Decisions
//! - Dispatch is synchronous: listeners run inline on the publisher's task
//! - Topics are typed constants, the payload type travels with the topic
//! - Listener registry is copy-on-write, dispatch never takes a lock

pub mod dispatcher;
pub mod topic;

pub use dispatcher::{DispatchError, Dispatcher};
pub use topic::{ModuleEvent, ReloadEvent, Topic, MODULE_SHUTDOWN, MODULE_START, RELOAD};
