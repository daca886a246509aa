//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!     → tracing.rs (one span per module task)
//!
//! Consumers:
//!     → stdout via tracing-subscriber
//!     → whatever metrics recorder the binary installs
//! ```
//!
//! # Design Decisions
//! - Module identity flows through every span
//! - Metrics are cheap (atomic increments) and no-ops without a recorder

pub mod logging;
pub mod metrics;
pub mod tracing;
