//! Span helpers.
//!
//! Every module task runs inside a span carrying its identity, so log lines
//! emitted by handlers and jobs can be attributed to the module.

use tracing::Span;

use crate::lifecycle::ModuleIdentity;

/// Span for one module's `run` future.
pub fn module_span(identity: &ModuleIdentity) -> Span {
    tracing::info_span!(
        "module",
        kind = %identity.kind,
        label = %identity.label,
        instance = %identity.instance,
    )
}
