use thiserror::Error;

use crate::BoxError;

/// Errors raised while registering constructors or resolving the graph.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The constructor cannot be registered.
    #[error("invalid constructor for `{type_name}`: {reason}")]
    InvalidConstructor {
        type_name: &'static str,
        reason: &'static str,
    },

    /// No constructor provides a required type.
    #[error("missing dependency `{type_name}` required by `{required_by}`")]
    MissingDependency {
        type_name: &'static str,
        required_by: &'static str,
    },

    /// Constructors depend on each other in a loop.
    #[error("dependency cycle: {}", .chain.join(" -> "))]
    DependencyCycle { chain: Vec<&'static str> },

    /// A constructor returned an error.
    #[error("failed to construct `{type_name}`: {source}")]
    ConstructionFailed {
        type_name: &'static str,
        #[source]
        source: BoxError,
    },

    /// The invoked function returned an error.
    #[error("invocation failed: {0}")]
    Invocation(#[source] BoxError),

    /// A module could not be constructed during bootstrap.
    #[error("module construction failed: {0}")]
    ModuleConstruction(#[source] BoxError),
}
