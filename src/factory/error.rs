use thiserror::Error;

use crate::config::ConfigError;
use crate::BoxError;

/// Errors produced by a [`Factory`](crate::factory::Factory).
#[derive(Debug, Error)]
pub enum FactoryError {
    /// The name-scoped configuration is missing or has the wrong shape.
    #[error("invalid config for `{name}` at `{path}`: {source}")]
    ConfigInvalid {
        name: String,
        path: String,
        #[source]
        source: ConfigError,
    },

    /// The builder could not produce a connection.
    #[error("failed to construct `{name}`: {source}")]
    ConstructionFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The factory was closed; no further instances are handed out.
    #[error("{kind} factory is closed")]
    Closed { kind: &'static str },

    /// One or more closers failed during teardown.
    #[error("teardown failed for {}", describe(.errors))]
    Teardown { errors: Vec<(String, BoxError)> },
}

impl FactoryError {
    /// Wrap an arbitrary builder error.
    pub fn construction(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FactoryError::ConstructionFailed {
            name: name.into(),
            source: source.into(),
        }
    }
}

fn describe(errors: &[(String, BoxError)]) -> String {
    errors
        .iter()
        .map(|(name, err)| format!("`{name}` ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}
