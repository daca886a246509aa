//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global `tracing` subscriber
//! - Map the `[log]` section onto an `EnvFilter`
//!
//! # Design Decisions
//! - `RUST_LOG` always wins over the configured level
//! - Compact format by default, pretty format for local development
//! - `try_init` so repeated initialization (tests, embedders) is harmless

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LogConfig;

/// Install the global subscriber.
///
/// Returns an error when a subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(&config.level)));

    let (pretty, compact) = if config.format.eq_ignore_ascii_case("pretty") {
        (Some(fmt::layer().pretty()), None)
    } else {
        (None, Some(fmt::layer().compact()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(compact)
        .try_init()
}

/// Filter directive for a configured level.
fn directive(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "none" | "off" => "off".to_string(),
        "" => "info".to_string(),
        other => format!("{other},tower_http=warn"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_disables_output() {
        assert_eq!(directive("none"), "off");
        assert_eq!(directive("NONE"), "off");
        assert_eq!(directive("debug"), "debug,tower_http=warn");
    }

    #[test]
    fn init_twice_is_an_error_not_a_panic() {
        let config = LogConfig::default();
        let _ = init(&config);
        assert!(init(&config).is_err());
    }
}
