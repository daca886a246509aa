//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation of the well-known sections (serde handles syntax)
//! - Validate value shapes (addresses parse, durations parse, flags are bools)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: `&toml::Table → Result<(), Vec<ValidationError>>`
//! - Runs before a snapshot is published, on load and on every reload

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::accessor::lookup;

/// One semantic problem in a configuration tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending value.
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// User supplied validation hook.
pub type Validator = Arc<dyn Fn(&toml::Table) -> Result<(), Vec<ValidationError>> + Send + Sync>;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "none", "off"];
const DISABLE_FLAGS: &[&str] = &["http.disable", "rpc.disable", "cron.disable", "command.disable"];

/// Checks applied to every configuration.
pub fn validate_core(table: &toml::Table) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for path in ["http.addr", "rpc.addr"] {
        if let Some(value) = lookup(table, path) {
            let parsed = value.as_str().map(str::parse::<SocketAddr>);
            if !matches!(parsed, Some(Ok(_))) {
                errors.push(error(path, format!("expected a socket address, got {value}")));
            }
        }
    }

    if let Some(value) = lookup(table, "log.level") {
        let known = value
            .as_str()
            .is_some_and(|level| LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()));
        if !known {
            errors.push(error("log.level", format!("unknown level {value}")));
        }
    }

    if let Some(value) = lookup(table, "log.format") {
        if !matches!(value.as_str(), Some("compact") | Some("pretty")) {
            errors.push(error("log.format", "must be \"compact\" or \"pretty\""));
        }
    }

    for path in ["rpc.max_connections", "rpc.max_request_bytes"] {
        if let Some(value) = lookup(table, path) {
            if !value.as_integer().is_some_and(|n| n > 0) {
                errors.push(error(path, format!("expected a positive integer, got {value}")));
            }
        }
    }

    for path in DISABLE_FLAGS {
        if let Some(value) = lookup(table, path) {
            if !value.is_bool() {
                errors.push(error(path, "must be a boolean"));
            }
        }
    }

    if let Some(value) = lookup(table, "http.request_timeout") {
        check_duration(&mut errors, "http.request_timeout", &value);
    }

    if let Some(toml::Value::Table(jobs)) = lookup(table, "cron.jobs") {
        for (name, job) in &jobs {
            if let Some(every) = job.get("every") {
                check_duration(&mut errors, &format!("cron.jobs.{name}.every"), every);
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_duration(errors: &mut Vec<ValidationError>, path: &str, value: &toml::Value) {
    let valid = match value {
        toml::Value::String(text) => humantime::parse_duration(text).is_ok_and(|d| !d.is_zero()),
        toml::Value::Integer(nanos) => *nanos > 0,
        _ => false,
    };
    if !valid {
        errors.push(error(path, format!("expected a positive duration, got {value}")));
    }
}

fn error(path: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        path: path.to_string(),
        message: message.into(),
    }
}
