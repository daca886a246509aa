//! Metrics collection.
//!
//! # Responsibilities
//! - Define runtime metrics (factory builds, module lifecycle, cron runs)
//! - Record them through the `metrics` facade
//!
//! # Metrics
//! - `bootkit_factory_builds_total` (counter): successful builds by factory
//! - `bootkit_factory_build_failures_total` (counter): failed builds by factory
//! - `bootkit_factory_evictions_total` (counter): entries torn down, by reason
//! - `bootkit_module_starts_total` / `bootkit_module_stops_total` (counter): by kind
//! - `bootkit_modules_running` (gauge): modules currently inside `run`
//! - `bootkit_cron_runs_total` (counter): job executions by job and outcome
//!
//! # Design Decisions
//! - No exporter is installed here; the embedding binary picks one
//! - Low-overhead metric updates (atomic operations)

use metrics::{counter, gauge};

pub fn record_factory_build(factory: &'static str, ok: bool) {
    if ok {
        counter!("bootkit_factory_builds_total", "factory" => factory).increment(1);
    } else {
        counter!("bootkit_factory_build_failures_total", "factory" => factory).increment(1);
    }
}

/// `reason` is one of `close_conn`, `close` or `reload`.
pub fn record_factory_eviction(factory: &'static str, reason: &'static str, count: usize) {
    counter!("bootkit_factory_evictions_total", "factory" => factory, "reason" => reason)
        .increment(count as u64);
}

pub fn record_module_start(kind: &'static str) {
    counter!("bootkit_module_starts_total", "kind" => kind).increment(1);
    gauge!("bootkit_modules_running").increment(1.0);
}

pub fn record_module_stop(kind: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("bootkit_module_stops_total", "kind" => kind, "outcome" => outcome).increment(1);
    gauge!("bootkit_modules_running").decrement(1.0);
}

pub fn record_cron_run(job: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("bootkit_cron_runs_total", "job" => job.to_string(), "outcome" => outcome).increment(1);
}
