//! OS signal handling.
//!
//! # Responsibilities
//! - Register signal handlers (SIGTERM, SIGINT, SIGHUP)
//! - Translate signals to internal events
//! - Trigger appropriate actions (shutdown, reload)
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - A second SIGTERM/SIGINT forces exit
//! - SIGHUP triggers config reload, not shutdown

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{reload_and_notify, Config};
use crate::events::Dispatcher;
use crate::lifecycle::shutdown::Shutdown;

/// Spawn the signal listener task.
pub fn spawn(shutdown: Shutdown, config: Arc<Config>, dispatcher: Arc<Dispatcher>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = listen(&shutdown, &config, &dispatcher).await {
            tracing::error!(error = %e, "Signal handler failed");
        }
    })
}

fn on_stop(shutdown: &Shutdown, signal: &'static str) {
    if shutdown.is_triggered() {
        tracing::warn!(signal, "Second stop signal, forcing exit");
        std::process::exit(130);
    }
    tracing::info!(signal, "Stop signal received, shutting down");
    shutdown.trigger();
}

#[cfg(unix)]
async fn listen(shutdown: &Shutdown, config: &Config, dispatcher: &Dispatcher) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                res?;
                on_stop(shutdown, "SIGINT");
            }
            _ = terminate.recv() => on_stop(shutdown, "SIGTERM"),
            _ = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading configuration");
                if let Err(e) = reload_and_notify(config, dispatcher, "sighup") {
                    tracing::error!(error = %e, "Reload failed. Keeping current configuration.");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn listen(shutdown: &Shutdown, _config: &Config, _dispatcher: &Dispatcher) -> std::io::Result<()> {
    loop {
        tokio::signal::ctrl_c().await?;
        on_stop(shutdown, "SIGINT");
    }
}
