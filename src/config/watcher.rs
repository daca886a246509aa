//! Configuration file watcher for hot reload.

use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::{Config, ConfigError};
use crate::config::reload_and_notify;
use crate::events::Dispatcher;

/// Watches every file layer of a [`Config`] and reloads on change.
///
/// A successful reload publishes [`RELOAD`](crate::events::RELOAD) on the
/// dispatcher; a failed one keeps the current snapshot.
pub struct ConfigWatcher {
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
}

impl ConfigWatcher {
    pub fn new(config: Arc<Config>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// Start watching in a background thread.
    ///
    /// Watching stops when the returned watcher is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, ConfigError> {
        let files = self.config.files();
        let config = Arc::clone(&self.config);
        let dispatcher = Arc::clone(&self.dispatcher);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let origin = event
                            .paths
                            .first()
                            .map(|path| path.display().to_string())
                            .unwrap_or_else(|| "watcher".to_string());
                        tracing::info!(origin = %origin, "Config file change detected, reloading...");
                        if let Err(e) = reload_and_notify(&config, &dispatcher, &origin) {
                            tracing::error!(error = %e, "Failed to reload config. Keeping current configuration.");
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            notify::Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        for path in &files {
            watcher.watch(path, RecursiveMode::NonRecursive)?;
        }

        tracing::info!(files = ?files, "Config watcher started");
        Ok(watcher)
    }
}
