//! Concurrent module orchestration.
//!
//! # Responsibilities
//! - Start every enabled module in registration order
//! - Publish start and shutdown events per module
//! - Propagate the first failure to every sibling through a shared scope
//! - Wait for every module before returning
//!
//! # Data Flow
//! ```text
//! serve(ctx)
//!     → scope = ctx.child_token()
//!     → for each enabled module: MODULE_START, spawn run(scope) on JoinSet
//!     → module returns: (error? cancel scope) → MODULE_SHUTDOWN
//!     → all joined → first error or Ok
//! ```
//!
//! # Design Decisions
//! - Shutdown is cooperative: modules are never aborted
//! - A failing module cancels the scope itself, before its shutdown event,
//!   so siblings observe cancellation no later than the error
//! - `<section>.disable = true` skips a module entirely, without events

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{ConfigAccessor, ConfigAccessorExt};
use crate::events::{DispatchError, Dispatcher, ModuleEvent, MODULE_SHUTDOWN, MODULE_START};
use crate::lifecycle::module::{Module, ModuleIdentity};
use crate::lifecycle::registry::ModuleRegistry;
use crate::observability::{metrics, tracing::module_span};
use crate::BoxError;

/// Where a `serve` call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl fmt::Display for ServeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServeState::Idle => "idle",
            ServeState::Starting => "starting",
            ServeState::Running => "running",
            ServeState::Stopping => "stopping",
            ServeState::Stopped => "stopped",
            ServeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Error returned by [`Orchestrator::serve`].
#[derive(Debug, Error)]
pub enum ServeError {
    /// A module's `run` returned an error.
    #[error("module {identity} failed: {source}")]
    Module {
        identity: ModuleIdentity,
        #[source]
        source: BoxError,
    },

    /// A module's task panicked.
    #[error("module {identity} panicked")]
    Panicked { identity: ModuleIdentity },

    /// A lifecycle event listener rejected an event.
    #[error("lifecycle event for {identity} rejected: {source}")]
    Event {
        identity: ModuleIdentity,
        #[source]
        source: DispatchError,
    },
}

/// Runs the modules of a [`ModuleRegistry`] as one task group.
pub struct Orchestrator {
    registry: Arc<ModuleRegistry>,
    dispatcher: Arc<Dispatcher>,
    config: Arc<dyn ConfigAccessor>,
    state: watch::Sender<ServeState>,
}

impl Orchestrator {
    pub fn new(registry: Arc<ModuleRegistry>, dispatcher: Arc<Dispatcher>, config: Arc<dyn ConfigAccessor>) -> Self {
        let (state, _) = watch::channel(ServeState::Idle);
        Self {
            registry,
            dispatcher,
            config,
            state,
        }
    }

    /// Observe state transitions.
    pub fn state(&self) -> watch::Receiver<ServeState> {
        self.state.subscribe()
    }

    /// Registered modules whose section is not disabled, in registration order.
    pub fn enabled_modules(&self) -> Vec<Arc<dyn Module>> {
        self.registry
            .modules()
            .into_iter()
            .filter(|module| {
                let identity = module.identity();
                let disabled = self.config.bool(&format!("{}.disable", identity.kind.section()));
                if disabled {
                    tracing::info!(module = %identity, "Module disabled by configuration");
                }
                !disabled
            })
            .collect()
    }

    /// Run every enabled module until all of them return.
    ///
    /// Cancelling `ctx` asks every module to stop. The first module error
    /// cancels the others and is returned once everything has stopped.
    pub async fn serve(&self, ctx: CancellationToken) -> Result<(), ServeError> {
        let modules = self.enabled_modules();
        if modules.is_empty() {
            tracing::info!("No modules to serve");
            self.state.send_replace(ServeState::Stopped);
            return Ok(());
        }

        self.state.send_replace(ServeState::Starting);
        let scope = ctx.child_token();
        let mut tasks = JoinSet::new();
        let mut identities = HashMap::new();
        let mut first_error = None;

        for module in modules {
            let identity = module.identity();
            if let Err(source) = self.dispatcher.dispatch(MODULE_START, &ModuleEvent::new(identity.clone())) {
                tracing::error!(module = %identity, error = %source, "Start event rejected");
                scope.cancel();
                first_error = Some(ServeError::Event { identity, source });
                break;
            }

            tracing::info!(module = %identity, "Module starting");
            metrics::record_module_start(identity.kind.section());
            let span = module_span(&identity);
            let task = run_module(module, identity.clone(), scope.clone(), Arc::clone(&self.dispatcher));
            let handle = tasks.spawn(task.instrument(span));
            identities.insert(handle.id(), identity);
        }

        if first_error.is_none() {
            self.state.send_replace(ServeState::Running);
        }

        let mut stopping = false;
        loop {
            tokio::select! {
                joined = tasks.join_next_with_id() => {
                    let Some(joined) = joined else { break };
                    let outcome = match joined {
                        Ok((id, outcome)) => {
                            identities.remove(&id);
                            outcome
                        }
                        Err(e) => {
                            let Some(identity) = identities.remove(&e.id()) else { continue };
                            scope.cancel();
                            self.after_panic(&identity);
                            Err(ServeError::Panicked { identity })
                        }
                    };

                    if let Err(e) = outcome {
                        if first_error.is_none() {
                            tracing::error!(error = %e, "Module failed, stopping siblings");
                            first_error = Some(e);
                        } else {
                            tracing::warn!(error = %e, "Additional module failure");
                        }
                    }
                }
                _ = scope.cancelled(), if !stopping => {
                    stopping = true;
                    tracing::info!(remaining = tasks.len(), "Stopping modules");
                    self.state.send_replace(ServeState::Stopping);
                }
            }
        }

        match first_error {
            Some(e) => {
                self.state.send_replace(ServeState::Failed);
                Err(e)
            }
            None => {
                tracing::info!("All modules stopped");
                self.state.send_replace(ServeState::Stopped);
                Ok(())
            }
        }
    }

    fn after_panic(&self, identity: &ModuleIdentity) {
        tracing::error!(module = %identity, "Module panicked");
        metrics::record_module_stop(identity.kind.section(), false);
        if let Err(e) = self.dispatcher.dispatch(MODULE_SHUTDOWN, &ModuleEvent::new(identity.clone())) {
            tracing::warn!(module = %identity, error = %e, "Shutdown event rejected");
        }
    }
}

async fn run_module(
    module: Arc<dyn Module>,
    identity: ModuleIdentity,
    scope: CancellationToken,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), ServeError> {
    let result = module.run(scope.clone()).await;
    if result.is_err() {
        scope.cancel();
    }
    metrics::record_module_stop(identity.kind.section(), result.is_ok());
    tracing::info!(module = %identity, ok = result.is_ok(), "Module stopped");

    let event = dispatcher.dispatch(MODULE_SHUTDOWN, &ModuleEvent::new(identity.clone()));
    match (result, event) {
        (Err(source), _) => Err(ServeError::Module { identity, source }),
        (Ok(()), Err(source)) => {
            scope.cancel();
            Err(ServeError::Event { identity, source })
        }
        (Ok(()), Ok(())) => Ok(()),
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("modules", &self.registry.modules().len())
            .field("state", &*self.state.borrow())
            .finish()
    }
}
