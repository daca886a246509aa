//! One-shot command module.
//!
//! Runs a single async task once, then returns. Useful for migrations and
//! batch jobs that share the bootstrap wiring of the long-running modules.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::lifecycle::{Module, ModuleIdentity, ModuleKind};
use crate::BoxError;

type CommandFn = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send>;

pub struct CommandModule {
    identity: ModuleIdentity,
    command: Mutex<Option<CommandFn>>,
}

impl CommandModule {
    /// `command` receives the serve scope and should return early when it
    /// is cancelled.
    pub fn new<F, Fut>(name: impl Into<String>, command: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            identity: ModuleIdentity::new(ModuleKind::Command, name),
            command: Mutex::new(Some(Box::new(move |token| Box::pin(command(token))))),
        }
    }
}

impl Module for CommandModule {
    fn identity(&self) -> ModuleIdentity {
        self.identity.clone()
    }

    fn run(&self, shutdown: CancellationToken) -> BoxFuture<'_, Result<(), BoxError>> {
        let command = self
            .command
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Box::pin(async move {
            match command {
                Some(command) => {
                    tracing::info!(command = %self.identity.label, "Command running");
                    command(shutdown).await
                }
                None => {
                    tracing::warn!(command = %self.identity.label, "Command already ran");
                    Ok(())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn runs_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let module = CommandModule::new("migrate", move |_| async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        module.run(CancellationToken::new()).await.unwrap();
        module.run(CancellationToken::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(module.identity().kind, ModuleKind::Command);
    }
}
