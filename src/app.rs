//! Application bootstrap.
//!
//! `App` bundles everything a service process wires together at startup:
//! configuration, the event dispatcher, the dependency graph, and the
//! module registry the orchestrator serves.
//!
//! ```text
//! App::new(config)
//!     → provide_essentials()        Arc<Config>, Arc<dyn ConfigAccessor>,
//!                                   Arc<Dispatcher>, AppName, Env
//!     → provide(constructor) ...    lazily resolved
//!     → add_module*(...)            captured in registration order
//!     → serve(ctx)                  until cancelled or first failure
//!     → shutdown()                  cleanups, reverse order, once each
//! ```

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

use notify::RecommendedWatcher;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::{AppName, AppSection, Config, ConfigAccessor, ConfigAccessorExt, ConfigError, ConfigWatcher, Env};
use crate::di::{Container, ContainerError, Dependency, Injectable, Injector, IntoProvide, Provide, Resolver};
use crate::events::Dispatcher;
use crate::lifecycle::{Module, ModuleIdentity, ModuleRegistry, Orchestrator, ServeError, ServeState};
use crate::BoxError;

pub struct App {
    name: AppName,
    env: Env,
    config: Arc<Config>,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<ModuleRegistry>,
    container: Container,
    orchestrator: Orchestrator,
}

impl App {
    /// Create an application around `config`; name and environment come
    /// from its `[app]` section.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let section: AppSection = config.unmarshal_or_default("app")?;
        let config = Arc::new(config);
        let dispatcher = Arc::new(Dispatcher::new());
        let registry = Arc::new(ModuleRegistry::new());
        let accessor: Arc<dyn ConfigAccessor> = config.clone();

        tracing::info!(app = %section.name, env = %section.env, "Application created");

        Ok(Self {
            name: AppName(section.name),
            env: section.env,
            container: Container::new(Arc::clone(&registry)),
            orchestrator: Orchestrator::new(Arc::clone(&registry), Arc::clone(&dispatcher), accessor),
            config,
            dispatcher,
            registry,
        })
    }

    pub fn name(&self) -> &AppName {
        &self.name
    }

    pub fn env(&self) -> Env {
        self.env
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Make the process-wide essentials injectable.
    pub fn provide_essentials(&self) -> Result<(), ContainerError> {
        let accessor: Arc<dyn ConfigAccessor> = self.config.clone();
        self.container.supply(Arc::clone(&self.config))?;
        self.container.supply(accessor)?;
        self.container.supply(Arc::clone(&self.dispatcher))?;
        self.container.supply(self.name.clone())?;
        self.container.supply(self.env)?;
        Ok(())
    }

    /// Register a constructor; see [`Container::register`].
    pub fn provide<Args, F, T>(&self, constructor: F) -> Result<(), ContainerError>
    where
        Args: 'static,
        F: Injector<Args> + Send + Sync + 'static,
        <F as Injector<Args>>::Output: IntoProvide<T>,
        T: Injectable,
    {
        self.container.register(constructor)
    }

    /// Resolve the inputs of `function` and call it, flattening its error.
    pub fn invoke<Args, F, O, E>(&self, function: F) -> Result<O, ContainerError>
    where
        F: Injector<Args, Output = Result<O, E>>,
        E: Into<BoxError>,
    {
        self.container.invoke(function)
    }

    /// Resolve the inputs of `function` and call it.
    pub fn call<Args, F>(&self, function: F) -> Result<F::Output, ContainerError>
    where
        F: Injector<Args>,
    {
        self.container.call(function)
    }

    pub fn add_module(&self, module: impl Module) {
        self.registry.add_module(Arc::new(module));
    }

    /// Register a module or fail bootstrap with its construction error.
    pub fn add_module_result<M, E>(&self, module: Result<M, E>) -> Result<(), ContainerError>
    where
        M: Module,
        E: Into<BoxError>,
    {
        let module = module.map_err(|e| ContainerError::ModuleConstruction(e.into()))?;
        self.add_module(module);
        Ok(())
    }

    /// Register a module constructor, resolve it now, and serve the result.
    ///
    /// The module is provided as `Arc<M>`, so other constructors can take it
    /// as an input; a second constructor for the same `M` is rejected.
    /// Cleanups and extra modules carried by its `Provide` are captured
    /// before the module itself.
    pub fn add_module_fn<Args, F, M>(&self, constructor: F) -> Result<(), ContainerError>
    where
        Args: 'static,
        F: Injector<Args> + Send + Sync + 'static,
        <F as Injector<Args>>::Output: IntoProvide<M>,
        M: Module,
    {
        self.container.register(SharedModule::new(constructor))?;
        let module: Arc<M> = self.container.resolve().map_err(|e| match e {
            ContainerError::ConstructionFailed { type_name: failed, source } if failed == type_name::<Arc<M>>() => {
                ContainerError::ModuleConstruction(source)
            }
            other => other,
        })?;
        self.registry.add_module(module);
        Ok(())
    }

    /// Identities of every registered module and cleanup.
    pub fn modules(&self) -> Vec<ModuleIdentity> {
        self.registry.identities()
    }

    /// Run every enabled module; see [`Orchestrator::serve`].
    pub async fn serve(&self, ctx: CancellationToken) -> Result<(), ServeError> {
        tracing::info!(app = %self.name, modules = self.registry.modules().len(), "Serving");
        self.orchestrator.serve(ctx).await
    }

    pub fn state(&self) -> watch::Receiver<ServeState> {
        self.orchestrator.state()
    }

    /// Reload configuration and publish the reload event.
    pub fn reload(&self, origin: &str) -> Result<(), crate::Error> {
        crate::config::reload_and_notify(&self.config, &self.dispatcher, origin)
    }

    /// Watch the configuration files; drop the watcher to stop.
    pub fn watch_config(&self) -> Result<RecommendedWatcher, ConfigError> {
        ConfigWatcher::new(Arc::clone(&self.config), Arc::clone(&self.dispatcher)).run()
    }

    /// Run captured cleanups in reverse registration order.
    ///
    /// Each cleanup runs at most once across repeated calls. Returns how
    /// many ran.
    pub fn shutdown(&self) -> usize {
        let ran = self.registry.drain_cleanups();
        tracing::info!(app = %self.name, cleanups = ran, "Shutdown complete");
        ran
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.name)
            .field("env", &self.env)
            .field("container", &self.container)
            .field("modules", &self.registry.len())
            .finish()
    }
}

/// Provides a module constructor's output as `Arc<M>`.
struct SharedModule<F, M> {
    constructor: F,
    module: PhantomData<fn() -> M>,
}

impl<F, M> SharedModule<F, M> {
    fn new(constructor: F) -> Self {
        Self {
            constructor,
            module: PhantomData,
        }
    }
}

impl<Args, F, M> Injector<Args> for SharedModule<F, M>
where
    F: Injector<Args>,
    <F as Injector<Args>>::Output: IntoProvide<M>,
{
    type Output = Result<Provide<Arc<M>>, BoxError>;

    fn dependencies(&self) -> Vec<Dependency> {
        self.constructor.dependencies()
    }

    fn inject(&self, resolver: &mut Resolver<'_>) -> Result<Self::Output, ContainerError> {
        let provided = self.constructor.inject(resolver)?.into_provide();
        Ok(provided.map(|provided| provided.map(Arc::new)))
    }
}
