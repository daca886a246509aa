//! Type-indexed object graph.
//!
//! # Responsibilities
//! - Register constructors keyed by their output type
//! - Resolve inputs transitively, constructing each type at most once
//! - Route captured cleanups and modules into the [`ModuleRegistry`]
//!
//! # Design Decisions
//! - Resolution is lazy: a constructor runs the first time its output is needed
//! - One resolution runs at a time; constructors never see a half-built graph
//! - Constructors must not call back into the container (they receive their
//!   inputs instead)

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use crate::di::constructor::{Dependency, Injectable, Injector, IntoProvide};
use crate::di::error::ContainerError;
use crate::lifecycle::ModuleRegistry;
use crate::BoxError;

type Instance = Arc<dyn Any + Send + Sync>;
type ConstructFn = dyn Fn(&mut Resolver<'_>) -> Result<Instance, ContainerError> + Send + Sync;

struct Provider {
    output: Dependency,
    construct: Box<ConstructFn>,
}

/// The dependency graph.
pub struct Container {
    providers: RwLock<HashMap<TypeId, Arc<Provider>>>,
    instances: Mutex<HashMap<TypeId, Instance>>,
    resolving: Mutex<()>,
    registry: Arc<ModuleRegistry>,
}

impl Container {
    /// Create an empty container that captures into `registry`.
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
            resolving: Mutex::new(()),
            registry,
        }
    }

    /// Register a constructor for `T`.
    ///
    /// Fails with `InvalidConstructor` when `T` already has a constructor or
    /// when the constructor takes `T` as an input.
    pub fn register<Args, F, T>(&self, constructor: F) -> Result<(), ContainerError>
    where
        Args: 'static,
        F: Injector<Args> + Send + Sync + 'static,
        <F as Injector<Args>>::Output: IntoProvide<T>,
        T: Injectable,
    {
        let output = Dependency::of::<T>();
        if constructor.dependencies().contains(&output) {
            return Err(ContainerError::InvalidConstructor {
                type_name: output.type_name,
                reason: "constructor depends on its own output",
            });
        }

        let registry = Arc::clone(&self.registry);
        let construct = boxed(move |resolver| {
            let provided = constructor
                .inject(resolver)?
                .into_provide()
                .map_err(|source| ContainerError::ConstructionFailed {
                    type_name: output.type_name,
                    source,
                })?;

            let (value, cleanups, modules) = provided.into_parts();
            for cleanup in cleanups {
                registry.add_cleanup(cleanup);
            }
            for module in modules {
                registry.add_module(module);
            }
            Ok(Arc::new(value) as Instance)
        });

        let mut providers = self.providers.write().unwrap_or_else(PoisonError::into_inner);
        if providers.contains_key(&output.type_id) {
            return Err(ContainerError::InvalidConstructor {
                type_name: output.type_name,
                reason: "output type is already provided",
            });
        }
        providers.insert(
            output.type_id,
            Arc::new(Provider {
                output,
                construct,
            }),
        );
        tracing::debug!(provides = output.type_name, "Constructor registered");
        Ok(())
    }

    /// Register an already built value.
    pub fn supply<T: Injectable>(&self, value: T) -> Result<(), ContainerError> {
        self.register(move || crate::di::Provide::value(value.clone()))
    }

    /// Resolve the inputs of `function`, call it, and return what it returns.
    pub fn call<Args, F>(&self, function: F) -> Result<F::Output, ContainerError>
    where
        F: Injector<Args>,
    {
        let _serial = self.lock_resolution();
        let mut resolver = Resolver::new(self);
        function.inject(&mut resolver)
    }

    /// Like [`call`](Self::call) for fallible functions: the function's own
    /// error is reported as `ContainerError::Invocation`.
    pub fn invoke<Args, F, O, E>(&self, function: F) -> Result<O, ContainerError>
    where
        F: Injector<Args, Output = Result<O, E>>,
        E: Into<BoxError>,
    {
        self.call(function)?
            .map_err(|e| ContainerError::Invocation(e.into()))
    }

    /// Resolve a single type.
    pub fn resolve<T: Injectable>(&self) -> Result<T, ContainerError> {
        let _serial = self.lock_resolution();
        Resolver::new(self).resolve::<T>()
    }

    /// Whether a constructor for `T` is registered.
    pub fn provides<T: 'static>(&self) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&TypeId::of::<T>())
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    fn lock_resolution(&self) -> MutexGuard<'_, ()> {
        self.resolving.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn instance(&self, id: &TypeId) -> Option<Instance> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn provider(&self, id: &TypeId) -> Option<Arc<Provider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}

fn boxed<F>(construct: F) -> Box<ConstructFn>
where
    F: Fn(&mut Resolver<'_>) -> Result<Instance, ContainerError> + Send + Sync + 'static,
{
    Box::new(construct)
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = self.providers.read().unwrap_or_else(PoisonError::into_inner);
        let mut provides: Vec<_> = providers.values().map(|p| p.output.type_name).collect();
        provides.sort_unstable();
        f.debug_struct("Container").field("provides", &provides).finish()
    }
}

/// Walks the graph for one top-level resolution.
///
/// Tracks the chain of types being constructed to report cycles and the
/// requiring type of a missing dependency.
pub struct Resolver<'c> {
    container: &'c Container,
    stack: Vec<Dependency>,
}

impl<'c> Resolver<'c> {
    fn new(container: &'c Container) -> Self {
        Self {
            container,
            stack: Vec::new(),
        }
    }

    /// Resolve `T`, constructing it and its inputs if needed.
    pub fn resolve<T: Injectable>(&mut self) -> Result<T, ContainerError> {
        let wanted = Dependency::of::<T>();

        let instance = match self.container.instance(&wanted.type_id) {
            Some(instance) => instance,
            None => self.construct(wanted)?,
        };

        instance
            .downcast_ref::<T>()
            .cloned()
            .ok_or_else(|| ContainerError::ConstructionFailed {
                type_name: wanted.type_name,
                source: format!("stored instance is not a `{}`", type_name::<T>()).into(),
            })
    }

    fn construct(&mut self, wanted: Dependency) -> Result<Instance, ContainerError> {
        let Some(provider) = self.container.provider(&wanted.type_id) else {
            return Err(ContainerError::MissingDependency {
                type_name: wanted.type_name,
                required_by: self.stack.last().map_or("invocation", |d| d.type_name),
            });
        };

        if self.stack.contains(&wanted) {
            let mut chain: Vec<_> = self.stack.iter().map(|d| d.type_name).collect();
            chain.push(wanted.type_name);
            return Err(ContainerError::DependencyCycle { chain });
        }

        self.stack.push(wanted);
        let built = (provider.construct)(self);
        self.stack.pop();
        let instance = built?;

        tracing::debug!(provides = wanted.type_name, "Dependency constructed");
        self.container
            .instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(wanted.type_id, Arc::clone(&instance));
        Ok(instance)
    }
}
