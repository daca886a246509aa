//! Constructor shapes understood by the container.
//!
//! A constructor is any `Fn(A1, …, An) -> R` with up to eight injectable
//! inputs. `R` is either [`Provide<T>`] or `Result<Provide<T>, E>`; the
//! `Provide` value carries the provided `T` plus any cleanups and modules
//! the constructor wants captured.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::di::container::Resolver;
use crate::di::error::ContainerError;
use crate::lifecycle::{Cleanup, Module};
use crate::BoxError;

/// Types that can flow through the container.
pub trait Injectable: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Injectable for T {}

/// The tagged result of a constructor.
pub struct Provide<T> {
    value: T,
    cleanups: Vec<Cleanup>,
    modules: Vec<Arc<dyn Module>>,
}

impl<T> Provide<T> {
    /// An ordinary value with nothing to capture.
    pub fn value(value: T) -> Self {
        Self {
            value,
            cleanups: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Capture a teardown callback, run once at shutdown.
    pub fn with_cleanup(mut self, label: impl Into<String>, cleanup: impl FnOnce() + Send + 'static) -> Self {
        self.cleanups.push(Cleanup::new(label, cleanup));
        self
    }

    /// Capture a module for the orchestrator.
    pub fn with_module(mut self, module: impl Module) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    /// Whether this result behaves like a plain constructor.
    pub fn is_plain(&self) -> bool {
        self.cleanups.is_empty() && self.modules.is_empty()
    }

    /// Transform the provided value, keeping what was captured.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Provide<U> {
        Provide {
            value: f(self.value),
            cleanups: self.cleanups,
            modules: self.modules,
        }
    }

    pub(crate) fn into_parts(self) -> (T, Vec<Cleanup>, Vec<Arc<dyn Module>>) {
        (self.value, self.cleanups, self.modules)
    }
}

impl<T: fmt::Debug> fmt::Debug for Provide<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provide")
            .field("value", &self.value)
            .field("cleanups", &self.cleanups.len())
            .field("modules", &self.modules.len())
            .finish()
    }
}

/// Conversion from a constructor's return value.
pub trait IntoProvide<T> {
    fn into_provide(self) -> Result<Provide<T>, BoxError>;
}

impl<T> IntoProvide<T> for Provide<T> {
    fn into_provide(self) -> Result<Provide<T>, BoxError> {
        Ok(self)
    }
}

impl<T, E: Into<BoxError>> IntoProvide<T> for Result<Provide<T>, E> {
    fn into_provide(self) -> Result<Provide<T>, BoxError> {
        self.map_err(Into::into)
    }
}

/// A declared input or output of a constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

impl Dependency {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }
}

/// A function whose inputs the container can supply.
///
/// Implemented for every `Fn` of up to eight [`Injectable`] arguments.
pub trait Injector<Args> {
    type Output;

    /// Input types, in parameter order.
    fn dependencies(&self) -> Vec<Dependency>;

    /// Resolve the inputs and call the function.
    fn inject(&self, resolver: &mut Resolver<'_>) -> Result<Self::Output, ContainerError>;
}

macro_rules! impl_injector {
    ($($arg:ident),*) => {
        impl<Func, R, $($arg,)*> Injector<($($arg,)*)> for Func
        where
            Func: Fn($($arg),*) -> R,
            $($arg: Injectable,)*
        {
            type Output = R;

            fn dependencies(&self) -> Vec<Dependency> {
                vec![$(Dependency::of::<$arg>()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn inject(&self, resolver: &mut Resolver<'_>) -> Result<R, ContainerError> {
                $(let $arg = resolver.resolve::<$arg>()?;)*
                Ok((self)($($arg),*))
            }
        }
    };
}

impl_injector!();
impl_injector!(A1);
impl_injector!(A1, A2);
impl_injector!(A1, A2, A3);
impl_injector!(A1, A2, A3, A4);
impl_injector!(A1, A2, A3, A4, A5);
impl_injector!(A1, A2, A3, A4, A5, A6);
impl_injector!(A1, A2, A3, A4, A5, A6, A7);
impl_injector!(A1, A2, A3, A4, A5, A6, A7, A8);
