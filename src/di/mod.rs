//! Dependency graph.
//!
//! # Data Flow
//! ```text
//! register(|a: A, b: B| Provide::value(c).with_cleanup(..).with_module(..))
//!     → Provider keyed by TypeId::of::<C>()
//!
//! resolve::<C>() / call(f) / invoke(f)
//!     → Resolver walks inputs depth-first
//!     → each provider runs at most once, result memoized
//!     → cleanups and modules routed into the ModuleRegistry
//!     → only the plain value reaches the caller
//! ```
//!
//! # Design Decisions
//! - Constructors declare captured outputs with a tagged return (`Provide`)
//!   instead of the container guessing from the return shape
//! - Input and output types are known at registration; only presence is
//!   checked lazily

pub mod constructor;
pub mod container;
pub mod error;

pub use constructor::{Dependency, Injectable, Injector, IntoProvide, Provide};
pub use container::{Container, Resolver};
pub use error::ContainerError;
