//! The dependency-injection container: a TypeId-keyed constructor registry
//! with singleton memoization, module-scoped privacy, resolve-time cycle
//! detection, dry-run validation, and DOT-language graph rendering.
//!
//! The container is deliberately dumb about the application lifecycle: it
//! never inspects what a constructor does, and the lifecycle controller never
//! inspects constructor signatures. The typed layer in [`constructor`]
//! bridges user closures into the type-erased registry.

mod constructor;
mod container;
mod graph;

pub use constructor::{Decorator, Dep, DepInfo, Invoker, Provider, TryDecorator, TryInvoker, TryProvider};
pub use container::{Container, ResolveCx};
pub use graph::DotGraph;

pub(crate) use container::{
    DecorateRegistration, InvokeCall, ProvideRegistration, ScopeId, ROOT_SCOPE,
};
pub(crate) use graph::{can_visualize, render, render_error};
