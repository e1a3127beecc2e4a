//! Typed bridges from user closures to the type-erased container.
//!
//! A constructor is any closure whose arguments are all resolvable
//! dependencies and whose return value is the provided type:
//!
//! ```rust,ignore
//! provide(|| Config::default())
//! provide(|cfg: Arc<Config>| Server::new(&cfg))
//! try_provide(|cfg: Arc<Config>| Pool::connect(&cfg.url))
//! ```
//!
//! Arguments are received as `Arc<T>`, the shape the container hands out.
//! The traits here are implemented for closures of arity 0 through 8; they
//! also report their dependency list so the graph can be validated and drawn
//! without executing anything.

use super::container::ResolveCx;
use crate::error::{ArmatureError, Result};
use std::any::TypeId;
use std::sync::Arc;

/// One edge in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepInfo {
    pub type_id: TypeId,
    pub type_name: &'static str,
}

/// A value resolvable from the container. Implemented for `Arc<T>`.
pub trait Dep: Sized + Send + Sync + 'static {
    fn info() -> DepInfo;
    fn resolve(cx: &mut ResolveCx<'_>) -> Result<Self>;
}

impl<T: Send + Sync + 'static> Dep for Arc<T> {
    fn info() -> DepInfo {
        DepInfo {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    fn resolve(cx: &mut ResolveCx<'_>) -> Result<Self> {
        cx.resolve::<T>()
    }
}

/// An infallible constructor.
pub trait Provider<Args>: Send + Sync + 'static {
    type Output: Send + Sync + 'static;
    fn deps() -> Vec<DepInfo>;
    fn provide(&self, cx: &mut ResolveCx<'_>) -> Result<Self::Output>;
}

/// A constructor returning `Result<T, E>`.
pub trait TryProvider<Args>: Send + Sync + 'static {
    type Output: Send + Sync + 'static;
    fn deps() -> Vec<DepInfo>;
    fn provide(&self, cx: &mut ResolveCx<'_>) -> Result<Self::Output>;
}

/// An infallible invocation target.
pub trait Invoker<Args>: Send + Sync + 'static {
    fn deps() -> Vec<DepInfo>;
    fn invoke(&self, cx: &mut ResolveCx<'_>) -> Result<()>;
}

/// An invocation target returning `Result<(), E>`.
pub trait TryInvoker<Args>: Send + Sync + 'static {
    fn deps() -> Vec<DepInfo>;
    fn invoke(&self, cx: &mut ResolveCx<'_>) -> Result<()>;
}

/// An infallible decorator: takes the original value first, then any
/// additional dependencies, and returns the replacement value.
///
/// `Target` is carried as an explicit trait parameter (rather than an
/// associated type) because it also appears as an argument type of the
/// blanket `Fn` impl below; the compiler can only treat a type as
/// constrained by such a `where`-clause when it doesn't also occur in the
/// `Fn`'s argument list, so it must instead be named directly in the trait
/// being implemented.
pub trait Decorator<Target, Args>: Send + Sync + 'static
where
    Target: Send + Sync + 'static,
{
    fn deps() -> Vec<DepInfo>;
    fn decorate(&self, value: Arc<Target>, cx: &mut ResolveCx<'_>) -> Result<Target>;
}

/// A decorator returning `Result<T, E>`.
pub trait TryDecorator<Target, Args>: Send + Sync + 'static
where
    Target: Send + Sync + 'static,
{
    fn deps() -> Vec<DepInfo>;
    fn decorate(&self, value: Arc<Target>, cx: &mut ResolveCx<'_>) -> Result<Target>;
}

fn constructor_error<F, E>(err: E) -> ArmatureError
where
    F: 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    ArmatureError::Constructor {
        constructor: std::any::type_name::<F>().to_string(),
        source: Arc::new(err),
    }
}

fn invoke_error<F, E>(err: E) -> ArmatureError
where
    F: 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    ArmatureError::Invoke {
        function: std::any::type_name::<F>().to_string(),
        source: Arc::new(err),
    }
}

macro_rules! impl_callables {
    ($($arg:ident),*) => {
        impl<F, T, $($arg,)*> Provider<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> T + Send + Sync + 'static,
            T: Send + Sync + 'static,
            $($arg: Dep,)*
        {
            type Output = T;

            fn deps() -> Vec<DepInfo> {
                vec![$($arg::info()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn provide(&self, cx: &mut ResolveCx<'_>) -> Result<T> {
                $(let $arg = $arg::resolve(cx)?;)*
                Ok((self)($($arg),*))
            }
        }

        impl<F, T, E, $($arg,)*> TryProvider<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> std::result::Result<T, E> + Send + Sync + 'static,
            T: Send + Sync + 'static,
            E: std::error::Error + Send + Sync + 'static,
            $($arg: Dep,)*
        {
            type Output = T;

            fn deps() -> Vec<DepInfo> {
                vec![$($arg::info()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn provide(&self, cx: &mut ResolveCx<'_>) -> Result<T> {
                $(let $arg = $arg::resolve(cx)?;)*
                (self)($($arg),*).map_err(constructor_error::<F, E>)
            }
        }

        impl<F, $($arg,)*> Invoker<($($arg,)*)> for F
        where
            F: Fn($($arg),*) + Send + Sync + 'static,
            $($arg: Dep,)*
        {
            fn deps() -> Vec<DepInfo> {
                vec![$($arg::info()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn invoke(&self, cx: &mut ResolveCx<'_>) -> Result<()> {
                $(let $arg = $arg::resolve(cx)?;)*
                (self)($($arg),*);
                Ok(())
            }
        }

        impl<F, E, $($arg,)*> TryInvoker<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> std::result::Result<(), E> + Send + Sync + 'static,
            E: std::error::Error + Send + Sync + 'static,
            $($arg: Dep,)*
        {
            fn deps() -> Vec<DepInfo> {
                vec![$($arg::info()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn invoke(&self, cx: &mut ResolveCx<'_>) -> Result<()> {
                $(let $arg = $arg::resolve(cx)?;)*
                (self)($($arg),*).map_err(invoke_error::<F, E>)
            }
        }

        impl<F, T, $($arg,)*> Decorator<T, ($($arg,)*)> for F
        where
            F: Fn(Arc<T>, $($arg),*) -> T + Send + Sync + 'static,
            T: Send + Sync + 'static,
            $($arg: Dep,)*
        {
            fn deps() -> Vec<DepInfo> {
                vec![$($arg::info()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn decorate(&self, value: Arc<T>, cx: &mut ResolveCx<'_>) -> Result<T> {
                $(let $arg = $arg::resolve(cx)?;)*
                Ok((self)(value, $($arg),*))
            }
        }

        impl<F, T, E, $($arg,)*> TryDecorator<T, ($($arg,)*)> for F
        where
            F: Fn(Arc<T>, $($arg),*) -> std::result::Result<T, E> + Send + Sync + 'static,
            T: Send + Sync + 'static,
            E: std::error::Error + Send + Sync + 'static,
            $($arg: Dep,)*
        {
            fn deps() -> Vec<DepInfo> {
                vec![$($arg::info()),*]
            }

            #[allow(non_snake_case, unused_variables)]
            fn decorate(&self, value: Arc<T>, cx: &mut ResolveCx<'_>) -> Result<T> {
                $(let $arg = $arg::resolve(cx)?;)*
                (self)(value, $($arg),*).map_err(constructor_error::<F, E>)
            }
        }
    };
}

impl_callables!();
impl_callables!(A1);
impl_callables!(A1, A2);
impl_callables!(A1, A2, A3);
impl_callables!(A1, A2, A3, A4);
impl_callables!(A1, A2, A3, A4, A5);
impl_callables!(A1, A2, A3, A4, A5, A6);
impl_callables!(A1, A2, A3, A4, A5, A6, A7);
impl_callables!(A1, A2, A3, A4, A5, A6, A7, A8);
