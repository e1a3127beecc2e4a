//! The option model: everything `App::new` accepts.
//!
//! An option is a value with two operations: applying itself to a module
//! tree, and describing itself for humans. Options are applied in
//! declaration order and their effects accumulate; applying one twice is the
//! same as passing it twice.

use crate::di::{
    Container, DecorateRegistration, Decorator, Invoker, ProvideRegistration, Provider, ScopeId,
    TryDecorator, TryInvoker, TryProvider,
};
use crate::error::{ArmatureError, BoxError, Result};
use crate::event::{ConsoleLogger, EventLogger, NopLogger};
use crate::module::{InvokeSpec, LoggerCtor, Module, ProvideSpec};
use std::any::{Any, TypeId};
use std::fmt;
use std::io::Write;
use std::marker::PhantomData;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

/// A unit of application configuration.
///
/// Implementations mutate the module tree when applied; `Display` yields a
/// human-readable description. Use the free functions in this module
/// (`provide`, `invoke`, `module`, ...) rather than implementing this
/// directly.
pub trait AppOption: Send + fmt::Display {
    fn apply(&self, target: &mut Module);
}

/// A boxed [`AppOption`], the currency of `App::new`.
pub type DynOption = Box<dyn AppOption>;

/// Handles application initialization errors, registered with `error_hook`.
pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, err: &ArmatureError);
}

impl<F> ErrorHandler for F
where
    F: Fn(&ArmatureError) + Send + Sync,
{
    fn handle_error(&self, err: &ArmatureError) {
        self(err)
    }
}

type AnyValue = Arc<dyn Any + Send + Sync>;

fn short_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

// ---------------------------------------------------------------------------
// provide / supply

struct Provide<Args, P> {
    constructor: Arc<P>,
    location: &'static Location<'static>,
    private: bool,
    _args: PhantomData<fn(Args)>,
}

impl<Args, P> Provide<Args, P> {
    fn new(constructor: P, location: &'static Location<'static>, private: bool) -> Self {
        Self {
            constructor: Arc::new(constructor),
            location,
            private,
            _args: PhantomData,
        }
    }
}

impl<Args, P> AppOption for Provide<Args, P>
where
    P: Provider<Args> + 'static,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let constructor = self.constructor.clone();
        target.provides.push(ProvideSpec {
            private: self.private,
            registration: ProvideRegistration {
                type_id: TypeId::of::<P::Output>(),
                type_name: std::any::type_name::<P::Output>(),
                constructor: std::any::type_name::<P>().to_string(),
                registered_at: self.location,
                deps: P::deps(),
                is_supply: false,
                ctor: Arc::new(move |cx| constructor.provide(cx).map(|v| Arc::new(v) as AnyValue)),
            },
        });
    }
}

impl<Args, P> fmt::Display for Provide<Args, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provide({})", std::any::type_name::<P>())
    }
}

// The fallible variant is a distinct type so the `Provider`/`TryProvider`
// blanket impls cannot collide on the same closure.
struct TryProvide<Args, P>(Provide<Args, P>);

impl<Args, P> AppOption for TryProvide<Args, P>
where
    P: TryProvider<Args> + 'static,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let constructor = self.0.constructor.clone();
        target.provides.push(ProvideSpec {
            private: self.0.private,
            registration: ProvideRegistration {
                type_id: TypeId::of::<P::Output>(),
                type_name: std::any::type_name::<P::Output>(),
                constructor: std::any::type_name::<P>().to_string(),
                registered_at: self.0.location,
                deps: P::deps(),
                is_supply: false,
                ctor: Arc::new(move |cx| constructor.provide(cx).map(|v| Arc::new(v) as AnyValue)),
            },
        });
    }
}

impl<Args, P> fmt::Display for TryProvide<Args, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "try_provide({})", std::any::type_name::<P>())
    }
}

/// Register a constructor. Its arguments are resolved from the container as
/// `Arc<T>`; its return value becomes available to everything else.
#[track_caller]
pub fn provide<Args, P>(constructor: P) -> DynOption
where
    P: Provider<Args> + 'static,
    Args: 'static,
{
    Box::new(Provide::new(constructor, Location::caller(), false))
}

/// Like [`provide`], but the produced type is visible only within the
/// enclosing module subtree.
#[track_caller]
pub fn provide_private<Args, P>(constructor: P) -> DynOption
where
    P: Provider<Args> + 'static,
    Args: 'static,
{
    Box::new(Provide::new(constructor, Location::caller(), true))
}

/// Register a fallible constructor returning `Result<T, E>`.
#[track_caller]
pub fn try_provide<Args, P>(constructor: P) -> DynOption
where
    P: TryProvider<Args> + 'static,
    Args: 'static,
{
    Box::new(TryProvide(Provide::new(constructor, Location::caller(), false)))
}

/// Like [`try_provide`], scoped to the enclosing module subtree.
#[track_caller]
pub fn try_provide_private<Args, P>(constructor: P) -> DynOption
where
    P: TryProvider<Args> + 'static,
    Args: 'static,
{
    Box::new(TryProvide(Provide::new(constructor, Location::caller(), true)))
}

struct Supply<T> {
    value: Arc<T>,
    location: &'static Location<'static>,
}

impl<T: Send + Sync + 'static> AppOption for Supply<T> {
    fn apply(&self, target: &mut Module) {
        let value = self.value.clone();
        target.provides.push(ProvideSpec {
            private: false,
            registration: ProvideRegistration {
                type_id: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                constructor: format!("supply({})", short_name(std::any::type_name::<T>())),
                registered_at: self.location,
                deps: Vec::new(),
                is_supply: true,
                ctor: Arc::new(move |_cx| Ok(value.clone() as AnyValue)),
            },
        });
    }
}

impl<T> fmt::Display for Supply<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "supply({})", std::any::type_name::<T>())
    }
}

/// Register an already-constructed value instead of a constructor.
#[track_caller]
pub fn supply<T: Send + Sync + 'static>(value: T) -> DynOption {
    Box::new(Supply {
        value: Arc::new(value),
        location: Location::caller(),
    })
}

// ---------------------------------------------------------------------------
// invoke

struct Invoke<Args, F> {
    function: Arc<F>,
    location: &'static Location<'static>,
    _args: PhantomData<fn(Args)>,
}

impl<Args, F> AppOption for Invoke<Args, F>
where
    F: Invoker<Args> + 'static,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let function = self.function.clone();
        target.invokes.push(InvokeSpec {
            function: std::any::type_name::<F>().to_string(),
            registered_at: self.location,
            deps: F::deps(),
            call: Arc::new(move |cx| function.invoke(cx)),
        });
    }
}

impl<Args, F> fmt::Display for Invoke<Args, F>
where
    F: Invoker<Args> + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invoke({})", std::any::type_name::<F>())
    }
}

struct TryInvoke<Args, F> {
    function: Arc<F>,
    location: &'static Location<'static>,
    _args: PhantomData<fn(Args)>,
}

impl<Args, F> AppOption for TryInvoke<Args, F>
where
    F: TryInvoker<Args> + 'static,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let function = self.function.clone();
        target.invokes.push(InvokeSpec {
            function: std::any::type_name::<F>().to_string(),
            registered_at: self.location,
            deps: F::deps(),
            call: Arc::new(move |cx| function.invoke(cx)),
        });
    }
}

impl<Args, F> fmt::Display for TryInvoke<Args, F>
where
    F: TryInvoker<Args> + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "try_invoke({})", std::any::type_name::<F>())
    }
}

/// Register a function to run once the graph is built. Invocations execute
/// in declaration order and are how applications bootstrap themselves:
/// resolve what you need, append lifecycle hooks, go.
#[track_caller]
pub fn invoke<Args, F>(function: F) -> DynOption
where
    F: Invoker<Args> + 'static,
    Args: 'static,
{
    Box::new(Invoke {
        function: Arc::new(function),
        location: Location::caller(),
        _args: PhantomData,
    })
}

/// Like [`invoke`] for functions returning `Result<(), E>`; an error aborts
/// the rest of initialization.
#[track_caller]
pub fn try_invoke<Args, F>(function: F) -> DynOption
where
    F: TryInvoker<Args> + 'static,
    Args: 'static,
{
    Box::new(TryInvoke {
        function: Arc::new(function),
        location: Location::caller(),
        _args: PhantomData,
    })
}

// ---------------------------------------------------------------------------
// decorate

struct Decorate<Target, Args, D> {
    func: Arc<D>,
    location: &'static Location<'static>,
    _target: PhantomData<fn(Target)>,
    _args: PhantomData<fn(Args)>,
}

impl<Target, Args, D> AppOption for Decorate<Target, Args, D>
where
    D: Decorator<Target, Args> + 'static,
    Target: Send + Sync + 'static,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let func = self.func.clone();
        target.decorates.push(DecorateRegistration {
            type_id: TypeId::of::<Target>(),
            type_name: std::any::type_name::<Target>(),
            decorator: std::any::type_name::<D>().to_string(),
            registered_at: self.location,
            deps: D::deps(),
            func: Arc::new(move |value, cx| {
                let typed = value
                    .downcast::<Target>()
                    .expect("decorated value matches its registered type");
                func.decorate(typed, cx).map(|v| Arc::new(v) as AnyValue)
            }),
        });
    }
}

impl<Target, Args, D> fmt::Display for Decorate<Target, Args, D>
where
    D: Decorator<Target, Args> + 'static,
    Target: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decorate({})", std::any::type_name::<D>())
    }
}

struct TryDecorate<Target, Args, D> {
    func: Arc<D>,
    location: &'static Location<'static>,
    _target: PhantomData<fn(Target)>,
    _args: PhantomData<fn(Args)>,
}

impl<Target, Args, D> AppOption for TryDecorate<Target, Args, D>
where
    D: TryDecorator<Target, Args> + 'static,
    Target: Send + Sync + 'static,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let func = self.func.clone();
        target.decorates.push(DecorateRegistration {
            type_id: TypeId::of::<Target>(),
            type_name: std::any::type_name::<Target>(),
            decorator: std::any::type_name::<D>().to_string(),
            registered_at: self.location,
            deps: D::deps(),
            func: Arc::new(move |value, cx| {
                let typed = value
                    .downcast::<Target>()
                    .expect("decorated value matches its registered type");
                func.decorate(typed, cx).map(|v| Arc::new(v) as AnyValue)
            }),
        });
    }
}

impl<Target, Args, D> fmt::Display for TryDecorate<Target, Args, D>
where
    D: TryDecorator<Target, Args> + 'static,
    Target: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "try_decorate({})", std::any::type_name::<D>())
    }
}

/// Augment an already-provided type. The decorator receives the original
/// value first, then any further dependencies, and returns the replacement.
/// Consumers within the enclosing module subtree observe the decorated
/// value.
#[track_caller]
pub fn decorate<Target, Args, D>(func: D) -> DynOption
where
    D: Decorator<Target, Args> + 'static,
    Target: Send + Sync + 'static,
    Args: 'static,
{
    Box::new(Decorate {
        func: Arc::new(func),
        location: Location::caller(),
        _target: PhantomData,
        _args: PhantomData,
    })
}

/// Like [`decorate`] for decorators returning `Result<T, E>`.
#[track_caller]
pub fn try_decorate<Target, Args, D>(func: D) -> DynOption
where
    D: TryDecorator<Target, Args> + 'static,
    Target: Send + Sync + 'static,
    Args: 'static,
{
    Box::new(TryDecorate {
        func: Arc::new(func),
        location: Location::caller(),
        _target: PhantomData,
        _args: PhantomData,
    })
}

// ---------------------------------------------------------------------------
// grouping

struct OptionGroup(Vec<DynOption>);

impl AppOption for OptionGroup {
    fn apply(&self, target: &mut Module) {
        for opt in &self.0 {
            opt.apply(target);
        }
    }
}

impl fmt::Display for OptionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "options(")?;
        for (i, opt) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{opt}")?;
        }
        write!(f, ")")
    }
}

/// Bundle several options into one. `options([a, options([b, c])])` behaves
/// exactly like passing `a`, `b`, `c` directly.
pub fn options(opts: impl IntoIterator<Item = DynOption>) -> DynOption {
    Box::new(OptionGroup(opts.into_iter().collect()))
}

struct ModuleOption {
    name: String,
    location: &'static Location<'static>,
    opts: Vec<DynOption>,
}

impl AppOption for ModuleOption {
    fn apply(&self, target: &mut Module) {
        let mut child = Module::child(
            self.name.clone(),
            format!("{}:{}", self.location.file(), self.location.line()),
        );
        for opt in &self.opts {
            opt.apply(&mut child);
        }
        target.children.push(child);
    }
}

impl fmt::Display for ModuleOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "module({})", self.name)
    }
}

/// Group options into a named module with its own scope. Provides marked
/// private stay within the module subtree; everything else composes exactly
/// as if passed at the top level.
#[track_caller]
pub fn module(name: impl Into<String>, opts: impl IntoIterator<Item = DynOption>) -> DynOption {
    Box::new(ModuleOption {
        name: name.into(),
        location: Location::caller(),
        opts: opts.into_iter().collect(),
    })
}

// ---------------------------------------------------------------------------
// errors and error handling

struct ErrorOption(ArmatureError);

impl AppOption for ErrorOption {
    fn apply(&self, target: &mut Module) {
        target.record_error(self.0.clone());
    }
}

impl fmt::Display for ErrorOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error({})", self.0)
    }
}

/// Register an error with the application, short-circuiting startup. Unlike
/// a failing invocation, this never aborts option application itself, so a
/// later `with_logger` still takes effect.
pub fn error(err: impl Into<BoxError>) -> DynOption {
    Box::new(ErrorOption(ArmatureError::custom(err)))
}

struct ErrorHookOption(Arc<dyn ErrorHandler>);

impl AppOption for ErrorHookOption {
    fn apply(&self, target: &mut Module) {
        target.handlers.push(self.0.clone());
    }
}

impl fmt::Display for ErrorHookOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error_hook()")
    }
}

/// Register a handler for initialization failures. Handlers run before
/// `App::new` returns; the failure still surfaces through `App::err`.
pub fn error_hook(handler: impl ErrorHandler + 'static) -> DynOption {
    Box::new(ErrorHookOption(Arc::new(handler)))
}

// ---------------------------------------------------------------------------
// loggers

struct WithLogger<Args, P> {
    constructor: Arc<P>,
    location: &'static Location<'static>,
    _args: PhantomData<fn(Args)>,
}

fn logger_ctor<L: EventLogger + 'static>(
    constructor: String,
    registration: ProvideRegistration,
) -> LoggerCtor {
    LoggerCtor {
        constructor,
        registration,
        resolve: Box::new(|container: &Container, scope: ScopeId| -> Result<Arc<dyn EventLogger>> {
            container
                .resolve_value::<L>(scope, "with_logger")
                .map(|logger| logger as Arc<dyn EventLogger>)
        }),
    }
}

impl<Args, P> AppOption for WithLogger<Args, P>
where
    P: Provider<Args> + 'static,
    P::Output: EventLogger,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let constructor = self.constructor.clone();
        target.log_ctor = Some(logger_ctor::<P::Output>(
            std::any::type_name::<P>().to_string(),
            ProvideRegistration {
                type_id: TypeId::of::<P::Output>(),
                type_name: std::any::type_name::<P::Output>(),
                constructor: std::any::type_name::<P>().to_string(),
                registered_at: self.location,
                deps: P::deps(),
                is_supply: false,
                ctor: Arc::new(move |cx| constructor.provide(cx).map(|v| Arc::new(v) as AnyValue)),
            },
        ));
    }
}

impl<Args, P> fmt::Display for WithLogger<Args, P>
where
    P: Provider<Args> + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "with_logger({})", std::any::type_name::<P>())
    }
}

struct TryWithLogger<Args, P> {
    constructor: Arc<P>,
    location: &'static Location<'static>,
    _args: PhantomData<fn(Args)>,
}

impl<Args, P> AppOption for TryWithLogger<Args, P>
where
    P: TryProvider<Args> + 'static,
    P::Output: EventLogger,
    Args: 'static,
{
    fn apply(&self, target: &mut Module) {
        let constructor = self.constructor.clone();
        target.log_ctor = Some(logger_ctor::<P::Output>(
            std::any::type_name::<P>().to_string(),
            ProvideRegistration {
                type_id: TypeId::of::<P::Output>(),
                type_name: std::any::type_name::<P::Output>(),
                constructor: std::any::type_name::<P>().to_string(),
                registered_at: self.location,
                deps: P::deps(),
                is_supply: false,
                ctor: Arc::new(move |cx| constructor.provide(cx).map(|v| Arc::new(v) as AnyValue)),
            },
        ));
    }
}

impl<Args, P> fmt::Display for TryWithLogger<Args, P>
where
    P: TryProvider<Args> + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "try_with_logger({})", std::any::type_name::<P>())
    }
}

/// Construct the event logger through the container. The constructor may
/// depend on anything else provided to the application. Events emitted
/// before it is built are buffered and replayed to it in order; if building
/// it fails, the application keeps its fallback logger and reports the
/// failure as an event rather than an error.
#[track_caller]
pub fn with_logger<Args, P>(constructor: P) -> DynOption
where
    P: Provider<Args> + 'static,
    P::Output: EventLogger,
    Args: 'static,
{
    Box::new(WithLogger {
        constructor: Arc::new(constructor),
        location: Location::caller(),
        _args: PhantomData,
    })
}

/// Like [`with_logger`] for fallible constructors.
#[track_caller]
pub fn try_with_logger<Args, P>(constructor: P) -> DynOption
where
    P: TryProvider<Args> + 'static,
    P::Output: EventLogger,
    Args: 'static,
{
    Box::new(TryWithLogger {
        constructor: Arc::new(constructor),
        location: Location::caller(),
        _args: PhantomData,
    })
}

struct LoggerOption(Arc<dyn EventLogger>);

impl AppOption for LoggerOption {
    fn apply(&self, target: &mut Module) {
        if !target.is_root {
            target.record_error(ArmatureError::TopLevelOnly { option: "logger" });
            return;
        }
        target.fallback = Some(self.0.clone());
    }
}

impl fmt::Display for LoggerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "logger()")
    }
}

/// Redirect event output to `writer` through a [`ConsoleLogger`].
///
/// Prefer [`with_logger`]; this exists for the common migration case and as
/// the fallback when a `with_logger` constructor fails.
pub fn logger(writer: impl Write + Send + 'static) -> DynOption {
    Box::new(LoggerOption(Arc::new(ConsoleLogger::with_writer(writer))))
}

/// Disable event output entirely.
#[track_caller]
pub fn nop_logger() -> DynOption {
    with_logger(|| NopLogger)
}

// ---------------------------------------------------------------------------
// top-level knobs

struct StartTimeout(Duration);

impl AppOption for StartTimeout {
    fn apply(&self, target: &mut Module) {
        if !target.is_root {
            target.record_error(ArmatureError::TopLevelOnly {
                option: "start_timeout",
            });
            return;
        }
        target.start_timeout = Some(self.0);
    }
}

impl fmt::Display for StartTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "start_timeout({:?})", self.0)
    }
}

/// Change how long all start hooks together may take. Defaults to 15s.
pub fn start_timeout(timeout: Duration) -> DynOption {
    Box::new(StartTimeout(timeout))
}

struct StopTimeout(Duration);

impl AppOption for StopTimeout {
    fn apply(&self, target: &mut Module) {
        if !target.is_root {
            target.record_error(ArmatureError::TopLevelOnly {
                option: "stop_timeout",
            });
            return;
        }
        target.stop_timeout = Some(self.0);
    }
}

impl fmt::Display for StopTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stop_timeout({:?})", self.0)
    }
}

/// Change how long all stop hooks together may take. Defaults to 15s.
pub fn stop_timeout(timeout: Duration) -> DynOption {
    Box::new(StopTimeout(timeout))
}

struct RecoverFromPanics;

impl AppOption for RecoverFromPanics {
    fn apply(&self, target: &mut Module) {
        if !target.is_root {
            target.record_error(ArmatureError::TopLevelOnly {
                option: "recover_from_panics",
            });
            return;
        }
        target.recover_from_panics = true;
    }
}

impl fmt::Display for RecoverFromPanics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "recover_from_panics()")
    }
}

/// Convert panics in constructors, decorators, and invocations into ordinary
/// errors retrievable through `App::err`.
pub fn recover_from_panics() -> DynOption {
    Box::new(RecoverFromPanics)
}

struct Validate;

impl AppOption for Validate {
    fn apply(&self, target: &mut Module) {
        if !target.is_root {
            target.record_error(ArmatureError::TopLevelOnly { option: "validate" });
            return;
        }
        target.validate = true;
    }
}

impl fmt::Display for Validate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validate()")
    }
}

/// Dry-run mode: check the graph without executing user functions. Used by
/// `validate_app`.
pub(crate) fn validate() -> DynOption {
    Box::new(Validate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_group_applies_in_order() {
        let mut root = Module::root("test".to_string());
        let grouped = options([supply(1i32), options([supply("x"), supply(2u8)])]);
        grouped.apply(&mut root);

        let types: Vec<_> = root
            .provides
            .iter()
            .map(|p| p.registration.type_name)
            .collect();
        assert_eq!(types, vec!["i32", "&str", "u8"]);
    }

    #[test]
    fn top_level_only_options_error_on_child_modules() {
        let mut root = Module::root("test".to_string());
        let child = module(
            "inner",
            [start_timeout(Duration::from_secs(1)), recover_from_panics()],
        );
        child.apply(&mut root);

        let mut err = None;
        root.drain_errors(&mut err);
        let err = err.unwrap();
        match err {
            ArmatureError::Aggregate(errs) => assert_eq!(errs.len(), 2),
            other => panic!("expected two errors, got {other}"),
        }
    }

    #[test]
    fn applying_an_option_twice_accumulates() {
        let mut root = Module::root("test".to_string());
        let opt = supply(5i64);
        opt.apply(&mut root);
        opt.apply(&mut root);
        assert_eq!(root.provides.len(), 2);
    }

    #[test]
    fn error_option_records_without_aborting_apply() {
        let mut root = Module::root("test".to_string());
        options([
            error(std::io::Error::other("config missing")),
            supply(3u16),
        ])
        .apply(&mut root);

        assert_eq!(root.provides.len(), 1);
        let mut err = None;
        root.drain_errors(&mut err);
        assert!(err.unwrap().to_string().contains("config missing"));
    }

    #[test]
    fn describe_is_human_readable() {
        assert!(supply(1i32).to_string().contains("supply"));
        assert!(start_timeout(Duration::from_secs(3))
            .to_string()
            .starts_with("start_timeout"));
        let grouped = options([recover_from_panics()]);
        assert_eq!(grouped.to_string(), "options(recover_from_panics())");
    }
}
