//! The application: owns the module tree, the container, the lifecycle, and
//! the shutdown coordinator.

use crate::di::{
    can_visualize, render, render_error, Container, DotGraph, ProvideRegistration, ResolveCx,
    ROOT_SCOPE,
};
use crate::error::{ArmatureError, Result};
use crate::event::Event;
use crate::lifecycle::{
    Context, Lifecycle, ShutdownSignal, Shutdowner, SignalReceivers,
};
use crate::module::Module;
use crate::options::{self, DynOption, ErrorHandler};
use std::any::{Any, TypeId};
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default start and stop timeout, configurable with the `start_timeout` and
/// `stop_timeout` options.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A modular application built around dependency injection.
///
/// `App::new` applies options, wires the graph, and runs invocations; the
/// application is then ready for [`App::run`] (or [`App::start`] /
/// [`App::stop`] by hand). Three constructors are always available to user
/// code: `Arc<Lifecycle>` for registering hooks, `Arc<Shutdowner>` for
/// programmatic shutdown, and `Arc<DotGraph>` for graph diagnostics.
pub struct App {
    err: Option<ArmatureError>,
    root: Module,
    container: Arc<Container>,
    lifecycle: Lifecycle,
    receivers: Arc<SignalReceivers>,
    start_timeout: Duration,
    stop_timeout: Duration,
    started: bool,
    exit: Box<dyn Fn(i32) + Send + Sync>,
}

impl App {
    /// Create and initialize an application: apply every option, register
    /// provides and decorators, install the event logger, and execute
    /// invocations.
    ///
    /// User errors never panic here. They accumulate and surface through
    /// [`App::err`], and [`App::start`] short-circuits on them, so the
    /// returned `App` is always safe to hold.
    #[track_caller]
    pub fn new(opts: impl IntoIterator<Item = DynOption>) -> App {
        let caller = Location::caller();
        let mut root = Module::root(format!("{}:{}", caller.file(), caller.line()));
        let opts: Vec<DynOption> = opts.into_iter().collect();
        for opt in &opts {
            opt.apply(&mut root);
        }

        let mut err = None;
        root.drain_errors(&mut err);
        let mut handlers: Vec<Arc<dyn ErrorHandler>> = Vec::new();
        root.drain_handlers(&mut handlers);

        let start_timeout = root.start_timeout.unwrap_or(DEFAULT_TIMEOUT);
        let stop_timeout = root.stop_timeout.unwrap_or(DEFAULT_TIMEOUT);

        let container = Arc::new(Container::new(root.validate, root.recover_from_panics));
        root.init_logging(None);
        let logger = root.slot.clone().expect("root logging initialized");

        let lifecycle = Lifecycle::new(logger.clone());
        let receivers = Arc::new(SignalReceivers::new());
        let shutdowner = Shutdowner::new(receivers.clone());

        root.assign_scopes(&container, None);

        // Built-in types go in first so a custom logger depending on, say,
        // the Lifecycle can still be built when unrelated user provides fail.
        let builtins = [
            builtin_supply(lifecycle.clone()),
            builtin_supply(shutdowner),
            builtin_provide::<DotGraph>(|cx: &mut ResolveCx<'_>| {
                Ok(Arc::new(DotGraph(render(cx.container()))) as Arc<dyn Any + Send + Sync>)
            }),
        ];
        for reg in builtins {
            let constructor = reg.constructor.clone();
            let type_name = reg.type_name;
            let result = container.provide(ROOT_SCOPE, false, reg);
            logger.log_event(&Event::Provided {
                constructor,
                type_name,
                module: None,
                err: result.as_ref().err().map(ToString::to_string),
            });
            if let Err(e) = result {
                ArmatureError::append(&mut err, e);
            }
        }

        root.provide_all(&container, &mut err);
        // Decorators register before any invocation runs, so invocations
        // only ever observe decorated values.
        root.decorate_all(&container, &mut err);
        root.install_event_loggers(&container, None);

        if err.is_none() {
            if let Err(invoke_err) = root.invoke_all(&container) {
                let invoke_err = if can_visualize(&invoke_err) {
                    let graph = render_error(&container, &invoke_err);
                    invoke_err.with_graph(graph)
                } else {
                    invoke_err
                };
                err = Some(invoke_err);
            }
        }

        if let Some(e) = &err {
            for handler in &handlers {
                handler.handle_error(e);
            }
        }

        App {
            err,
            root,
            container,
            lifecycle,
            receivers,
            start_timeout,
            stop_timeout,
            started: false,
            exit: Box::new(|code| std::process::exit(code)),
        }
    }

    /// The error accumulated during initialization, if any. Both `run` and
    /// `start` short-circuit on it, so most callers never need this.
    pub fn err(&self) -> Option<&ArmatureError> {
        self.err.as_ref()
    }

    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Execute start hooks in registration order under the configured
    /// [`App::start_timeout`].
    pub async fn start(&mut self) -> Result<()> {
        let (ctx, _cancel) = Context::with_timeout(self.start_timeout);
        self.start_with(&ctx).await
    }

    /// Execute start hooks under a caller-supplied context.
    ///
    /// Hooks run one at a time; a hook never starts until every hook before
    /// it finished. On failure the already-started hooks are rolled back and
    /// the inciting error (combined with any rollback error) is returned.
    /// A second start after a successful one is an error.
    pub async fn start_with(&mut self, ctx: &Context) -> Result<()> {
        let result = self.start_inner(ctx).await;
        self.root.log(Event::Started {
            err: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    async fn start_inner(&mut self, ctx: &Context) -> Result<()> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if self.started {
            return Err(ArmatureError::AlreadyStarted);
        }

        match self.lifecycle.start(ctx).await {
            Ok(()) => {
                self.started = true;
                self.container.freeze();
                Ok(())
            }
            Err(start_err) => {
                self.root.log(Event::RollingBack {
                    start_err: start_err.to_string(),
                });
                let rollback = self.lifecycle.stop(ctx).await;
                self.root.log(Event::RolledBack {
                    err: rollback.as_ref().err().map(ToString::to_string),
                });
                match rollback {
                    Ok(()) => Err(start_err),
                    Err(rollback_err) => Err(ArmatureError::combine(vec![start_err, rollback_err])
                        .expect("two errors combined")),
                }
            }
        }
    }

    /// Execute stop hooks in reverse registration order under the configured
    /// [`App::stop_timeout`].
    pub async fn stop(&mut self) -> Result<()> {
        let (ctx, _cancel) = Context::with_timeout(self.stop_timeout);
        self.stop_with(&ctx).await
    }

    /// Execute stop hooks under a caller-supplied context.
    ///
    /// Only hooks whose start phase ran are stopped; all of them are
    /// attempted even if some fail. Stopping an application that never
    /// started is a no-op.
    pub async fn stop_with(&mut self, ctx: &Context) -> Result<()> {
        let result = self.lifecycle.stop(ctx).await;
        let detach = self.receivers.stop(ctx);
        let result = match (result, detach) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(a), Err(b)) => Err(ArmatureError::combine(vec![a, b]).expect("two errors combined")),
        };
        self.root.log(Event::Stopped {
            err: result.as_ref().err().map(ToString::to_string),
        });
        result
    }

    /// A channel yielding the names of shutdown signals. Prefer
    /// [`App::wait`], which also carries the exit code.
    pub fn done(&self) -> mpsc::Receiver<&'static str> {
        SignalReceivers::start(&self.receivers);
        self.receivers.done()
    }

    /// A channel yielding [`ShutdownSignal`]s, to block on after starting.
    /// If a shutdown was already broadcast, the channel yields it
    /// immediately.
    pub fn wait(&self) -> mpsc::Receiver<ShutdownSignal> {
        SignalReceivers::start(&self.receivers);
        self.receivers.wait()
    }

    /// Start the application, block until a shutdown signal arrives, then
    /// stop it. On a non-zero exit code — startup/shutdown failure, or a
    /// code supplied through [`Shutdowner::shutdown`] — the process exit
    /// hook is invoked.
    pub async fn run(mut self) {
        let code = self.run_inner().await;
        if code != 0 {
            (self.exit)(code);
        }
    }

    pub(crate) async fn run_inner(&mut self) -> i32 {
        if self.start().await.is_err() {
            let _ = self.stop().await;
            return 1;
        }

        let mut wait = self.wait();
        let signal = wait.recv().await.unwrap_or(ShutdownSignal {
            signal: "user",
            exit_code: 0,
        });
        self.root.log(Event::Stopping {
            signal: signal.signal,
        });

        if self.stop().await.is_err() && signal.exit_code == 0 {
            return 1;
        }
        signal.exit_code
    }

    #[cfg(test)]
    pub(crate) fn set_exit_hook(&mut self, hook: impl Fn(i32) + Send + Sync + 'static) {
        self.exit = Box::new(hook);
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> &Module {
        &self.root
    }
}

/// Check that the graph formed by `opts` is complete — every invocation's
/// transitive dependencies are provided, with no cycles — without executing
/// any user function.
pub fn validate_app(opts: impl IntoIterator<Item = DynOption>) -> Result<()> {
    let mut opts: Vec<DynOption> = opts.into_iter().collect();
    opts.push(options::validate());
    let app = App::new(opts);
    match app.err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// The DOT rendering attached to `err`, when it carries one.
pub fn visualize_error(err: &ArmatureError) -> Option<&str> {
    err.graph()
}

fn builtin_supply<T: Send + Sync + 'static>(value: T) -> ProvideRegistration {
    let shared = Arc::new(value);
    ProvideRegistration {
        type_id: TypeId::of::<T>(),
        type_name: std::any::type_name::<T>(),
        constructor: "App::new".to_string(),
        registered_at: Location::caller(),
        deps: Vec::new(),
        is_supply: false,
        ctor: Arc::new(move |_cx| Ok(shared.clone() as Arc<dyn Any + Send + Sync>)),
    }
}

fn builtin_provide<T: Send + Sync + 'static>(
    ctor: impl Fn(&mut ResolveCx<'_>) -> Result<Arc<dyn Any + Send + Sync>> + Send + Sync + 'static,
) -> ProvideRegistration {
    ProvideRegistration {
        type_id: TypeId::of::<T>(),
        type_name: std::any::type_name::<T>(),
        constructor: "App::new".to_string(),
        registered_at: Location::caller(),
        deps: Vec::new(),
        is_supply: false,
        ctor: Arc::new(ctor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::event::EventLogger;
    use crate::lifecycle::{exit_code, Hook};
    use crate::options::{
        error_hook, invoke, logger, module, provide, start_timeout, supply, try_invoke,
        try_with_logger, with_logger,
    };
    use std::io::Write;
    use std::sync::Mutex;

    /// Event recorder installable through `with_logger`.
    #[derive(Clone)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn types(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(Event::name).collect()
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventLogger for Recorder {
        fn log_event(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn recorder_option(recorder: &Recorder) -> DynOption {
        let recorder = recorder.clone();
        with_logger(move || recorder.clone())
    }

    fn assert_subsequence(haystack: &[&'static str], needle: &[&'static str]) {
        let mut iter = haystack.iter();
        for expected in needle {
            assert!(
                iter.any(|got| got == expected),
                "expected {expected:?} in order within {haystack:?}"
            );
        }
    }

    #[tokio::test]
    async fn happy_start_stop_emits_the_full_event_sequence() {
        let recorder = Recorder::new();
        let hook_log = Arc::new(Mutex::new(Vec::new()));
        let log = hook_log.clone();

        let mut app = App::new([
            recorder_option(&recorder),
            provide(|| 7i32),
            invoke(
                move |i: Arc<i32>, lc: Arc<Lifecycle>, shutdowner: Arc<Shutdowner>| {
                    assert_eq!(*i, 7);
                    let log_start = log.clone();
                    let log_stop = log.clone();
                    lc.append(
                        Hook::named("seven")
                            .on_start(move |_ctx| {
                                let log = log_start.clone();
                                async move {
                                    log.lock().unwrap().push("s");
                                    Ok(())
                                }
                            })
                            .on_stop(move |_ctx| {
                                let log = log_stop.clone();
                                async move {
                                    log.lock().unwrap().push("t");
                                    Ok(())
                                }
                            }),
                    )
                    .expect("hooks accepted before start");
                    shutdowner.shutdown([]).expect("shutdown broadcast");
                },
            ),
        ]);
        assert!(app.err().is_none());

        let code = app.run_inner().await;
        assert_eq!(code, 0);
        assert_eq!(*hook_log.lock().unwrap(), vec!["s", "t"]);

        let types = recorder.types();
        assert_subsequence(
            &types,
            &[
                "Provided",
                "Invoking",
                "Invoked",
                "OnStartExecuting",
                "OnStartExecuted",
                "Started",
                "Stopping",
                "OnStopExecuting",
                "OnStopExecuted",
                "Stopped",
            ],
        );
        assert!(types.iter().all(|t| *t != "RollingBack"));

        let stopping = recorder
            .events()
            .into_iter()
            .find_map(|e| match e {
                Event::Stopping { signal } => Some(signal),
                _ => None,
            })
            .expect("stopping event");
        assert_eq!(stopping, "user");
    }

    #[tokio::test]
    async fn start_failure_rolls_back_started_hooks_only() {
        let recorder = Recorder::new();
        let hook_log = Arc::new(Mutex::new(Vec::new()));
        let log = hook_log.clone();

        let mut app = App::new([
            recorder_option(&recorder),
            invoke(move |lc: Arc<Lifecycle>| {
                let a_stop = log.clone();
                lc.append(
                    Hook::named("a")
                        .on_start(|_ctx| async move { Ok(()) })
                        .on_stop(move |_ctx| {
                            let log = a_stop.clone();
                            async move {
                                log.lock().unwrap().push("a.stop");
                                Ok(())
                            }
                        }),
                )
                .unwrap();
                let b_stop = log.clone();
                lc.append(
                    Hook::named("b")
                        .on_start(|_ctx| async move { Err::<(), BoxError>("boom".into()) })
                        .on_stop(move |_ctx| {
                            let log = b_stop.clone();
                            async move {
                                log.lock().unwrap().push("b.stop");
                                Ok(())
                            }
                        }),
                )
                .unwrap();
            }),
        ]);

        let err = app.start().await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        // Only the successfully started hook rolled back.
        assert_eq!(*hook_log.lock().unwrap(), vec!["a.stop"]);

        let types = recorder.types();
        let rolling = types.iter().position(|t| *t == "RollingBack").unwrap();
        let rolled = types.iter().position(|t| *t == "RolledBack").unwrap();
        assert!(rolling < rolled);

        let rollback_err = recorder.events().into_iter().find_map(|e| match e {
            Event::RolledBack { err } => Some(err),
            _ => None,
        });
        assert_eq!(rollback_err, Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn start_timeout_yields_exit_code_one() {
        let recorder = Recorder::new();
        let mut app = App::new([
            recorder_option(&recorder),
            start_timeout(Duration::from_millis(10)),
            invoke(|lc: Arc<Lifecycle>| {
                lc.append(Hook::named("slow").on_start(|_ctx| async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(())
                }))
                .unwrap();
            }),
        ]);

        let code = app.run_inner().await;
        assert_eq!(code, 1);

        let started_err = recorder
            .events()
            .into_iter()
            .find_map(|e| match e {
                Event::Started { err } => Some(err),
                _ => None,
            })
            .expect("started event");
        assert_eq!(started_err.unwrap(), "deadline exceeded");
        assert!(recorder.types().contains(&"Stopped"));
    }

    #[tokio::test]
    async fn programmatic_shutdown_carries_its_exit_code() {
        let shutdowner_slot: Arc<Mutex<Option<Shutdowner>>> = Arc::new(Mutex::new(None));
        let slot = shutdowner_slot.clone();

        let mut app = App::new([
            crate::options::nop_logger(),
            invoke(move |shutdowner: Arc<Shutdowner>| {
                *slot.lock().unwrap() = Some((*shutdowner).clone());
            }),
        ]);
        assert!(app.err().is_none());

        let exited = Arc::new(Mutex::new(None));
        let exited_probe = exited.clone();
        app.set_exit_hook(move |code| {
            *exited_probe.lock().unwrap() = Some(code);
        });

        shutdowner_slot
            .lock()
            .unwrap()
            .as_ref()
            .expect("shutdowner captured")
            .shutdown([exit_code(42)])
            .unwrap();

        app.run().await;
        assert_eq!(*exited.lock().unwrap(), Some(42));
    }

    #[tokio::test]
    async fn validate_reports_missing_types_without_running_anything() {
        struct A;
        struct B;

        let executed = Arc::new(Mutex::new(false));
        let ctor_ran = executed.clone();
        let invoke_ran = executed.clone();

        let err = validate_app([
            crate::options::nop_logger(),
            provide(move || {
                *ctor_ran.lock().unwrap() = true;
                A
            }),
            invoke(move |_b: Arc<B>| {
                *invoke_ran.lock().unwrap() = true;
            }),
        ])
        .unwrap_err();

        assert!(!*executed.lock().unwrap(), "no user function may run");
        assert!(err.to_string().contains("B"), "error was: {err}");
    }

    #[tokio::test]
    async fn failed_with_logger_falls_back_to_the_printer() {
        #[derive(Clone)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buf = Arc::new(Mutex::new(Vec::new()));
        let app = App::new([
            logger(SharedBuf(buf.clone())),
            try_with_logger(|| -> std::result::Result<crate::event::NopLogger, std::io::Error> {
                Err(std::io::Error::other("no logger for you"))
            }),
            supply(11u32),
        ]);
        assert!(app.err().is_none(), "logger failure is not fatal");

        let written = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(written.contains("PROVIDE u32"), "buffered events flushed: {written}");
        assert!(
            written.contains("no logger for you"),
            "LoggerInitialized failure reported: {written}"
        );
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let mut app = App::new([crate::options::nop_logger()]);
        app.start().await.unwrap();
        let err = app.start().await.unwrap_err();
        assert!(matches!(err, ArmatureError::AlreadyStarted));
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let mut app = App::new([crate::options::nop_logger()]);
        app.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_surfaces_the_initialization_error() {
        let handled = Arc::new(Mutex::new(Vec::new()));
        let probe = handled.clone();

        let mut app = App::new([
            crate::options::nop_logger(),
            crate::options::error(std::io::Error::other("bad config")),
            error_hook(move |err: &ArmatureError| {
                probe.lock().unwrap().push(err.to_string());
            }),
        ]);

        assert!(app.err().unwrap().to_string().contains("bad config"));
        assert_eq!(handled.lock().unwrap().len(), 1);

        let err = app.start().await.unwrap_err();
        assert!(err.to_string().contains("bad config"));
    }

    #[tokio::test]
    async fn invoke_errors_carry_a_graph_rendering() {
        struct Missing;

        let app = App::new([
            crate::options::nop_logger(),
            invoke(|_m: Arc<Missing>| {}),
        ]);

        let err = app.err().expect("missing dependency error");
        let graph = visualize_error(err).expect("graph attached");
        assert!(graph.starts_with("digraph {"));
        assert!(graph.contains("Missing"));
    }

    #[tokio::test]
    async fn invoke_failure_short_circuits_later_invokes() {
        let later_ran = Arc::new(Mutex::new(false));
        let probe = later_ran.clone();

        let app = App::new([
            crate::options::nop_logger(),
            try_invoke(|| -> std::result::Result<(), std::io::Error> {
                Err(std::io::Error::other("first invoke failed"))
            }),
            invoke(move || {
                *probe.lock().unwrap() = true;
            }),
        ]);

        assert!(app.err().is_some());
        assert!(!*later_ran.lock().unwrap());
    }

    #[tokio::test]
    async fn dot_graph_is_available_as_a_dependency() {
        let captured = Arc::new(Mutex::new(String::new()));
        let probe = captured.clone();

        let app = App::new([
            crate::options::nop_logger(),
            provide(|| 9i64),
            invoke(move |graph: Arc<DotGraph>, _n: Arc<i64>| {
                *probe.lock().unwrap() = graph.0.clone();
            }),
        ]);
        assert!(app.err().is_none());

        let dot = captured.lock().unwrap().clone();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("i64"));
    }

    #[tokio::test]
    async fn module_options_compose_like_flat_options() {
        let total = Arc::new(Mutex::new(0i32));
        let probe = total.clone();

        let app = App::new([
            crate::options::nop_logger(),
            module("numbers", [supply(4i32)]),
            invoke(move |n: Arc<i32>| {
                *probe.lock().unwrap() = *n;
            }),
        ]);
        assert!(app.err().is_none(), "err: {:?}", app.err());
        assert_eq!(*total.lock().unwrap(), 4);
        assert_eq!(app.root().children.len(), 1);
        assert_eq!(app.root().children[0].name(), "numbers");
        assert!(app.root().children[0].trace().contains("app.rs"));
    }
}
