//! Ordered startup and reverse-ordered shutdown of application resources.
//!
//! Constructors register [`Hook`]s with the [`Lifecycle`] while the
//! dependency graph is being wired. Because constructors run serially in
//! dependency order, hooks end up registered in dependency order too: a
//! hook's dependencies start before it and stop after it.
//!
//! ```text
//! 1. Option application (apply phase)
//!    ↓
//! 2. Graph wiring: constructors run, hooks are appended
//!    ↓
//! 3. App::start  — on-start callbacks, in append order
//!    ↓
//! [Running... blocked on the shutdown coordinator]
//!    ↓
//! 4. Shutdown signal (SIGTERM / SIGINT / Shutdowner)
//!    ↓
//! 5. App::stop   — on-stop callbacks, in reverse order
//! ```

mod context;
mod shutdown;
mod timeout;

pub use context::{CancelHandle, Context};
pub use shutdown::{exit_code, ShutdownOption, ShutdownSignal, Shutdowner};

pub(crate) use shutdown::SignalReceivers;
pub(crate) use timeout::run_with_deadline;

use crate::error::{ArmatureError, BoxError, Result};
use crate::event::{Event, LoggerSlot};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::panic::Location;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

type Callback = Arc<dyn Fn(Context) -> BoxFuture<'static, std::result::Result<(), BoxError>> + Send + Sync>;

/// A pair of optional start/stop callbacks tied to a resource.
///
/// Either side may be omitted. The hook's name, derived from the call site
/// that created it, identifies it in events and errors.
///
/// ```rust,ignore
/// lifecycle.append(
///     Hook::new()
///         .on_start(|_ctx| async move { server.bind().await })
///         .on_stop(|_ctx| async move { server.drain().await }),
/// )?;
/// ```
pub struct Hook {
    pub(crate) name: String,
    pub(crate) on_start: Option<Callback>,
    pub(crate) on_stop: Option<Callback>,
}

impl Hook {
    /// An empty hook named after the calling location.
    #[track_caller]
    pub fn new() -> Self {
        let at = Location::caller();
        Self::named(format!("{}:{}", at.file(), at.line()))
    }

    /// An empty hook with an explicit name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            on_start: None,
            on_stop: None,
        }
    }

    pub fn on_start<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_start = Some(boxed(callback));
        self
    }

    pub fn on_stop<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.on_stop = Some(boxed(callback));
        self
    }
}

fn boxed<F, Fut>(callback: F) -> Callback
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(callback(ctx)) as BoxFuture<'static, _>)
}

/// Lifecycle participation for a whole resource type.
///
/// An alternative to building a [`Hook`] by hand: implement this and hand the
/// resource to [`Lifecycle::register`]. Both methods default to no-ops, so a
/// resource that only needs teardown implements `on_stop` alone.
#[async_trait]
pub trait StartStop: Send + Sync {
    async fn on_start(&self, _ctx: &Context) -> std::result::Result<(), BoxError> {
        Ok(())
    }

    async fn on_stop(&self, _ctx: &Context) -> std::result::Result<(), BoxError> {
        Ok(())
    }
}

struct State {
    hooks: Vec<Arc<Hook>>,
    /// Index just past the last hook whose start callback succeeded (or was
    /// absent). Stop walks `position - 1 ..= 0`.
    position: usize,
    started: bool,
}

/// The ordered collection of hooks and the controller that drives them.
///
/// A cheap handle: clone freely. Applications receive one from the container
/// as `Arc<Lifecycle>`; starting and stopping is the `App`'s job.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

struct Inner {
    logger: LoggerSlot,
    state: Mutex<State>,
}

impl Lifecycle {
    pub(crate) fn new(logger: LoggerSlot) -> Self {
        Self {
            inner: Arc::new(Inner {
                logger,
                state: Mutex::new(State {
                    hooks: Vec::new(),
                    position: 0,
                    started: false,
                }),
            }),
        }
    }

    /// Append a hook. Hooks start in append order and stop in reverse.
    ///
    /// Fails once start has begun; the hook list is fixed from that point on.
    pub fn append(&self, hook: Hook) -> Result<()> {
        let mut state = self.lock();
        if state.started {
            return Err(ArmatureError::AppendAfterStart);
        }
        state.hooks.push(Arc::new(hook));
        Ok(())
    }

    /// Append a hook delegating to a [`StartStop`] resource, named after the
    /// resource's type.
    pub fn register<T>(&self, resource: Arc<T>) -> Result<()>
    where
        T: StartStop + 'static,
    {
        let start = resource.clone();
        let stop = resource;
        self.append(
            Hook::named(std::any::type_name::<T>())
                .on_start(move |ctx| {
                    let start = start.clone();
                    async move { start.on_start(&ctx).await }
                })
                .on_stop(move |ctx| {
                    let stop = stop.clone();
                    async move { stop.on_stop(&ctx).await }
                }),
        )
    }

    /// Run pending start callbacks in append order.
    ///
    /// Stops at the first failure, leaving the high-water mark just below the
    /// failing hook so a subsequent [`Lifecycle::stop`] unwinds everything
    /// that actually started.
    pub(crate) async fn start(&self, ctx: &Context) -> Result<()> {
        let hooks = {
            let mut state = self.lock();
            state.started = true;
            state.hooks.clone()
        };

        loop {
            let index = self.lock().position;
            if index >= hooks.len() {
                return Ok(());
            }
            if let Some(err) = ctx.error() {
                return Err(err);
            }

            let hook = hooks[index].clone();
            if let Some(callback) = hook.on_start.clone() {
                self.log(Event::OnStartExecuting {
                    name: hook.name.clone(),
                });
                let began = Instant::now();
                let result = self.run_callback("OnStart", &hook.name, callback, ctx).await;
                self.log(Event::OnStartExecuted {
                    name: hook.name.clone(),
                    runtime: began.elapsed(),
                    err: result.as_ref().err().map(ToString::to_string),
                });
                result?;
            }
            self.lock().position = index + 1;
        }
    }

    /// Run stop callbacks for every started hook, in reverse order.
    ///
    /// Individual failures are accumulated rather than short-circuiting;
    /// remaining hooks still get their chance to clean up. Only the deadline
    /// expiring ends the walk early.
    pub(crate) async fn stop(&self, ctx: &Context) -> Result<()> {
        let (hooks, started) = {
            let state = self.lock();
            (state.hooks.clone(), state.position)
        };

        let mut errs = Vec::new();
        for index in (0..started).rev() {
            if let Some(err) = ctx.error() {
                errs.push(err);
                break;
            }
            self.lock().position = index;

            let hook = hooks[index].clone();
            let Some(callback) = hook.on_stop.clone() else {
                continue;
            };
            self.log(Event::OnStopExecuting {
                name: hook.name.clone(),
            });
            let began = Instant::now();
            let result = self.run_callback("OnStop", &hook.name, callback, ctx).await;
            self.log(Event::OnStopExecuted {
                name: hook.name.clone(),
                runtime: began.elapsed(),
                err: result.as_ref().err().map(ToString::to_string),
            });
            if let Err(err) = result {
                errs.push(err);
            }
        }

        self.lock().position = 0;
        match ArmatureError::combine(errs) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn run_callback(
        &self,
        kind: &'static str,
        name: &str,
        callback: Callback,
        ctx: &Context,
    ) -> Result<()> {
        let name = name.to_string();
        let hook_ctx = ctx.clone();
        run_with_deadline(ctx, async move {
            callback(hook_ctx).await.map_err(|err| ArmatureError::Hook {
                kind,
                name,
                source: err.into(),
            })
        })
        .await
    }

    fn log(&self, event: Event) {
        self.inner.logger.log_event(&event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("lifecycle state poisoned")
    }
}
