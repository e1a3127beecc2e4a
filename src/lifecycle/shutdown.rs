//! The shutdown coordinator: fans OS signals and programmatic shutdown
//! requests into per-subscriber channels.

use super::Context;
use crate::error::Result;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// What ended the application: an OS signal name (`"SIGINT"`, `"SIGTERM"`)
/// or `"user"` for a programmatic shutdown, plus the exit code to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownSignal {
    pub signal: &'static str,
    pub exit_code: i32,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.signal)
    }
}

struct Receivers {
    listener: Option<JoinHandle<()>>,
    done: Vec<mpsc::Sender<&'static str>>,
    wait: Vec<mpsc::Sender<ShutdownSignal>>,
    /// Most recent broadcast, replayed to late subscribers so they never
    /// block on a shutdown that already happened.
    last: Option<ShutdownSignal>,
}

/// Process-wide signal reception, one handle per application.
///
/// Listening starts explicitly through [`SignalReceivers::start`], never as a
/// side effect of option application.
pub(crate) struct SignalReceivers {
    inner: Mutex<Receivers>,
}

impl SignalReceivers {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Receivers {
                listener: None,
                done: Vec::new(),
                wait: Vec::new(),
                last: None,
            }),
        }
    }

    /// Begin relaying SIGINT and SIGTERM. Idempotent.
    pub(crate) fn start(this: &Arc<Self>) {
        let mut inner = this.lock();
        if inner.listener.is_some() {
            return;
        }
        let receivers = Arc::clone(this);
        inner.listener = Some(tokio::spawn(async move {
            loop {
                let signal = wait_for_os_signal().await;
                receivers.broadcast(ShutdownSignal {
                    signal,
                    exit_code: 0,
                });
            }
        }));
    }

    /// Detach from the OS signal source.
    pub(crate) fn stop(&self, _ctx: &Context) -> Result<()> {
        if let Some(listener) = self.lock().listener.take() {
            tracing::debug!("detaching signal listener");
            listener.abort();
        }
        Ok(())
    }

    /// Deliver `signal` to every live subscriber, retaining it for replay.
    ///
    /// Deliveries never block: a subscriber that hasn't drained its previous
    /// delivery misses this one.
    pub(crate) fn broadcast(&self, signal: ShutdownSignal) {
        let mut inner = self.lock();
        inner.last = Some(signal);
        inner.done.retain(|tx| deliver(tx, signal.signal));
        inner.wait.retain(|tx| deliver(tx, signal));
    }

    /// A fresh channel carrying only signal names. Prefer
    /// [`SignalReceivers::wait`], which also carries the exit code.
    pub(crate) fn done(&self) -> mpsc::Receiver<&'static str> {
        let (tx, rx) = mpsc::channel(1);
        let mut inner = self.lock();
        if let Some(last) = inner.last {
            let _ = tx.try_send(last.signal);
        }
        inner.done.push(tx);
        rx
    }

    /// A fresh channel carrying [`ShutdownSignal`]s.
    pub(crate) fn wait(&self) -> mpsc::Receiver<ShutdownSignal> {
        let (tx, rx) = mpsc::channel(1);
        let mut inner = self.lock();
        if let Some(last) = inner.last {
            let _ = tx.try_send(last);
        }
        inner.wait.push(tx);
        rx
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Receivers> {
        self.inner.lock().expect("signal receivers poisoned")
    }
}

/// Send without blocking; returns whether the subscriber is still live.
fn deliver<T: std::fmt::Debug>(tx: &mpsc::Sender<T>, value: T) -> bool {
    match tx.try_send(value) {
        Ok(()) => true,
        Err(TrySendError::Full(value)) => {
            tracing::warn!(?value, "subscriber channel full, dropping shutdown delivery");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

async fn wait_for_os_signal() -> &'static str {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// A capability injected into user code permitting programmatic shutdown.
///
/// ```rust,ignore
/// invoke(|shutdowner: Arc<Shutdowner>, lc: Arc<Lifecycle>| {
///     // ... once the work is finished:
///     shutdowner.shutdown([exit_code(0)]).ok();
/// })
/// ```
#[derive(Clone)]
pub struct Shutdowner {
    receivers: Arc<SignalReceivers>,
}

/// Modifiers accepted by [`Shutdowner::shutdown`].
#[derive(Debug, Clone, Copy)]
pub enum ShutdownOption {
    /// The process exit code [`crate::App::run`] reports for this shutdown.
    ExitCode(i32),
}

/// Shorthand for [`ShutdownOption::ExitCode`].
pub fn exit_code(code: i32) -> ShutdownOption {
    ShutdownOption::ExitCode(code)
}

impl Shutdowner {
    pub(crate) fn new(receivers: Arc<SignalReceivers>) -> Self {
        Self { receivers }
    }

    /// Broadcast a `"user"` shutdown to everything blocked on the
    /// application's shutdown channels.
    pub fn shutdown(&self, options: impl IntoIterator<Item = ShutdownOption>) -> Result<()> {
        let mut code = 0;
        for option in options {
            match option {
                ShutdownOption::ExitCode(c) => code = c,
            }
        }
        self.receivers.broadcast(ShutdownSignal {
            signal: "user",
            exit_code: code,
        });
        Ok(())
    }
}
