//! Deadline-carrying contexts handed to hook callbacks.

use crate::error::ArmatureError;
use std::future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, Instant};

/// A cancellation- and deadline-aware context.
///
/// Every hook callback receives a clone of the context driving the current
/// start or stop phase. Callbacks performing slow work should race it against
/// [`Context::done`] so a phase timeout hands control back promptly:
///
/// ```rust,ignore
/// hook.on_start(|ctx| async move {
///     tokio::select! {
///         conn = connect(&addr) => { conn?; Ok(()) }
///         _ = ctx.done() => Err("startup cancelled".into()),
///     }
/// })
/// ```
#[derive(Clone)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
}

/// Cancels the paired [`Context`] when invoked or dropped.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Context {
    /// A context with no deadline. Cancellable through the returned handle.
    pub fn new() -> (Self, CancelHandle) {
        Self::build(None)
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> (Self, CancelHandle) {
        Self::build(Some(Instant::now() + timeout))
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> (Self, CancelHandle) {
        Self::build(Some(deadline))
    }

    fn build(deadline: Option<Instant>) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (
            Self {
                deadline,
                cancelled: rx,
            },
            CancelHandle { tx },
        )
    }

    /// The instant this context expires, if it has a deadline at all.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why this context is done, or `None` while it is still live.
    pub fn error(&self) -> Option<ArmatureError> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Some(ArmatureError::DeadlineExceeded);
            }
        }
        if *self.cancelled.borrow() || self.cancelled.has_changed().is_err() {
            return Some(ArmatureError::Cancelled);
        }
        None
    }

    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Resolves once the deadline passes or the context is cancelled.
    pub async fn done(&self) {
        let expired = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => future::pending().await,
            }
        };
        let mut cancelled = self.cancelled.clone();
        let cancellation = async move {
            loop {
                if *cancelled.borrow() {
                    return;
                }
                // A closed channel means the handle was dropped, which
                // cancels the context.
                if cancelled.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::select! {
            _ = expired => {}
            _ = cancellation => {}
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
