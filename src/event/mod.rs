//! Runtime events and the event-logger surface.
//!
//! Everything the runtime does — providing a constructor, invoking a
//! function, executing a hook, starting, stopping — is reported as an
//! [`Event`] to the application's current [`EventLogger`]. The logger is
//! itself a user-constructible dependency (see the `with_logger` option), so
//! events emitted before the user logger exists are buffered and flushed once
//! it is built.

mod loggers;

pub use loggers::{ConsoleLogger, NopLogger, Spy, TracingLogger};
pub(crate) use loggers::BufferLogger;

use std::sync::{Arc, RwLock};
use std::time::Duration;

/// A single runtime event.
///
/// Error payloads are carried as rendered strings so events stay cheap to
/// clone and to record.
#[derive(Debug, Clone)]
pub enum Event {
    /// A constructor (or supplied value) was registered with the container.
    Provided {
        constructor: String,
        type_name: &'static str,
        module: Option<String>,
        err: Option<String>,
    },
    /// A provided type was replaced outright. Reserved: the runtime does not
    /// currently emit this variant.
    Replaced {
        type_name: &'static str,
        module: Option<String>,
    },
    /// A decorator was registered for an already-provided type.
    Decorated {
        decorator: String,
        type_name: &'static str,
        module: Option<String>,
        err: Option<String>,
    },
    /// An invocation is about to run.
    Invoking {
        function: String,
        module: Option<String>,
    },
    /// An invocation returned.
    Invoked {
        function: String,
        module: Option<String>,
        err: Option<String>,
    },
    OnStartExecuting {
        name: String,
    },
    OnStartExecuted {
        name: String,
        runtime: Duration,
        err: Option<String>,
    },
    OnStopExecuting {
        name: String,
    },
    OnStopExecuted {
        name: String,
        runtime: Duration,
        err: Option<String>,
    },
    /// Start finished, successfully or not.
    Started {
        err: Option<String>,
    },
    /// A shutdown signal was received and stop is about to begin.
    Stopping {
        signal: &'static str,
    },
    /// Stop finished, successfully or not.
    Stopped {
        err: Option<String>,
    },
    /// A start failure is being rolled back.
    RollingBack {
        start_err: String,
    },
    /// Rollback finished.
    RolledBack {
        err: Option<String>,
    },
    /// The user-supplied event logger was (or failed to be) installed.
    LoggerInitialized {
        constructor: String,
        err: Option<String>,
    },
}

impl Event {
    /// The variant name, handy for coarse assertions in tests.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Provided { .. } => "Provided",
            Event::Replaced { .. } => "Replaced",
            Event::Decorated { .. } => "Decorated",
            Event::Invoking { .. } => "Invoking",
            Event::Invoked { .. } => "Invoked",
            Event::OnStartExecuting { .. } => "OnStartExecuting",
            Event::OnStartExecuted { .. } => "OnStartExecuted",
            Event::OnStopExecuting { .. } => "OnStopExecuting",
            Event::OnStopExecuted { .. } => "OnStopExecuted",
            Event::Started { .. } => "Started",
            Event::Stopping { .. } => "Stopping",
            Event::Stopped { .. } => "Stopped",
            Event::RollingBack { .. } => "RollingBack",
            Event::RolledBack { .. } => "RolledBack",
            Event::LoggerInitialized { .. } => "LoggerInitialized",
        }
    }
}

/// Receives runtime events, one at a time.
///
/// Events are delivered sequentially, but the logger may be shared across
/// tasks, so implementations must be thread-safe.
pub trait EventLogger: Send + Sync {
    fn log_event(&self, event: &Event);
}

/// The application's single mutable logger binding.
///
/// Everything that emits events holds a clone of the slot and reads the
/// current logger on each event, so swapping in the user logger during
/// bootstrap is immediately visible to all prior holders.
#[derive(Clone)]
pub(crate) struct LoggerSlot {
    inner: Arc<RwLock<Arc<dyn EventLogger>>>,
}

impl LoggerSlot {
    pub(crate) fn new(logger: Arc<dyn EventLogger>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(logger)),
        }
    }

    pub(crate) fn log_event(&self, event: &Event) {
        let logger = { self.inner.read().expect("logger slot poisoned").clone() };
        logger.log_event(event);
    }

    /// Swap the binding. The bootstrap performs this exactly once per slot.
    pub(crate) fn swap(&self, logger: Arc<dyn EventLogger>) {
        *self.inner.write().expect("logger slot poisoned") = logger;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_swap_is_visible_to_existing_clones() {
        let spy = Arc::new(Spy::default());
        let slot = LoggerSlot::new(Arc::new(NopLogger));
        let held = slot.clone();

        slot.swap(spy.clone());
        held.log_event(&Event::Started { err: None });

        assert_eq!(spy.event_types(), vec!["Started"]);
    }
}
