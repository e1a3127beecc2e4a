//! Bundled [`EventLogger`] implementations.

use super::{Event, EventLogger};
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Writes human-readable lines to a writer, standard error by default.
///
/// This is the logger every application starts with; it stays in place unless
/// a `with_logger` constructor replaces it during bootstrap.
pub struct ConsoleLogger {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleLogger {
    pub fn new() -> Self {
        Self::with_writer(io::stderr())
    }

    pub fn with_writer(w: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(w)),
        }
    }

    fn line(&self, msg: &str) {
        let mut out = self.out.lock().expect("console logger poisoned");
        let _ = writeln!(out, "[armature] {msg}");
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLogger for ConsoleLogger {
    fn log_event(&self, event: &Event) {
        match event {
            Event::Provided {
                constructor,
                type_name,
                err,
                ..
            } => match err {
                Some(err) => self.line(&format!("PROVIDE {type_name} <= {constructor}: {err}")),
                None => self.line(&format!("PROVIDE {type_name} <= {constructor}")),
            },
            Event::Replaced { type_name, .. } => self.line(&format!("REPLACE {type_name}")),
            Event::Decorated {
                decorator,
                type_name,
                err,
                ..
            } => match err {
                Some(err) => self.line(&format!("DECORATE {type_name} <= {decorator}: {err}")),
                None => self.line(&format!("DECORATE {type_name} <= {decorator}")),
            },
            Event::Invoking { function, .. } => self.line(&format!("INVOKE {function}")),
            Event::Invoked { function, err, .. } => {
                if let Some(err) = err {
                    self.line(&format!("INVOKE {function} failed: {err}"));
                }
            }
            Event::OnStartExecuting { name } => self.line(&format!("ON START {name} executing")),
            Event::OnStartExecuted { name, runtime, err } => match err {
                Some(err) => self.line(&format!("ON START {name} failed in {runtime:?}: {err}")),
                None => self.line(&format!("ON START {name} ran in {runtime:?}")),
            },
            Event::OnStopExecuting { name } => self.line(&format!("ON STOP {name} executing")),
            Event::OnStopExecuted { name, runtime, err } => match err {
                Some(err) => self.line(&format!("ON STOP {name} failed in {runtime:?}: {err}")),
                None => self.line(&format!("ON STOP {name} ran in {runtime:?}")),
            },
            Event::Started { err } => match err {
                Some(err) => self.line(&format!("ERROR failed to start: {err}")),
                None => self.line("RUNNING"),
            },
            Event::Stopping { signal } => self.line(&format!("{signal} received, stopping")),
            Event::Stopped { err } => {
                if let Some(err) = err {
                    self.line(&format!("ERROR failed to stop cleanly: {err}"));
                }
            }
            Event::RollingBack { start_err } => {
                self.line(&format!("ERROR start failed, rolling back: {start_err}"));
            }
            Event::RolledBack { err } => {
                if let Some(err) = err {
                    self.line(&format!("ERROR couldn't roll back cleanly: {err}"));
                }
            }
            Event::LoggerInitialized { constructor, err } => match err {
                Some(err) => self.line(&format!(
                    "LOGGER failed to construct {constructor}, falling back: {err}"
                )),
                None => self.line(&format!("LOGGER initialized from {constructor}")),
            },
        }
    }
}

/// Discards every event.
pub struct NopLogger;

impl EventLogger for NopLogger {
    fn log_event(&self, _event: &Event) {}
}

/// Forwards events to the `tracing` ecosystem as structured records.
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn log_event(&self, event: &Event) {
        match event {
            Event::Provided {
                constructor,
                type_name,
                err: Some(err),
                ..
            } => tracing::error!(%constructor, %type_name, error = %err, "provide failed"),
            Event::Provided {
                constructor,
                type_name,
                ..
            } => tracing::debug!(%constructor, %type_name, "provided"),
            Event::Replaced { type_name, .. } => tracing::debug!(%type_name, "replaced"),
            Event::Decorated {
                decorator,
                type_name,
                err: Some(err),
                ..
            } => tracing::error!(%decorator, %type_name, error = %err, "decorate failed"),
            Event::Decorated {
                decorator,
                type_name,
                ..
            } => tracing::debug!(%decorator, %type_name, "decorated"),
            Event::Invoking { function, .. } => tracing::debug!(%function, "invoking"),
            Event::Invoked {
                function,
                err: Some(err),
                ..
            } => tracing::error!(%function, error = %err, "invocation failed"),
            Event::Invoked { function, .. } => tracing::debug!(%function, "invoked"),
            Event::OnStartExecuting { name } => tracing::debug!(%name, "executing start hook"),
            Event::OnStartExecuted {
                name,
                runtime,
                err: Some(err),
            } => tracing::error!(%name, ?runtime, error = %err, "start hook failed"),
            Event::OnStartExecuted { name, runtime, .. } => {
                tracing::debug!(%name, ?runtime, "start hook ran");
            }
            Event::OnStopExecuting { name } => tracing::debug!(%name, "executing stop hook"),
            Event::OnStopExecuted {
                name,
                runtime,
                err: Some(err),
            } => tracing::error!(%name, ?runtime, error = %err, "stop hook failed"),
            Event::OnStopExecuted { name, runtime, .. } => {
                tracing::debug!(%name, ?runtime, "stop hook ran");
            }
            Event::Started { err: Some(err) } => tracing::error!(error = %err, "failed to start"),
            Event::Started { .. } => tracing::info!("started"),
            Event::Stopping { signal } => tracing::info!(%signal, "stopping"),
            Event::Stopped { err: Some(err) } => {
                tracing::error!(error = %err, "failed to stop cleanly");
            }
            Event::Stopped { .. } => tracing::info!("stopped"),
            Event::RollingBack { start_err } => {
                tracing::error!(error = %start_err, "start failed, rolling back");
            }
            Event::RolledBack { err: Some(err) } => {
                tracing::error!(error = %err, "rollback failed");
            }
            Event::RolledBack { .. } => tracing::info!("rolled back"),
            Event::LoggerInitialized {
                constructor,
                err: Some(err),
            } => tracing::error!(%constructor, error = %err, "logger construction failed"),
            Event::LoggerInitialized { constructor, .. } => {
                tracing::debug!(%constructor, "logger initialized");
            }
        }
    }
}

/// Captures events in memory. Useful in tests asserting on the event stream.
#[derive(Default)]
pub struct Spy {
    events: Mutex<Vec<Event>>,
}

impl Spy {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured events, in order.
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("spy poisoned").clone()
    }

    /// Variant names of all captured events, in order.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .expect("spy poisoned")
            .iter()
            .map(Event::name)
            .collect()
    }

    /// Discard everything captured so far.
    pub fn reset(&self) {
        self.events.lock().expect("spy poisoned").clear();
    }
}

impl EventLogger for Spy {
    fn log_event(&self, event: &Event) {
        self.events.lock().expect("spy poisoned").push(event.clone());
    }
}

/// Buffers events until a real logger is connected, then replays them in
/// order and forwards everything that follows. Each module that constructs
/// its own logger owns one of these during bootstrap.
pub(crate) struct BufferLogger {
    inner: Mutex<BufferState>,
}

struct BufferState {
    buffered: Vec<Event>,
    sink: Option<Arc<dyn EventLogger>>,
}

impl BufferLogger {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(BufferState {
                buffered: Vec::new(),
                sink: None,
            }),
        }
    }

    /// Flush the buffer into `sink` and forward all future events to it.
    pub(crate) fn connect(&self, sink: Arc<dyn EventLogger>) {
        let drained = {
            let mut state = self.inner.lock().expect("buffer logger poisoned");
            state.sink = Some(sink.clone());
            std::mem::take(&mut state.buffered)
        };
        for event in &drained {
            sink.log_event(event);
        }
    }
}

impl EventLogger for BufferLogger {
    fn log_event(&self, event: &Event) {
        let sink = {
            let mut state = self.inner.lock().expect("buffer logger poisoned");
            match &state.sink {
                Some(sink) => sink.clone(),
                None => {
                    state.buffered.push(event.clone());
                    return;
                }
            }
        };
        sink.log_event(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spy_records_in_order() {
        let spy = Spy::new();
        spy.log_event(&Event::Started { err: None });
        spy.log_event(&Event::Stopped { err: None });
        assert_eq!(spy.event_types(), vec!["Started", "Stopped"]);

        spy.reset();
        assert!(spy.events().is_empty());
    }

    #[test]
    fn buffer_replays_on_connect_then_forwards() {
        let buffer = BufferLogger::new();
        buffer.log_event(&Event::Started { err: None });
        buffer.log_event(&Event::Stopping { signal: "user" });

        let spy = Arc::new(Spy::new());
        buffer.connect(spy.clone());
        assert_eq!(spy.event_types(), vec!["Started", "Stopping"]);

        buffer.log_event(&Event::Stopped { err: None });
        assert_eq!(spy.event_types(), vec!["Started", "Stopping", "Stopped"]);
    }

    #[test]
    fn console_logger_writes_lines() {
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);
        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let buf = Arc::new(Mutex::new(Vec::new()));
        let logger = ConsoleLogger::with_writer(SharedBuf(buf.clone()));
        logger.log_event(&Event::Provided {
            constructor: "new_server".to_string(),
            type_name: "Server",
            module: None,
            err: None,
        });

        let written = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "[armature] PROVIDE Server <= new_server\n");
    }
}
