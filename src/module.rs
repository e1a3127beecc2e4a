//! The module tree: hierarchical composition of options.
//!
//! Options mutate modules during the apply phase; no container interaction
//! happens until the commit passes run, in order: provides, decorates,
//! event-logger installation, invokes. Each module owns a container scope so
//! private provides stay within their subtree.

use crate::di::{
    Container, DecorateRegistration, DepInfo, InvokeCall, ProvideRegistration, ScopeId, ROOT_SCOPE,
};
use crate::error::{ArmatureError, Result};
use crate::event::{BufferLogger, ConsoleLogger, Event, EventLogger, LoggerSlot};
use crate::options::ErrorHandler;
use std::panic::Location;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct ProvideSpec {
    pub registration: ProvideRegistration,
    pub private: bool,
}

pub(crate) struct InvokeSpec {
    pub function: String,
    pub registered_at: &'static Location<'static>,
    pub deps: Vec<DepInfo>,
    pub call: InvokeCall,
}

pub(crate) struct LoggerCtor {
    pub constructor: String,
    pub registration: ProvideRegistration,
    pub resolve: Box<dyn Fn(&Container, ScopeId) -> Result<Arc<dyn EventLogger>> + Send + Sync>,
}

/// A node in the option tree. The root is created by `App::new`; children
/// come from the `module` option.
pub struct Module {
    pub(crate) name: String,
    pub(crate) trace: String,
    pub(crate) is_root: bool,

    pub(crate) provides: Vec<ProvideSpec>,
    pub(crate) decorates: Vec<DecorateRegistration>,
    pub(crate) invokes: Vec<InvokeSpec>,
    pub(crate) children: Vec<Module>,
    pub(crate) log_ctor: Option<LoggerCtor>,

    /// Errors recorded during apply, drained into the app's accumulated
    /// error before commit.
    pub(crate) errors: Vec<ArmatureError>,
    pub(crate) handlers: Vec<Arc<dyn ErrorHandler>>,

    // Root-only knobs; applying their options to a child records an error.
    pub(crate) start_timeout: Option<Duration>,
    pub(crate) stop_timeout: Option<Duration>,
    pub(crate) validate: bool,
    pub(crate) recover_from_panics: bool,
    /// Printer-backed fallback from the deprecated `logger` option.
    pub(crate) fallback: Option<Arc<dyn EventLogger>>,

    // Commit state.
    pub(crate) scope: ScopeId,
    pub(crate) slot: Option<LoggerSlot>,
    buffer: Option<Arc<BufferLogger>>,
}

impl Module {
    pub(crate) fn root(trace: String) -> Self {
        Self::node(String::new(), trace, true)
    }

    pub(crate) fn child(name: String, trace: String) -> Self {
        Self::node(name, trace, false)
    }

    fn node(name: String, trace: String, is_root: bool) -> Self {
        Self {
            name,
            trace,
            is_root,
            provides: Vec::new(),
            decorates: Vec::new(),
            invokes: Vec::new(),
            children: Vec::new(),
            log_ctor: None,
            errors: Vec::new(),
            handlers: Vec::new(),
            start_timeout: None,
            stop_timeout: None,
            validate: false,
            recover_from_panics: false,
            fallback: None,
            scope: ROOT_SCOPE,
            slot: None,
            buffer: None,
        }
    }

    /// The module's name; empty for the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The call site that created this module.
    pub fn trace(&self) -> &str {
        &self.trace
    }

    fn module_name(&self) -> Option<String> {
        if self.is_root {
            None
        } else {
            Some(self.name.clone())
        }
    }

    pub(crate) fn record_error(&mut self, err: ArmatureError) {
        self.errors.push(err);
    }

    /// Drain apply-phase errors, pre-order, into `slot`.
    pub(crate) fn drain_errors(&mut self, slot: &mut Option<ArmatureError>) {
        for err in std::mem::take(&mut self.errors) {
            ArmatureError::append(slot, err);
        }
        for child in &mut self.children {
            child.drain_errors(slot);
        }
    }

    /// Drain error handlers, pre-order.
    pub(crate) fn drain_handlers(&mut self, into: &mut Vec<Arc<dyn ErrorHandler>>) {
        into.append(&mut self.handlers);
        for child in &mut self.children {
            child.drain_handlers(into);
        }
    }

    /// Give every module a logger binding before any events are emitted.
    /// Modules that will construct their own logger buffer independently;
    /// the rest share the parent's binding.
    pub(crate) fn init_logging(&mut self, parent_slot: Option<&LoggerSlot>) {
        if self.is_root || self.log_ctor.is_some() {
            let buffer = Arc::new(BufferLogger::new());
            self.slot = Some(LoggerSlot::new(buffer.clone()));
            self.buffer = Some(buffer);
        } else {
            self.slot = parent_slot.cloned();
        }
        let slot = self.slot.clone();
        for child in &mut self.children {
            child.init_logging(slot.as_ref());
        }
    }

    /// Allocate container scopes, parent before child.
    pub(crate) fn assign_scopes(&mut self, container: &Container, parent: Option<ScopeId>) {
        self.scope = match parent {
            Some(parent) => container.child_scope(parent),
            None => ROOT_SCOPE,
        };
        for child in &mut self.children {
            child.assign_scopes(container, Some(self.scope));
        }
    }

    /// Register every provide in the subtree, children first.
    pub(crate) fn provide_all(&mut self, container: &Container, err: &mut Option<ArmatureError>) {
        for child in &mut self.children {
            child.provide_all(container, err);
        }
        for spec in std::mem::take(&mut self.provides) {
            let constructor = spec.registration.constructor.clone();
            let type_name = spec.registration.type_name;
            let result = container.provide(self.scope, spec.private, spec.registration);
            self.log(Event::Provided {
                constructor,
                type_name,
                module: self.module_name(),
                err: result.as_ref().err().map(ToString::to_string),
            });
            if let Err(e) = result {
                ArmatureError::append(err, e);
            }
        }
    }

    /// Register every decorator in the subtree, children first. Runs before
    /// any invokes so decorated values are what invocations observe.
    pub(crate) fn decorate_all(&mut self, container: &Container, err: &mut Option<ArmatureError>) {
        for child in &mut self.children {
            child.decorate_all(container, err);
        }
        for reg in std::mem::take(&mut self.decorates) {
            let decorator = reg.decorator.clone();
            let type_name = reg.type_name;
            let result = container.decorate(self.scope, reg);
            self.log(Event::Decorated {
                decorator,
                type_name,
                module: self.module_name(),
                err: result.as_ref().err().map(ToString::to_string),
            });
            if let Err(e) = result {
                ArmatureError::append(err, e);
            }
        }
    }

    /// Build user event loggers and flush the buffered events.
    ///
    /// A failed construction falls back deterministically — the root prefers
    /// a printer-backed logger from the deprecated `logger` option over the
    /// stderr default, children fall back to the parent's logger — and is
    /// reported through `LoggerInitialized` rather than failing the app.
    pub(crate) fn install_event_loggers(
        &mut self,
        container: &Container,
        parent_logger: Option<Arc<dyn EventLogger>>,
    ) {
        let fallback = |module: &Module| -> Arc<dyn EventLogger> {
            if let Some(printer) = &module.fallback {
                return printer.clone();
            }
            match &parent_logger {
                Some(parent) => parent.clone(),
                None => Arc::new(ConsoleLogger::new()),
            }
        };

        let mine: Arc<dyn EventLogger> = match self.log_ctor.take() {
            Some(ctor) if container.dry_run() => {
                // Validation never executes constructors; stay on the
                // fallback without reporting a failure.
                let _ = container.provide(self.scope, true, ctor.registration);
                let logger = fallback(self);
                self.bind(logger.clone());
                logger
            }
            Some(ctor) => {
                let built = container
                    .provide(self.scope, true, ctor.registration)
                    .and_then(|()| (ctor.resolve)(container, self.scope));
                match built {
                    Ok(user) => {
                        self.bind(user.clone());
                        user.log_event(&Event::LoggerInitialized {
                            constructor: ctor.constructor,
                            err: None,
                        });
                        user
                    }
                    Err(err) => {
                        let logger = fallback(self);
                        self.bind(logger.clone());
                        logger.log_event(&Event::LoggerInitialized {
                            constructor: ctor.constructor,
                            err: Some(err.to_string()),
                        });
                        logger
                    }
                }
            }
            None if self.is_root => {
                let logger = fallback(self);
                self.bind(logger.clone());
                logger
            }
            None => parent_logger.clone().expect("non-root module has a parent logger"),
        };

        for child in &mut self.children {
            child.install_event_loggers(container, Some(mine.clone()));
        }
    }

    /// Swap the module's binding to `logger` and flush buffered events.
    fn bind(&mut self, logger: Arc<dyn EventLogger>) {
        if let Some(slot) = &self.slot {
            slot.swap(logger.clone());
        }
        if let Some(buffer) = self.buffer.take() {
            buffer.connect(logger);
        }
    }

    /// Execute invokes, children before parent, declaration order within a
    /// module. The first failure short-circuits the rest of initialization;
    /// hooks registered by constructors that already ran stay registered.
    pub(crate) fn invoke_all(&mut self, container: &Container) -> Result<()> {
        for child in &mut self.children {
            child.invoke_all(container)?;
        }
        for spec in std::mem::take(&mut self.invokes) {
            self.log(Event::Invoking {
                function: spec.function.clone(),
                module: self.module_name(),
            });
            let result = container.invoke(
                self.scope,
                &spec.function,
                spec.registered_at,
                &spec.deps,
                &spec.call,
            );
            self.log(Event::Invoked {
                function: spec.function,
                module: self.module_name(),
                err: result.as_ref().err().map(ToString::to_string),
            });
            result?;
        }
        Ok(())
    }

    pub(crate) fn log(&self, event: Event) {
        self.slot
            .as_ref()
            .expect("module logging initialized before commit")
            .log_event(&event);
    }
}
