//! # Armature
//!
//! An application runtime built around dependency injection, for long-lived
//! service processes.
//!
//! Programs are assembled from independent units that declare what they
//! *provide* (constructors producing typed values) and what they *invoke*
//! (functions consuming typed values). The runtime resolves the dependency
//! graph, wires instances in order, drives ordered startup and
//! reverse-ordered shutdown of the hooks registered along the way, and
//! reports everything it does through a pluggable event-logger surface.
//!
//! ## Features
//!
//! - **Dependency injection**: TypeId-keyed container with constructor
//!   closures, singleton values, and module-scoped privacy
//! - **Lifecycle hooks**: start hooks run in dependency order, stop hooks in
//!   reverse, both under configurable deadlines with rollback on failure
//! - **Graceful shutdown**: SIGINT/SIGTERM and programmatic shutdown fan
//!   into one exit-code-carrying channel
//! - **Modules**: group options into named, scoped units with their own
//!   event logger
//! - **Diagnostics**: a structured event stream, DOT renderings of the
//!   dependency graph, and graph-annotated errors
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature::prelude::*;
//!
//! struct Config { addr: String }
//! struct Server { addr: String }
//!
//! #[tokio::main]
//! async fn main() {
//!     App::new([
//!         provide(|| Config { addr: "0.0.0.0:8080".into() }),
//!         provide(|cfg: Arc<Config>| Server { addr: cfg.addr.clone() }),
//!         invoke(|server: Arc<Server>, lc: Arc<Lifecycle>| {
//!             let bind = server.clone();
//!             lc.append(
//!                 Hook::new()
//!                     .on_start(move |_ctx| { let s = bind.clone(); async move { s.bind().await } })
//!                     .on_stop(move |_ctx| { let s = server.clone(); async move { s.drain().await } }),
//!             )
//!             .expect("registered during initialization");
//!         }),
//!     ])
//!     .run()
//!     .await;
//! }
//! ```
//!
//! `App::new` wires the graph and executes invocations immediately; `run`
//! starts the hooks, blocks until a shutdown signal or a
//! [`Shutdowner::shutdown`] call, then stops the hooks in reverse.

pub mod di;
pub mod error;
pub mod event;
pub mod lifecycle;

mod app;
mod module;
mod options;

// Re-export core types.
pub use app::{validate_app, visualize_error, App, DEFAULT_TIMEOUT};
pub use di::DotGraph;
pub use error::{ArmatureError, BoxError, Result};
pub use event::{ConsoleLogger, Event, EventLogger, NopLogger, Spy, TracingLogger};
pub use lifecycle::{
    exit_code, CancelHandle, Context, Hook, Lifecycle, ShutdownOption, ShutdownSignal, Shutdowner,
    StartStop,
};
pub use module::Module;
pub use options::{
    decorate, error, error_hook, invoke, logger, module, nop_logger, options, provide,
    provide_private, recover_from_panics, start_timeout, stop_timeout, supply, try_decorate,
    try_invoke, try_provide, try_provide_private, try_with_logger, with_logger, AppOption,
    DynOption, ErrorHandler,
};

/// Prelude module for convenient imports
///
/// ```
/// use armature::prelude::*;
/// ```
pub mod prelude {
    pub use crate::app::{validate_app, App};
    pub use crate::di::DotGraph;
    pub use crate::error::{ArmatureError, BoxError, Result};
    pub use crate::event::{Event, EventLogger};
    pub use crate::lifecycle::{
        exit_code, Context, Hook, Lifecycle, ShutdownSignal, Shutdowner, StartStop,
    };
    pub use crate::options::{
        decorate, error_hook, invoke, module, nop_logger, options, provide, provide_private,
        start_timeout, stop_timeout, supply, try_decorate, try_invoke, try_provide, with_logger,
        AppOption, DynOption,
    };
    pub use async_trait::async_trait;
    pub use std::sync::Arc;
}
