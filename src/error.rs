use std::sync::Arc;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArmatureError>;

/// Boxed error returned by user-supplied hook callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared error source. Sources are reference-counted so the accumulated
/// initialization error can be handed out by `App::err`, returned again from
/// `App::start`, and forwarded to error handlers without re-wrapping.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Error)]
pub enum ArmatureError {
    #[error("{option} can only be passed to the top-level application, not to a module")]
    TopLevelOnly { option: &'static str },

    #[error("{type_name} is already provided by {existing}")]
    DuplicateProvide {
        type_name: &'static str,
        existing: String,
    },

    #[error("missing dependency {type_name}, required by {requester}")]
    MissingDependency {
        type_name: &'static str,
        requester: String,
    },

    #[error("dependency cycle detected: {path}")]
    DependencyCycle { path: String },

    #[error("constructor {constructor} failed: {source}")]
    Constructor {
        constructor: String,
        #[source]
        source: SharedError,
    },

    #[error("invocation {function} failed: {source}")]
    Invoke {
        function: String,
        #[source]
        source: SharedError,
    },

    #[error("{function} panicked: {message} (registered at {registered_at})")]
    Panicked {
        function: String,
        message: String,
        registered_at: String,
    },

    #[error("{kind} hook {name} failed: {source}")]
    Hook {
        /// `"OnStart"` or `"OnStop"`.
        kind: &'static str,
        name: String,
        #[source]
        source: SharedError,
    },

    /// The worker running a hook callback terminated without producing a
    /// result (for example, the task was aborted out from under it).
    #[error("hook callback exited without returning")]
    CallbackExited,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("context cancelled")]
    Cancelled,

    #[error("application already started")]
    AlreadyStarted,

    #[error("lifecycle has already started; hooks can no longer be appended")]
    AppendAfterStart,

    #[error("the dependency graph is frozen; no further registrations are accepted")]
    Frozen,

    /// An arbitrary error registered through the `error` option.
    #[error("{0}")]
    Custom(SharedError),

    /// An error carrying a DOT rendering of the dependency graph. The
    /// rendering is retrievable through [`ArmatureError::graph`].
    #[error("{inner}")]
    WithGraph {
        graph: String,
        #[source]
        inner: Box<ArmatureError>,
    },

    /// Several errors from a single phase, all retained.
    #[error("{}", join(.0))]
    Aggregate(Vec<ArmatureError>),
}

impl ArmatureError {
    /// Wrap an arbitrary error value.
    pub fn custom(err: impl Into<BoxError>) -> Self {
        Self::Custom(Arc::from(err.into()))
    }

    /// Collapse a list of errors: `None` when empty, the error itself when
    /// there is exactly one, an [`ArmatureError::Aggregate`] otherwise.
    /// Nested aggregates are flattened so no error is double-wrapped.
    pub fn combine(errs: Vec<ArmatureError>) -> Option<ArmatureError> {
        let mut flat = Vec::with_capacity(errs.len());
        for err in errs {
            match err {
                ArmatureError::Aggregate(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => Some(flat.into_iter().next().expect("length checked")),
            _ => Some(ArmatureError::Aggregate(flat)),
        }
    }

    /// Append `err` onto `slot`, aggregating when the slot is occupied.
    pub(crate) fn append(slot: &mut Option<ArmatureError>, err: ArmatureError) {
        let combined = match slot.take() {
            Some(existing) => Self::combine(vec![existing, err]).expect("two errors combined"),
            None => err,
        };
        *slot = Some(combined);
    }

    /// Attach a DOT-language rendering of the dependency graph.
    pub fn with_graph(self, graph: String) -> Self {
        ArmatureError::WithGraph {
            graph,
            inner: Box::new(self),
        }
    }

    /// The DOT-language graph attached to this error, if any.
    pub fn graph(&self) -> Option<&str> {
        match self {
            ArmatureError::WithGraph { graph, .. } => Some(graph),
            _ => None,
        }
    }
}

fn join(errs: &[ArmatureError]) -> String {
    errs.iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
