//! Error types for the container and the lifecycle engine.

use std::time::Duration;

use crate::lifecycle::Phase;

/// Errors produced during registration, resolution, build or a lifecycle
/// phase.
///
/// Each failure kind has a matching predicate (`is_not_found`, `is_cycle`,
/// …) that sees through the context-carrying wrappers (`Chain`, `Factory`,
/// `Module`, `Aggregate`), so callers can test the identity of a deeply
/// nested cause without unwrapping it by hand.
///
/// # Examples
///
/// ```rust
/// use keel::{Container, Error};
///
/// #[derive(Debug)]
/// struct Missing;
///
/// let c = Container::new();
/// let err = c.resolve::<Missing>().unwrap_err();
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No record exists for the key.
    #[error("no service registered for key `{key}`")]
    NotFound { key: String },

    /// More than one record exists for a single-value resolution.
    #[error("{count} services registered for key `{key}`; single-value resolution is ambiguous")]
    Ambiguous { key: String, count: usize },

    /// The resolution chain re-entered a key.
    #[error("circular dependency: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// A registration was refused because the key (or module name) is taken.
    #[error("duplicate registration for `{key}`")]
    Duplicate { key: String },

    /// A tagged field cannot be written by the target type.
    #[error("field `{field}` of `{type_name}` is not settable")]
    NotSettable {
        type_name: &'static str,
        field: String,
    },

    /// A resolved value is not assignable to the requested type.
    #[error("value for key `{key}` is not a `{expected}`")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },

    /// A mutation that is only legal before `build()` was attempted after it.
    #[error("container already built; {op} is no longer permitted")]
    AlreadyBuilt { op: &'static str },

    /// A registration is malformed (bad alias, bad injection tag, …).
    #[error("invalid provider for `{key}`: {reason}")]
    InvalidProvider { key: String, reason: String },

    /// A start or stop phase exhausted its global budget.
    #[error("{phase} phase exceeded its global budget of {budget:?}")]
    PhaseTimeout { phase: Phase, budget: Duration },

    /// A lifecycle hook returned an error or outlived its deadline.
    #[error("{phase} hook for `{key}` failed")]
    HookFailure {
        key: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },

    /// A factory returned an error that is not itself a container error.
    #[error("factory for `{key}` failed")]
    Factory {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// A module's `register` call failed.
    #[error("module `{name}` failed to register")]
    Module {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A resolution error annotated with the chain that led to it.
    #[error("resolving {chain}: {source}")]
    Chain {
        chain: String,
        #[source]
        source: Box<Error>,
    },

    /// Several independent failures collected from one operation.
    #[error("{}", fmt_aggregate(errors))]
    Aggregate { errors: Vec<Error> },
}

fn fmt_aggregate(errors: &[Error]) -> String {
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    format!("{} error(s): {}", errors.len(), rendered.join("; "))
}

impl Error {
    pub(crate) fn not_found(key: &crate::Key) -> Self {
        Error::NotFound {
            key: key.display_name().to_string(),
        }
    }

    pub(crate) fn ambiguous(key: &crate::Key, count: usize) -> Self {
        Error::Ambiguous {
            key: key.display_name().to_string(),
            count,
        }
    }

    pub(crate) fn cycle<'a>(chain: impl IntoIterator<Item = &'a crate::Key>) -> Self {
        Error::Cycle {
            chain: chain
                .into_iter()
                .map(|k| k.display_name().to_string())
                .collect(),
        }
    }

    pub(crate) fn duplicate(key: &crate::Key) -> Self {
        Error::Duplicate {
            key: key.display_name().to_string(),
        }
    }

    /// Walks the error tree, returning true if any node satisfies `pred`.
    fn walk(&self, pred: &dyn Fn(&Error) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Error::Chain { source, .. } => source.walk(pred),
            Error::Factory { source, .. }
            | Error::Module { source, .. }
            | Error::HookFailure { source, .. } => source
                .downcast_ref::<Error>()
                .is_some_and(|e| e.walk(pred)),
            Error::Aggregate { errors } => errors.iter().any(|e| e.walk(pred)),
            _ => false,
        }
    }

    /// True if the error is, or wraps, a [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.walk(&|e| matches!(e, Error::NotFound { .. }))
    }

    /// True if the error is, or wraps, an [`Error::Ambiguous`].
    pub fn is_ambiguous(&self) -> bool {
        self.walk(&|e| matches!(e, Error::Ambiguous { .. }))
    }

    /// True if the error is, or wraps, an [`Error::Cycle`].
    pub fn is_cycle(&self) -> bool {
        self.walk(&|e| matches!(e, Error::Cycle { .. }))
    }

    /// True if the error is, or wraps, an [`Error::Duplicate`].
    pub fn is_duplicate(&self) -> bool {
        self.walk(&|e| matches!(e, Error::Duplicate { .. }))
    }

    /// True if the error is, or wraps, an [`Error::NotSettable`].
    pub fn is_not_settable(&self) -> bool {
        self.walk(&|e| matches!(e, Error::NotSettable { .. }))
    }

    /// True if the error is, or wraps, an [`Error::TypeMismatch`].
    pub fn is_type_mismatch(&self) -> bool {
        self.walk(&|e| matches!(e, Error::TypeMismatch { .. }))
    }

    /// True if the error is, or wraps, an [`Error::AlreadyBuilt`].
    pub fn is_already_built(&self) -> bool {
        self.walk(&|e| matches!(e, Error::AlreadyBuilt { .. }))
    }

    /// True if the error is, or wraps, an [`Error::InvalidProvider`].
    pub fn is_invalid_provider(&self) -> bool {
        self.walk(&|e| matches!(e, Error::InvalidProvider { .. }))
    }

    /// True if the error is, or wraps, an [`Error::PhaseTimeout`].
    pub fn is_phase_timeout(&self) -> bool {
        self.walk(&|e| matches!(e, Error::PhaseTimeout { .. }))
    }

    /// True if the error is, or wraps, an [`Error::HookFailure`].
    pub fn is_hook_failure(&self) -> bool {
        self.walk(&|e| matches!(e, Error::HookFailure { .. }))
    }
}

/// Result type for container operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
