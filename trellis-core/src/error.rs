//! Error types for the Trellis runtime.
//!
//! Errors are grouped by the subsystem that raises them. Everything funnels
//! into [`TrellisError`], which is what the public entry points return.
//!
//! Propagation is deliberately plain: a failing render or setup function
//! surfaces from `mount` (or from the patch that invoked it) and the runtime
//! performs no retry and no rollback of partially applied DOM work.

use thiserror::Error;

/// Errors raised by the reactivity engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactivityError {
    /// A write was attempted through a readonly wrapper.
    #[error("cannot set key `{key}`: target is readonly")]
    ReadonlyWrite { key: String },

    /// A computed cell without a setter was assigned to.
    #[error("computed value is readonly")]
    ComputedReadonly,

    /// A queued job kept re-queueing itself within a single flush.
    #[error("maximum recursive updates exceeded ({limit}) for job {job}")]
    RecursionLimit { job: u64, limit: usize },

    /// A write would grow a list past [`MAX_LIST_LEN`](crate::reactive::MAX_LIST_LEN).
    #[error("list length {len} exceeds the maximum of {max}")]
    LengthOutOfRange { len: usize, max: usize },

    /// The key does not address anything on this kind of object.
    #[error("key `{key}` is not valid for this object")]
    InvalidKey { key: String },
}

/// Errors raised while reconciling virtual trees against the host.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconciliationError {
    /// A mounted vnode was expected to carry a live host node.
    #[error("{kind} vnode has no host node attached")]
    MissingElement { kind: &'static str },

    /// A host node that should be attached has no parent.
    #[error("host node {node} has no parent")]
    MissingParent { node: u32 },

    /// A component vnode reached the patcher without an instance.
    #[error("component vnode has no instance")]
    MissingInstance,
}

/// Errors raised by the application shell.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MountError {
    #[error("mount target `{selector}` not found")]
    TargetNotFound { selector: String },

    #[error("app is already mounted")]
    AlreadyMounted,

    #[error("app is not mounted")]
    NotMounted,
}

/// Top-level error type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrellisError {
    #[error(transparent)]
    Reactivity(#[from] ReactivityError),

    #[error(transparent)]
    Reconciliation(#[from] ReconciliationError),

    #[error(transparent)]
    Mount(#[from] MountError),

    /// Raised by user code inside a render or setup function.
    #[error("render failed in {component}: {message}")]
    Render { component: String, message: String },
}

impl TrellisError {
    /// Build a render failure from inside a render or setup function.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            component: "<anonymous>".to_string(),
            message: message.into(),
        }
    }

    /// Attach a component name to a render failure that does not carry one.
    pub(crate) fn in_component(self, name: &str) -> Self {
        match self {
            Self::Render { component, message } if component == "<anonymous>" => Self::Render {
                component: name.to_string(),
                message,
            },
            other => other,
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = TrellisError> = std::result::Result<T, E>;
