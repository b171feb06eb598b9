// Engine error types
//
// Transport failures are never thrown through the dispatch path. Each variant
// maps to an explicit policy that the engine applies at the call site.

use crate::facade::RequestKey;
use crate::spec::SpecId;
use crate::types::{ObjectId, ThreadId};
use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("not supported by the target VM: {0}")]
    Unsupported(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("VM disconnected")]
    VmDisconnected,

    #[error("object {0:#x} has been collected")]
    ObjectCollected(ObjectId),

    #[error("thread {0:#x} is no longer alive")]
    ThreadDead(ThreadId),

    #[error("unknown request {0}")]
    UnknownRequest(RequestKey),

    #[error("transport error: {0}")]
    Other(String),
}

/// What the engine does when a transport call fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Best-effort operation, drop the error
    Ignore,
    /// Mark the breakpoint invalid with the error text as reason
    MarkInvalid,
    /// Let the event go (resume) and abandon the in-progress mutation
    LetGo,
    /// Report to the caller
    Propagate,
}

impl TransportError {
    pub fn policy(&self) -> ErrorPolicy {
        match self {
            TransportError::Unsupported(_) | TransportError::InvalidRequest(_) => {
                ErrorPolicy::MarkInvalid
            }
            TransportError::VmDisconnected
            | TransportError::ObjectCollected(_)
            | TransportError::ThreadDead(_) => ErrorPolicy::LetGo,
            TransportError::UnknownRequest(_) => ErrorPolicy::Ignore,
            TransportError::Other(_) => ErrorPolicy::Propagate,
        }
    }
}

/// Failure to compile or evaluate a breakpoint condition
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("cannot compile `{expression}`: {message}")]
    Compile { expression: String, message: String },

    #[error("evaluation failed: {0}")]
    Failed(String),

    #[error("condition is not a boolean: {0}")]
    NotBoolean(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("breakpoint {0} is not registered")]
    UnknownBreakpoint(SpecId),

    #[error("session {0} is disconnected")]
    SessionDisconnected(String),

    #[error("registry worker has shut down")]
    WorkerGone,
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid breakpoint document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported breakpoint document version {0}")]
    Version(u32),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}
