// Remote request facade
//
// The capability the engine needs from a debugger transport: create, filter,
// enable and delete event requests, and answer the type introspection
// questions that resolution depends on. Requests are built locally and only
// become live on `enable`, matching how JDWP's EventRequest.Set takes every
// modifier at once.

use crate::error::TransportResult;
use crate::event::EventKind;
use crate::spec::SuspendPolicy;
use crate::types::{
    Capabilities, FieldId, FieldInfo, LoadedType, Location, MethodId, MethodInfo, ObjectId,
    ReferenceTypeId, StackFrame, ThreadId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transport-assigned handle of one low-level event request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey(pub u64);

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req#{}", self.0)
    }
}

/// What a low-level request watches
#[derive(Debug, Clone, PartialEq)]
pub enum RequestTarget {
    Breakpoint(Location),
    MethodEntry,
    MethodExit,
    FieldAccess {
        type_id: ReferenceTypeId,
        field_id: FieldId,
    },
    FieldModification {
        type_id: ReferenceTypeId,
        field_id: FieldId,
    },
    Exception {
        /// `None` watches every exception type
        type_id: Option<ReferenceTypeId>,
        caught: bool,
        uncaught: bool,
    },
    ClassPrepare,
    ClassUnload,
    ThreadStart,
    ThreadDeath,
}

impl RequestTarget {
    pub fn kind(&self) -> EventKind {
        match self {
            RequestTarget::Breakpoint(_) => EventKind::Breakpoint,
            RequestTarget::MethodEntry => EventKind::MethodEntry,
            RequestTarget::MethodExit => EventKind::MethodExit,
            RequestTarget::FieldAccess { .. } => EventKind::FieldAccess,
            RequestTarget::FieldModification { .. } => EventKind::FieldModification,
            RequestTarget::Exception { .. } => EventKind::Exception,
            RequestTarget::ClassPrepare => EventKind::ClassPrepare,
            RequestTarget::ClassUnload => EventKind::ClassUnload,
            RequestTarget::ThreadStart => EventKind::ThreadStart,
            RequestTarget::ThreadDeath => EventKind::ThreadDeath,
        }
    }

    /// JDWP only accepts InstanceOnly on events that have a `this` object
    pub fn supports_instance_filter(&self) -> bool {
        matches!(
            self,
            RequestTarget::Breakpoint(_)
                | RequestTarget::MethodEntry
                | RequestTarget::MethodExit
                | RequestTarget::FieldAccess { .. }
                | RequestTarget::FieldModification { .. }
                | RequestTarget::Exception { .. }
        )
    }

    pub fn supports_thread_filter(&self) -> bool {
        !matches!(self, RequestTarget::ClassUnload)
    }
}

/// Narrowing applied to a request before it is enabled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestFilter {
    ClassMatch(String),
    ClassExclude(String),
    ClassOnly(ReferenceTypeId),
    Thread(ThreadId),
    Instance(ObjectId),
}

/// A single-step request owned by the stepping subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepRequest {
    pub key: RequestKey,
    pub thread: ThreadId,
}

#[async_trait]
pub trait RemoteRequestFacade: Send + Sync {
    /// Create a disabled request
    async fn create_request(&self, target: RequestTarget) -> TransportResult<RequestKey>;

    async fn add_filter(&self, request: RequestKey, filter: RequestFilter) -> TransportResult<()>;

    /// Native hit-count filter: report the event once, on the `count`th occurrence
    async fn set_count_filter(&self, request: RequestKey, count: i32) -> TransportResult<()>;

    async fn set_suspend_policy(
        &self,
        request: RequestKey,
        policy: SuspendPolicy,
    ) -> TransportResult<()>;

    async fn enable(&self, request: RequestKey) -> TransportResult<()>;

    async fn disable(&self, request: RequestKey) -> TransportResult<()>;

    async fn delete(&self, request: RequestKey) -> TransportResult<()>;

    /// Loaded types whose name matches a class pattern
    async fn loaded_classes(&self, pattern: &str) -> TransportResult<Vec<LoadedType>>;

    /// Locations of `line` in a type, at most one per method (the lowest index)
    async fn line_locations(
        &self,
        type_id: ReferenceTypeId,
        line: i32,
    ) -> TransportResult<Vec<Location>>;

    /// Every line of a type that has executable code, sorted
    async fn line_numbers(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<i32>>;

    async fn methods(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<MethodInfo>>;

    /// First executable location of a method, if it has code
    async fn method_location(
        &self,
        type_id: ReferenceTypeId,
        method_id: MethodId,
    ) -> TransportResult<Option<Location>>;

    async fn fields(&self, type_id: ReferenceTypeId) -> TransportResult<Vec<FieldInfo>>;

    async fn capabilities(&self) -> TransportResult<Capabilities>;

    async fn is_thread_alive(&self, thread: ThreadId) -> TransportResult<bool>;

    async fn top_frame(&self, thread: ThreadId) -> TransportResult<StackFrame>;

    /// Currently active single-step requests
    async fn step_requests(&self) -> TransportResult<Vec<StepRequest>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_filter_support() {
        assert!(RequestTarget::MethodEntry.supports_instance_filter());
        assert!(!RequestTarget::ClassPrepare.supports_instance_filter());
        assert!(!RequestTarget::ThreadStart.supports_instance_filter());
        assert!(!RequestTarget::ClassUnload.supports_thread_filter());
    }
}
