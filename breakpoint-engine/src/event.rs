// Events and notifications
//
// The transport hands the engine immutable `Event` values and gets a
// `Decision` back. Engines report to collaborators through `BreakpointListener`.

use crate::error::EvaluationError;
use crate::facade::RequestKey;
use crate::spec::SpecId;
use crate::types::{FieldId, LoadedType, Location, ObjectId, ReferenceTypeId, ThreadId, Value};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Breakpoint,
    MethodEntry,
    MethodExit,
    FieldAccess,
    FieldModification,
    Exception,
    ClassPrepare,
    ClassUnload,
    ThreadStart,
    ThreadDeath,
    SingleStep,
}

/// One protocol event, routed to the engine that owns `request`
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub request: RequestKey,
    pub thread: Option<ThreadId>,
    pub location: Option<Location>,
    pub details: EventDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventDetails {
    Breakpoint,
    MethodEntry,
    MethodExit {
        return_value: Option<Value>,
    },
    FieldAccess {
        type_id: ReferenceTypeId,
        field_id: FieldId,
        object: Option<ObjectId>,
        value: Option<Value>,
    },
    FieldModification {
        type_id: ReferenceTypeId,
        field_id: FieldId,
        object: Option<ObjectId>,
        value_to_be: Value,
    },
    Exception {
        exception: ObjectId,
        exception_type: Option<String>,
        catch_location: Option<Location>,
    },
    ClassPrepare {
        loaded: LoadedType,
    },
    ClassUnload {
        name: String,
    },
    ThreadStart,
    ThreadDeath,
    SingleStep,
}

impl EventDetails {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetails::Breakpoint => EventKind::Breakpoint,
            EventDetails::MethodEntry => EventKind::MethodEntry,
            EventDetails::MethodExit { .. } => EventKind::MethodExit,
            EventDetails::FieldAccess { .. } => EventKind::FieldAccess,
            EventDetails::FieldModification { .. } => EventKind::FieldModification,
            EventDetails::Exception { .. } => EventKind::Exception,
            EventDetails::ClassPrepare { .. } => EventKind::ClassPrepare,
            EventDetails::ClassUnload { .. } => EventKind::ClassUnload,
            EventDetails::ThreadStart => EventKind::ThreadStart,
            EventDetails::ThreadDeath => EventKind::ThreadDeath,
            EventDetails::SingleStep => EventKind::SingleStep,
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        self.details.kind()
    }
}

/// Whether the thread(s) stopped by an event should be resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Resume,
    Suspend,
}

impl Decision {
    pub fn resumes(self) -> bool {
        self == Decision::Resume
    }

    /// Combine the decisions of several events delivered in one composite set
    pub fn merge(self, other: Decision) -> Decision {
        if self == Decision::Suspend || other == Decision::Suspend {
            Decision::Suspend
        } else {
            Decision::Resume
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Validity {
    #[default]
    Unknown,
    Valid,
    Invalid,
}

/// The value a hit is "about": thrown exception, field value, return value
#[derive(Debug, Clone, PartialEq)]
pub struct HitVariable {
    pub name: &'static str,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct BreakpointHit {
    pub breakpoint: SpecId,
    pub session: String,
    pub kind: EventKind,
    /// False when a condition evaluation failed and the hit stops anyway
    pub condition_result: bool,
    pub condition_error: Option<EvaluationError>,
    pub thread: Option<ThreadId>,
    pub location: Option<Location>,
    pub declaring_type: Option<String>,
    pub variable: Option<HitVariable>,
    /// Rendered print text
    pub message: Option<String>,
    pub hit_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitCountChanged {
    pub breakpoint: SpecId,
    pub hit_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityChanged {
    pub breakpoint: SpecId,
    pub validity: Validity,
    pub reason: Option<String>,
}

/// A listener's vote on whether a hit should stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HitResponse {
    #[default]
    Default,
    Resume,
}

pub trait BreakpointListener: Send + Sync {
    fn breakpoint_hit(&self, _hit: &BreakpointHit) -> HitResponse {
        HitResponse::Default
    }

    fn hit_count_changed(&self, _change: &HitCountChanged) {}

    fn validity_changed(&self, _change: &ValidityChanged) {}
}

#[derive(Default)]
pub struct ListenerSet {
    listeners: RwLock<Vec<Arc<dyn BreakpointListener>>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn BreakpointListener>) {
        self.listeners.write().push(listener);
    }

    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Notify every listener; true if any asked to resume
    pub fn fire_hit(&self, hit: &BreakpointHit) -> bool {
        let listeners = self.listeners.read().clone();
        let mut resume = false;
        for listener in listeners {
            if listener.breakpoint_hit(hit) == HitResponse::Resume {
                debug!(breakpoint = %hit.breakpoint, "listener requested resume");
                resume = true;
            }
        }
        resume
    }

    pub fn fire_hit_count(&self, change: &HitCountChanged) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.hit_count_changed(change);
        }
    }

    pub fn fire_validity(&self, change: &ValidityChanged) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener.validity_changed(change);
        }
    }
}

impl std::fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSet")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}
