// Composite event parsing
//
// The VM reports events in sets (Event.Composite). Each event names the
// request that produced it, or 0 for automatically generated events.

use crate::commands::event_kinds;
use crate::protocol::{JdwpError, JdwpResult};
use crate::reader::{
    read_i32, read_location, read_string, read_tagged_object, read_u32, read_u64, read_u8,
    read_value,
};
use crate::types::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSet {
    pub suspend_policy: u8,
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub kind: u8,
    pub request_id: i32,
    pub details: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventKind {
    VMStart {
        thread: ThreadId,
    },
    VMDeath,
    ThreadStart {
        thread: ThreadId,
    },
    ThreadDeath {
        thread: ThreadId,
    },
    ClassPrepare {
        thread: ThreadId,
        type_tag: u8,
        type_id: ReferenceTypeId,
        signature: String,
        status: u32,
    },
    ClassUnload {
        signature: String,
    },
    Breakpoint {
        thread: ThreadId,
        location: Location,
    },
    Step {
        thread: ThreadId,
        location: Location,
    },
    Exception {
        thread: ThreadId,
        location: Location,
        exception: TaggedObject,
        catch_location: Option<Location>,
    },
    MethodEntry {
        thread: ThreadId,
        location: Location,
    },
    MethodExit {
        thread: ThreadId,
        location: Location,
        /// Only present for METHOD_EXIT_WITH_RETURN_VALUE
        return_value: Option<Value>,
    },
    FieldAccess {
        thread: ThreadId,
        location: Location,
        type_id: ReferenceTypeId,
        field_id: FieldId,
        /// Null for static fields
        object: TaggedObject,
    },
    FieldModification {
        thread: ThreadId,
        location: Location,
        type_id: ReferenceTypeId,
        field_id: FieldId,
        object: TaggedObject,
        value_to_be: Value,
    },
}

impl EventKind {
    pub fn thread(&self) -> Option<ThreadId> {
        match self {
            EventKind::VMDeath | EventKind::ClassUnload { .. } => None,
            EventKind::VMStart { thread }
            | EventKind::ThreadStart { thread }
            | EventKind::ThreadDeath { thread }
            | EventKind::ClassPrepare { thread, .. }
            | EventKind::Breakpoint { thread, .. }
            | EventKind::Step { thread, .. }
            | EventKind::Exception { thread, .. }
            | EventKind::MethodEntry { thread, .. }
            | EventKind::MethodExit { thread, .. }
            | EventKind::FieldAccess { thread, .. }
            | EventKind::FieldModification { thread, .. } => Some(*thread),
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            EventKind::Breakpoint { location, .. }
            | EventKind::Step { location, .. }
            | EventKind::Exception { location, .. }
            | EventKind::MethodEntry { location, .. }
            | EventKind::MethodExit { location, .. }
            | EventKind::FieldAccess { location, .. }
            | EventKind::FieldModification { location, .. } => Some(*location),
            _ => None,
        }
    }
}

/// Parse the body of an Event.Composite command
pub fn parse_event_packet(data: &[u8]) -> JdwpResult<EventSet> {
    let mut buf = data;

    let suspend_policy = read_u8(&mut buf)?;
    let event_count = read_i32(&mut buf)?;
    if event_count < 0 {
        return Err(JdwpError::Protocol(format!("Negative event count: {}", event_count)));
    }

    let mut events = Vec::with_capacity(event_count as usize);
    for _ in 0..event_count {
        let kind = read_u8(&mut buf)?;
        let request_id = read_i32(&mut buf)?;
        let details = parse_event(kind, &mut buf)?;
        events.push(Event {
            kind,
            request_id,
            details,
        });
    }

    Ok(EventSet {
        suspend_policy,
        events,
    })
}

fn parse_event(kind: u8, buf: &mut &[u8]) -> JdwpResult<EventKind> {
    let details = match kind {
        event_kinds::VM_START => EventKind::VMStart {
            thread: read_u64(buf)?,
        },
        event_kinds::VM_DEATH => EventKind::VMDeath,
        event_kinds::THREAD_START => EventKind::ThreadStart {
            thread: read_u64(buf)?,
        },
        event_kinds::THREAD_DEATH => EventKind::ThreadDeath {
            thread: read_u64(buf)?,
        },
        event_kinds::CLASS_PREPARE => EventKind::ClassPrepare {
            thread: read_u64(buf)?,
            type_tag: read_u8(buf)?,
            type_id: read_u64(buf)?,
            signature: read_string(buf)?,
            status: read_u32(buf)?,
        },
        event_kinds::CLASS_UNLOAD => EventKind::ClassUnload {
            signature: read_string(buf)?,
        },
        event_kinds::BREAKPOINT => EventKind::Breakpoint {
            thread: read_u64(buf)?,
            location: read_location(buf)?,
        },
        event_kinds::SINGLE_STEP => EventKind::Step {
            thread: read_u64(buf)?,
            location: read_location(buf)?,
        },
        event_kinds::EXCEPTION => {
            let thread = read_u64(buf)?;
            let location = read_location(buf)?;
            let exception = read_tagged_object(buf)?;
            let catch_location = read_location(buf)?;
            EventKind::Exception {
                thread,
                location,
                exception,
                catch_location: (!catch_location.is_absent()).then_some(catch_location),
            }
        }
        event_kinds::METHOD_ENTRY => EventKind::MethodEntry {
            thread: read_u64(buf)?,
            location: read_location(buf)?,
        },
        event_kinds::METHOD_EXIT => EventKind::MethodExit {
            thread: read_u64(buf)?,
            location: read_location(buf)?,
            return_value: None,
        },
        event_kinds::METHOD_EXIT_WITH_RETURN_VALUE => EventKind::MethodExit {
            thread: read_u64(buf)?,
            location: read_location(buf)?,
            return_value: Some(read_value(buf)?),
        },
        event_kinds::FIELD_ACCESS => EventKind::FieldAccess {
            thread: read_u64(buf)?,
            location: read_location(buf)?,
            type_id: {
                read_u8(buf)?;
                read_u64(buf)?
            },
            field_id: read_u64(buf)?,
            object: read_tagged_object(buf)?,
        },
        event_kinds::FIELD_MODIFICATION => EventKind::FieldModification {
            thread: read_u64(buf)?,
            location: read_location(buf)?,
            type_id: {
                read_u8(buf)?;
                read_u64(buf)?
            },
            field_id: read_u64(buf)?,
            object: read_tagged_object(buf)?,
            value_to_be: read_value(buf)?,
        },
        // The rest of the set cannot be decoded past an unknown event
        other => {
            return Err(JdwpError::Protocol(format!("Unsupported event kind: {}", other)));
        }
    };
    Ok(details)
}
