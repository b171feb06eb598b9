// EventRequest command set
//
// A request is sent once with every modifier it needs; the VM applies the
// modifiers in order, so a Count modifier must come after the filters it
// should count through.

use crate::commands::{command_sets, event_commands, modifier_kinds};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{put_location, put_string, read_i32};
use crate::types::{FieldId, Location, ObjectId, ReferenceTypeId, ThreadId};
use bytes::BufMut;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SuspendPolicy {
    None = 0,
    EventThread = 1,
    All = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventModifier {
    Count(i32),
    ThreadOnly(ThreadId),
    ClassOnly(ReferenceTypeId),
    ClassMatch(String),
    ClassExclude(String),
    LocationOnly(Location),
    ExceptionOnly {
        /// 0 reports every exception type
        ref_type: ReferenceTypeId,
        caught: bool,
        uncaught: bool,
    },
    FieldOnly {
        ref_type: ReferenceTypeId,
        field_id: FieldId,
    },
    Step {
        thread: ThreadId,
        size: i32,
        depth: i32,
    },
    InstanceOnly(ObjectId),
}

impl EventModifier {
    pub fn encode(&self, buf: &mut impl BufMut) {
        match self {
            EventModifier::Count(count) => {
                buf.put_u8(modifier_kinds::COUNT);
                buf.put_i32(*count);
            }
            EventModifier::ThreadOnly(thread) => {
                buf.put_u8(modifier_kinds::THREAD_ONLY);
                buf.put_u64(*thread);
            }
            EventModifier::ClassOnly(ref_type) => {
                buf.put_u8(modifier_kinds::CLASS_ONLY);
                buf.put_u64(*ref_type);
            }
            EventModifier::ClassMatch(pattern) => {
                buf.put_u8(modifier_kinds::CLASS_MATCH);
                put_string(buf, pattern);
            }
            EventModifier::ClassExclude(pattern) => {
                buf.put_u8(modifier_kinds::CLASS_EXCLUDE);
                put_string(buf, pattern);
            }
            EventModifier::LocationOnly(location) => {
                buf.put_u8(modifier_kinds::LOCATION_ONLY);
                put_location(buf, location);
            }
            EventModifier::ExceptionOnly {
                ref_type,
                caught,
                uncaught,
            } => {
                buf.put_u8(modifier_kinds::EXCEPTION_ONLY);
                buf.put_u64(*ref_type);
                buf.put_u8(*caught as u8);
                buf.put_u8(*uncaught as u8);
            }
            EventModifier::FieldOnly { ref_type, field_id } => {
                buf.put_u8(modifier_kinds::FIELD_ONLY);
                buf.put_u64(*ref_type);
                buf.put_u64(*field_id);
            }
            EventModifier::Step {
                thread,
                size,
                depth,
            } => {
                buf.put_u8(modifier_kinds::STEP);
                buf.put_u64(*thread);
                buf.put_i32(*size);
                buf.put_i32(*depth);
            }
            EventModifier::InstanceOnly(object) => {
                buf.put_u8(modifier_kinds::INSTANCE_ONLY);
                buf.put_u64(*object);
            }
        }
    }
}

/// Body of an EventRequest.Set command
pub fn encode_set_request(
    event_kind: u8,
    suspend_policy: SuspendPolicy,
    modifiers: &[EventModifier],
) -> Vec<u8> {
    let mut data = Vec::new();
    data.put_u8(event_kind);
    data.put_u8(suspend_policy as u8);
    data.put_i32(modifiers.len() as i32);
    for modifier in modifiers {
        modifier.encode(&mut data);
    }
    data
}

impl JdwpConnection {
    /// EventRequest.Set: returns the VM-assigned request id
    pub async fn set_event_request(
        &self,
        event_kind: u8,
        suspend_policy: SuspendPolicy,
        modifiers: &[EventModifier],
    ) -> JdwpResult<i32> {
        let data = encode_set_request(event_kind, suspend_policy, modifiers);
        let reply = self
            .command(command_sets::EVENT_REQUEST, event_commands::SET, data)
            .await?;
        read_i32(&mut reply.as_slice())
    }

    /// EventRequest.Clear
    pub async fn clear_event_request(&self, event_kind: u8, request_id: i32) -> JdwpResult<()> {
        let mut data = Vec::with_capacity(5);
        data.put_u8(event_kind);
        data.put_i32(request_id);
        self.command(command_sets::EVENT_REQUEST, event_commands::CLEAR, data)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::event_kinds;

    #[test]
    fn test_breakpoint_request_layout() {
        let location = Location {
            type_tag: 1,
            class_id: 0x100,
            method_id: 0x2,
            index: 4,
        };
        let data = encode_set_request(
            event_kinds::BREAKPOINT,
            SuspendPolicy::All,
            &[EventModifier::LocationOnly(location), EventModifier::Count(3)],
        );

        assert_eq!(&data[..6], &[event_kinds::BREAKPOINT, 2, 0, 0, 0, 2]);
        assert_eq!(data[6], modifier_kinds::LOCATION_ONLY);
        // kind + tag + 3 ids
        let count_at = 6 + 1 + 1 + 24;
        assert_eq!(&data[count_at..], &[modifier_kinds::COUNT, 0, 0, 0, 3]);
    }

    #[test]
    fn test_string_and_exception_modifiers() {
        let mut buf = Vec::new();
        EventModifier::ClassMatch("com.example.*".into()).encode(&mut buf);
        assert_eq!(buf[0], modifier_kinds::CLASS_MATCH);
        assert_eq!(&buf[1..5], &[0, 0, 0, 13]);
        assert_eq!(&buf[5..], b"com.example.*");

        let mut buf = Vec::new();
        EventModifier::ExceptionOnly {
            ref_type: 0,
            caught: false,
            uncaught: true,
        }
        .encode(&mut buf);
        assert_eq!(buf.len(), 11);
        assert_eq!(&buf[9..], &[0, 1]);
    }

    #[test]
    fn test_field_and_instance_modifiers() {
        let mut buf = Vec::new();
        EventModifier::FieldOnly {
            ref_type: 7,
            field_id: 9,
        }
        .encode(&mut buf);
        EventModifier::InstanceOnly(0x55).encode(&mut buf);

        assert_eq!(buf[0], modifier_kinds::FIELD_ONLY);
        assert_eq!(buf.len(), 17 + 9);
        assert_eq!(buf[17], modifier_kinds::INSTANCE_ONLY);
    }
}
