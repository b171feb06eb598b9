// JDWP packet framing and reply errors
//
// Reference: https://docs.oracle.com/javase/8/docs/platform/jpda/jdwp/jdwp-protocol.html

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

// All multi-byte values on the wire are big-endian

pub type JdwpResult<T> = Result<T, JdwpError>;

#[derive(Debug, Error)]
pub enum JdwpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid handshake")]
    InvalidHandshake,

    #[error("JDWP error {code} ({name})")]
    Command { code: u16, name: &'static str },

    #[error("Connection closed")]
    ConnectionClosed,
}

impl JdwpError {
    pub fn from_code(code: u16) -> Self {
        JdwpError::Command {
            code,
            name: error_name(code),
        }
    }

    /// Error code of a failed reply
    pub fn code(&self) -> Option<u16> {
        match self {
            JdwpError::Command { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_vm_dead(&self) -> bool {
        self.code() == Some(error_codes::VM_DEAD)
    }

    /// The target VM is gone and no further command can succeed
    pub fn is_disconnect(&self) -> bool {
        matches!(self, JdwpError::Io(_) | JdwpError::ConnectionClosed) || self.is_vm_dead()
    }

    pub fn is_invalid_thread(&self) -> bool {
        self.code() == Some(error_codes::INVALID_THREAD)
    }

    pub fn is_invalid_object(&self) -> bool {
        self.code() == Some(error_codes::INVALID_OBJECT)
    }

    /// The VM does not implement the command or event kind
    pub fn is_not_implemented(&self) -> bool {
        matches!(
            self.code(),
            Some(error_codes::NOT_IMPLEMENTED | error_codes::INVALID_EVENT_TYPE)
        )
    }

    /// The VM rejected the arguments of the command
    pub fn is_rejected(&self) -> bool {
        matches!(
            self.code(),
            Some(
                error_codes::INVALID_CLASS
                    | error_codes::CLASS_NOT_PREPARED
                    | error_codes::INVALID_METHODID
                    | error_codes::INVALID_LOCATION
                    | error_codes::INVALID_FIELDID
                    | error_codes::ABSENT_INFORMATION
                    | error_codes::ILLEGAL_ARGUMENT
                    | error_codes::NATIVE_METHOD
            )
        )
    }
}

pub mod error_codes {
    pub const NONE: u16 = 0;
    pub const INVALID_THREAD: u16 = 10;
    pub const THREAD_NOT_SUSPENDED: u16 = 13;
    pub const INVALID_OBJECT: u16 = 20;
    pub const INVALID_CLASS: u16 = 21;
    pub const CLASS_NOT_PREPARED: u16 = 22;
    pub const INVALID_METHODID: u16 = 23;
    pub const INVALID_LOCATION: u16 = 24;
    pub const INVALID_FIELDID: u16 = 25;
    pub const INVALID_FRAMEID: u16 = 30;
    pub const NO_MORE_FRAMES: u16 = 31;
    pub const NOT_FOUND: u16 = 41;
    pub const NOT_IMPLEMENTED: u16 = 99;
    pub const ABSENT_INFORMATION: u16 = 101;
    pub const INVALID_EVENT_TYPE: u16 = 102;
    pub const ILLEGAL_ARGUMENT: u16 = 103;
    pub const VM_DEAD: u16 = 112;
    pub const NATIVE_METHOD: u16 = 511;
}

pub fn error_name(code: u16) -> &'static str {
    match code {
        0 => "NONE",
        10 => "INVALID_THREAD",
        11 => "INVALID_THREAD_GROUP",
        12 => "INVALID_PRIORITY",
        13 => "THREAD_NOT_SUSPENDED",
        14 => "THREAD_SUSPENDED",
        15 => "THREAD_NOT_ALIVE",
        20 => "INVALID_OBJECT",
        21 => "INVALID_CLASS",
        22 => "CLASS_NOT_PREPARED",
        23 => "INVALID_METHODID",
        24 => "INVALID_LOCATION",
        25 => "INVALID_FIELDID",
        30 => "INVALID_FRAMEID",
        31 => "NO_MORE_FRAMES",
        32 => "OPAQUE_FRAME",
        33 => "NOT_CURRENT_FRAME",
        34 => "TYPE_MISMATCH",
        35 => "INVALID_SLOT",
        40 => "DUPLICATE",
        41 => "NOT_FOUND",
        50 => "INVALID_MONITOR",
        51 => "NOT_MONITOR_OWNER",
        52 => "INTERRUPT",
        60 => "INVALID_CLASS_FORMAT",
        61 => "CIRCULAR_CLASS_DEFINITION",
        62 => "FAILS_VERIFICATION",
        63 => "ADD_METHOD_NOT_IMPLEMENTED",
        64 => "SCHEMA_CHANGE_NOT_IMPLEMENTED",
        65 => "INVALID_TYPESTATE",
        66 => "HIERARCHY_CHANGE_NOT_IMPLEMENTED",
        67 => "DELETE_METHOD_NOT_IMPLEMENTED",
        68 => "UNSUPPORTED_VERSION",
        69 => "NAMES_DONT_MATCH",
        70 => "CLASS_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        71 => "METHOD_MODIFIERS_CHANGE_NOT_IMPLEMENTED",
        99 => "NOT_IMPLEMENTED",
        100 => "NULL_POINTER",
        101 => "ABSENT_INFORMATION",
        102 => "INVALID_EVENT_TYPE",
        103 => "ILLEGAL_ARGUMENT",
        110 => "OUT_OF_MEMORY",
        111 => "ACCESS_DENIED",
        112 => "VM_DEAD",
        113 => "INTERNAL",
        115 => "UNATTACHED_THREAD",
        500 => "INVALID_TAG",
        502 => "ALREADY_INVOKING",
        503 => "INVALID_INDEX",
        504 => "INVALID_LENGTH",
        506 => "INVALID_STRING",
        507 => "INVALID_CLASS_LOADER",
        508 => "INVALID_ARRAY",
        509 => "TRANSPORT_LOAD",
        510 => "TRANSPORT_INIT",
        511 => "NATIVE_METHOD",
        512 => "INVALID_COUNT",
        _ => "UNKNOWN_ERROR",
    }
}

pub const JDWP_HANDSHAKE: &[u8] = b"JDWP-Handshake";

// Header: length (4, includes header), id (4), flags (1), then either
// command set + command (commands) or an error code (replies)
pub const HEADER_SIZE: usize = 11;
pub const REPLY_FLAG: u8 = 0x80;

#[derive(Debug, Clone)]
pub struct CommandPacket {
    pub id: u32,
    pub command_set: u8,
    pub command: u8,
    pub data: Vec<u8>,
}

impl CommandPacket {
    pub fn new(id: u32, command_set: u8, command: u8) -> Self {
        Self::with_data(id, command_set, command, Vec::new())
    }

    pub fn with_data(id: u32, command_set: u8, command: u8, data: Vec<u8>) -> Self {
        Self {
            id,
            command_set,
            command,
            data,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let length = HEADER_SIZE + self.data.len();
        let mut buf = BytesMut::with_capacity(length);

        buf.put_u32(length as u32);
        buf.put_u32(self.id);
        buf.put_u8(0x00);
        buf.put_u8(self.command_set);
        buf.put_u8(self.command);
        buf.put_slice(&self.data);

        buf.to_vec()
    }
}

#[derive(Debug, Clone)]
pub struct ReplyPacket {
    pub id: u32,
    pub error_code: u16,
    pub data: Vec<u8>,
}

impl ReplyPacket {
    pub fn decode(mut buf: &[u8]) -> JdwpResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(JdwpError::Protocol("Reply packet too short".to_string()));
        }

        let _length = buf.get_u32();
        let id = buf.get_u32();
        let flags = buf.get_u8();
        if flags != REPLY_FLAG {
            return Err(JdwpError::Protocol(format!("Invalid reply flag: {:#x}", flags)));
        }
        let error_code = buf.get_u16();

        Ok(Self {
            id,
            error_code,
            data: buf.to_vec(),
        })
    }

    /// Payload of a successful reply
    pub fn into_data(self) -> JdwpResult<Vec<u8>> {
        if self.error_code != error_codes::NONE {
            return Err(JdwpError::from_code(self.error_code));
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_header() {
        let packet = CommandPacket::with_data(42, 15, 1, vec![2, 1]);
        let encoded = packet.encode();

        assert_eq!(encoded.len(), 13);
        assert_eq!(&encoded[0..4], &[0, 0, 0, 13]);
        assert_eq!(&encoded[4..8], &[0, 0, 0, 42]);
        assert_eq!(&encoded[8..11], &[0x00, 15, 1]);
        assert_eq!(&encoded[11..], &[2, 1]);
    }

    #[test]
    fn test_reply_with_error() {
        let raw = [0, 0, 0, 11, 0, 0, 0, 7, REPLY_FLAG, 0, 112];
        let reply = ReplyPacket::decode(&raw).unwrap();
        assert_eq!(reply.id, 7);

        let err = reply.into_data().unwrap_err();
        assert_eq!(err.code(), Some(error_codes::VM_DEAD));
        assert!(err.is_disconnect());
        assert_eq!(err.to_string(), "JDWP error 112 (VM_DEAD)");
    }

    #[test]
    fn test_reply_rejects_command_flag() {
        let raw = [0, 0, 0, 11, 0, 0, 0, 7, 0x00, 0, 0];
        assert!(ReplyPacket::decode(&raw).is_err());
        assert!(ReplyPacket::decode(&raw[..5]).is_err());
    }

    #[test]
    fn test_error_classes() {
        assert!(JdwpError::from_code(error_codes::INVALID_LOCATION).is_rejected());
        assert!(JdwpError::from_code(error_codes::NOT_IMPLEMENTED).is_not_implemented());
        assert!(JdwpError::from_code(error_codes::INVALID_THREAD).is_invalid_thread());
        assert!(!JdwpError::from_code(error_codes::INVALID_THREAD).is_disconnect());
        assert!(JdwpError::ConnectionClosed.is_disconnect());
        assert_eq!(error_name(9999), "UNKNOWN_ERROR");
    }
}
