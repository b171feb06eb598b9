// JDWP wire types
//
// Identifiers are assumed to be 8 bytes wide; `vm::id_sizes` lets callers
// verify that on connect.

use serde::{Deserialize, Serialize};

pub type ObjectId = u64;
pub type ThreadId = ObjectId;
pub type ReferenceTypeId = u64;
pub type MethodId = u64;
pub type FieldId = u64;
pub type FrameId = u64;

/// A code position: type tag (1=class, 2=interface, 3=array), type, method, index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub type_tag: u8,
    pub class_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64,
}

impl Location {
    /// JDWP encodes "no location" (e.g. an uncaught exception's catch site) as all zeroes
    pub fn is_absent(&self) -> bool {
        self.class_id == 0 && self.method_id == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadStatus {
    Zombie,
    Running,
    Sleeping,
    Monitor,
    Wait,
    NotStarted,
}

impl ThreadStatus {
    pub fn from_u32(status: u32) -> Self {
        match status {
            0 => ThreadStatus::Zombie,
            1 => ThreadStatus::Running,
            2 => ThreadStatus::Sleeping,
            3 => ThreadStatus::Monitor,
            4 => ThreadStatus::Wait,
            _ => ThreadStatus::NotStarted,
        }
    }

    pub fn is_alive(self) -> bool {
        !matches!(self, ThreadStatus::Zombie | ThreadStatus::NotStarted)
    }
}

pub mod tags {
    pub const ARRAY: u8 = b'[';
    pub const BYTE: u8 = b'B';
    pub const CHAR: u8 = b'C';
    pub const OBJECT: u8 = b'L';
    pub const FLOAT: u8 = b'F';
    pub const DOUBLE: u8 = b'D';
    pub const INT: u8 = b'I';
    pub const LONG: u8 = b'J';
    pub const SHORT: u8 = b'S';
    pub const VOID: u8 = b'V';
    pub const BOOLEAN: u8 = b'Z';
    pub const STRING: u8 = b's';
    pub const THREAD: u8 = b't';
    pub const THREAD_GROUP: u8 = b'g';
    pub const CLASS_LOADER: u8 = b'l';
    pub const CLASS_OBJECT: u8 = b'c';
}

/// A tagged value as it appears in events and replies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Value {
    pub tag: u8,
    pub data: ValueData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueData {
    Byte(i8),
    Char(u16),
    Float(f32),
    Double(f64),
    Int(i32),
    Long(i64),
    Short(i16),
    Boolean(bool),
    Object(ObjectId),
    Void,
}

/// An object ID with its tag; `id == 0` is null
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedObject {
    pub tag: u8,
    pub id: ObjectId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdSizes {
    pub field_id: i32,
    pub method_id: i32,
    pub object_id: i32,
    pub reference_type_id: i32,
    pub frame_id: i32,
}

impl IdSizes {
    /// Every identifier has the width this client decodes
    pub fn all_eight_bytes(&self) -> bool {
        [
            self.field_id,
            self.method_id,
            self.object_id,
            self.reference_type_id,
            self.frame_id,
        ]
        .iter()
        .all(|size| *size == 8)
    }
}
