// Engine value types
//
// Identifiers and values as seen by the engine. They mirror the JDWP wire
// types but carry no encoding concerns, so the engine can be driven by any
// transport that implements the request facade.

use serde::{Deserialize, Serialize};
use std::fmt;

// Object IDs are opaque 8-byte handles in JDWP
pub type ObjectId = u64;
pub type ThreadId = ObjectId;
pub type ReferenceTypeId = u64;
pub type MethodId = u64;
pub type FieldId = u64;
pub type FrameId = u64;

/// A code position inside a loaded type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub type_id: ReferenceTypeId,
    pub method_id: MethodId,
    pub index: u64, // bytecode index (PC)
}

impl Location {
    pub fn new(type_id: ReferenceTypeId, method_id: MethodId, index: u64) -> Self {
        Self {
            type_id,
            method_id,
            index,
        }
    }
}

/// A value observed in the target VM (field value, return value, exception)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object {
        id: ObjectId,
        type_name: Option<String>,
    },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Void => write!(f, "(void)"),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "(byte) {}", v),
            Value::Char(v) => write!(f, "'{}'", char::from_u32(*v as u32).unwrap_or('?')),
            Value::Short(v) => write!(f, "(short) {}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Object { id, type_name } => match type_name {
                Some(name) => write!(f, "{} @{:x}", name, id),
                None => write!(f, "@{:x}", id),
            },
        }
    }
}

/// A type the target VM has loaded (and prepared)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LoadedType {
    pub id: ReferenceTypeId,
    /// Binary name with dots, e.g. `com.example.Outer$Inner`
    pub name: String,
}

impl LoadedType {
    pub fn new(id: ReferenceTypeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Build from a JNI signature such as `Lcom/example/Foo;`
    pub fn from_signature(id: ReferenceTypeId, signature: &str) -> Self {
        Self::new(id, signature_to_name(signature))
    }

    /// Name of the enclosing class for nested types (`a.Outer$Inner` -> `a.Outer`)
    pub fn outer_name(&self) -> Option<&str> {
        self.name.rfind('$').map(|idx| &self.name[..idx])
    }

    /// Simple name without package or enclosing classes
    pub fn simple_name(&self) -> &str {
        let start = self
            .name
            .rfind(|c| c == '.' || c == '$')
            .map(|idx| idx + 1)
            .unwrap_or(0);
        &self.name[start..]
    }
}

/// Method metadata of a loaded type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub id: MethodId,
    pub name: String,
    pub signature: String,
    /// False for native and abstract methods
    pub has_code: bool,
}

/// Field metadata of a loaded type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: FieldId,
    pub name: String,
    pub signature: String,
}

/// The frame a condition is evaluated in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub id: FrameId,
    pub thread: ThreadId,
    pub location: Location,
    pub this_object: Option<ObjectId>,
}

/// Optional VM capabilities consulted before creating watch requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_watch_field_access: bool,
    pub can_watch_field_modification: bool,
    pub can_get_method_return_values: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            can_watch_field_access: true,
            can_watch_field_modification: true,
            can_get_method_return_values: true,
        }
    }
}

/// Convert `Lcom/example/Foo;` to `com.example.Foo`
pub fn signature_to_name(signature: &str) -> String {
    let inner = signature
        .strip_prefix('L')
        .and_then(|s| s.strip_suffix(';'))
        .unwrap_or(signature);
    inner.replace('/', ".")
}

/// Convert `com.example.Foo` to `Lcom/example/Foo;`
pub fn name_to_signature(name: &str) -> String {
    format!("L{};", name.replace('.', "/"))
}

/// JDWP class pattern semantics: exact match, or a single `*` at the start or
/// end of the pattern (`java.util.*`, `*.Foo`).
pub fn class_pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return name.ends_with(suffix);
    }
    pattern == name
}

pub fn is_pattern(name: &str) -> bool {
    name.starts_with('*') || name.ends_with('*')
}
