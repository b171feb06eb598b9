// ReferenceType command set

use crate::commands::{command_sets, modifiers, reference_type_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_string, read_u64};
use crate::types::{FieldId, MethodId, ReferenceTypeId};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub method_id: MethodId,
    pub name: String,
    pub signature: String,
    pub mod_bits: i32,
}

impl MethodInfo {
    /// Native and abstract methods have no bytecode and no line table
    pub fn has_code(&self) -> bool {
        (self.mod_bits as u32) & (modifiers::NATIVE | modifiers::ABSTRACT) == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub field_id: FieldId,
    pub name: String,
    pub signature: String,
    pub mod_bits: i32,
}

fn type_request(ref_type_id: ReferenceTypeId) -> Vec<u8> {
    let mut data = Vec::with_capacity(8);
    data.put_u64(ref_type_id);
    data
}

impl JdwpConnection {
    /// JNI signature of a type, e.g. `Lcom/example/Foo;`
    pub async fn signature(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<String> {
        let reply = self
            .command(
                command_sets::REFERENCE_TYPE,
                reference_type_commands::SIGNATURE,
                type_request(ref_type_id),
            )
            .await?;
        read_string(&mut reply.as_slice())
    }

    /// Methods declared by the type itself (not inherited)
    pub async fn methods(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<Vec<MethodInfo>> {
        let reply = self
            .command(
                command_sets::REFERENCE_TYPE,
                reference_type_commands::METHODS,
                type_request(ref_type_id),
            )
            .await?;
        let mut data = reply.as_slice();

        let count = read_i32(&mut data)?;
        let mut methods = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            methods.push(MethodInfo {
                method_id: read_u64(&mut data)?,
                name: read_string(&mut data)?,
                signature: read_string(&mut data)?,
                mod_bits: read_i32(&mut data)?,
            });
        }
        Ok(methods)
    }

    /// Fields declared by the type itself (not inherited)
    pub async fn fields(&self, ref_type_id: ReferenceTypeId) -> JdwpResult<Vec<FieldInfo>> {
        let reply = self
            .command(
                command_sets::REFERENCE_TYPE,
                reference_type_commands::FIELDS,
                type_request(ref_type_id),
            )
            .await?;
        let mut data = reply.as_slice();

        let count = read_i32(&mut data)?;
        let mut fields = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            fields.push(FieldInfo {
                field_id: read_u64(&mut data)?,
                name: read_string(&mut data)?,
                signature: read_string(&mut data)?,
                mod_bits: read_i32(&mut data)?,
            });
        }
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_and_abstract_have_no_code() {
        let method = |mod_bits| MethodInfo {
            method_id: 1,
            name: "run".into(),
            signature: "()V".into(),
            mod_bits,
        };
        assert!(method(0x0001).has_code());
        assert!(!method(0x0101).has_code());
        assert!(!method(0x0401).has_code());
    }
}
