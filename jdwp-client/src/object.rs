// ObjectReference command set

use crate::commands::{command_sets, object_reference_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_u64, read_u8};
use crate::types::{ObjectId, ReferenceTypeId};
use bytes::BufMut;

impl JdwpConnection {
    /// Runtime type of an object: (type tag, type id)
    pub async fn reference_type(&self, object_id: ObjectId) -> JdwpResult<(u8, ReferenceTypeId)> {
        let mut request = Vec::with_capacity(8);
        request.put_u64(object_id);
        let reply = self
            .command(
                command_sets::OBJECT_REFERENCE,
                object_reference_commands::REFERENCE_TYPE,
                request,
            )
            .await?;
        let mut data = reply.as_slice();
        Ok((read_u8(&mut data)?, read_u64(&mut data)?))
    }

    /// Binary class name of an object's runtime type
    pub async fn type_name_of(&self, object_id: ObjectId) -> JdwpResult<String> {
        let (_, type_id) = self.reference_type(object_id).await?;
        let signature = self.signature(type_id).await?;
        Ok(signature_to_class_name(&signature))
    }
}

/// `Lcom/example/Foo;` -> `com.example.Foo`; array and primitive signatures are kept
pub fn signature_to_class_name(signature: &str) -> String {
    match signature.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
        Some(inner) => inner.replace('/', "."),
        None => signature.to_string(),
    }
}
