// StackFrame command set

use crate::commands::{command_sets, stack_frame_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::read_tagged_object;
use crate::types::{FrameId, ObjectId, ThreadId};
use bytes::BufMut;

impl JdwpConnection {
    /// `this` of a frame; `None` in static and native methods
    pub async fn this_object(
        &self,
        thread_id: ThreadId,
        frame_id: FrameId,
    ) -> JdwpResult<Option<ObjectId>> {
        let mut request = Vec::with_capacity(16);
        request.put_u64(thread_id);
        request.put_u64(frame_id);
        let reply = self
            .command(
                command_sets::STACK_FRAME,
                stack_frame_commands::THIS_OBJECT,
                request,
            )
            .await?;
        let object = read_tagged_object(&mut reply.as_slice())?;
        Ok((object.id != 0).then_some(object.id))
    }
}
