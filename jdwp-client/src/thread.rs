// ThreadReference command set

use crate::commands::{command_sets, thread_commands};
use crate::connection::JdwpConnection;
use crate::protocol::JdwpResult;
use crate::reader::{read_i32, read_location, read_u32, read_u64};
use crate::types::{FrameId, Location, ThreadId, ThreadStatus};
use bytes::BufMut;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub frame_id: FrameId,
    pub location: Location,
}

fn thread_request(thread_id: ThreadId) -> Vec<u8> {
    let mut data = Vec::with_capacity(8);
    data.put_u64(thread_id);
    data
}

impl JdwpConnection {
    /// Frames of a suspended thread; `length == -1` returns all frames from `start_frame`
    pub async fn frames(
        &self,
        thread_id: ThreadId,
        start_frame: i32,
        length: i32,
    ) -> JdwpResult<Vec<Frame>> {
        let mut request = thread_request(thread_id);
        request.put_i32(start_frame);
        request.put_i32(length);
        let reply = self
            .command(command_sets::THREAD_REFERENCE, thread_commands::FRAMES, request)
            .await?;
        let mut data = reply.as_slice();

        let count = read_i32(&mut data)?;
        let mut frames = Vec::with_capacity(count.max(0) as usize);
        for _ in 0..count {
            frames.push(Frame {
                frame_id: read_u64(&mut data)?,
                location: read_location(&mut data)?,
            });
        }
        Ok(frames)
    }

    pub async fn thread_status(&self, thread_id: ThreadId) -> JdwpResult<ThreadStatus> {
        let reply = self
            .command(
                command_sets::THREAD_REFERENCE,
                thread_commands::STATUS,
                thread_request(thread_id),
            )
            .await?;
        let mut data = reply.as_slice();
        let status = read_u32(&mut data)?;
        let _suspend_status = read_u32(&mut data)?;
        Ok(ThreadStatus::from_u32(status))
    }

    pub async fn resume_thread(&self, thread_id: ThreadId) -> JdwpResult<()> {
        self.command(
            command_sets::THREAD_REFERENCE,
            thread_commands::RESUME,
            thread_request(thread_id),
        )
        .await?;
        Ok(())
    }
}
