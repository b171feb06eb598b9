// JDWP connection
//
// TCP connect, handshake, and a cloneable handle onto the event loop. Commands
// may be issued concurrently from any task holding a clone.

use crate::eventloop::{spawn_event_loop, EventLoopHandle};
use crate::events::EventSet;
use crate::protocol::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct JdwpConnection {
    event_loop: EventLoopHandle,
    next_id: Arc<AtomicU32>,
}

impl JdwpConnection {
    /// Connect to a JVM started with `-agentlib:jdwp=transport=dt_socket,server=y`
    pub async fn connect(host: &str, port: u16) -> JdwpResult<Self> {
        info!(host, port, "connecting to JDWP agent");

        let mut stream = TcpStream::connect((host, port)).await?;
        handshake(&mut stream).await?;

        let (reader, writer) = stream.into_split();
        Ok(Self::from_event_loop(spawn_event_loop(reader, writer)))
    }

    pub(crate) fn from_event_loop(event_loop: EventLoopHandle) -> Self {
        Self {
            event_loop,
            next_id: Arc::new(AtomicU32::new(1)),
        }
    }

    /// Send a command and return the payload of its successful reply
    pub async fn command(&self, command_set: u8, command: u8, data: Vec<u8>) -> JdwpResult<Vec<u8>> {
        let packet = CommandPacket::with_data(self.next_id(), command_set, command, data);
        debug!(id = packet.id, command_set, command, "sending command");
        let reply = self.event_loop.send_command(packet).await?;
        reply.into_data()
    }

    /// Wait for the next composite event; `None` once the VM is gone
    pub async fn recv_event(&self) -> Option<EventSet> {
        self.event_loop.recv_event().await
    }

    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

pub(crate) async fn handshake<S>(stream: &mut S) -> JdwpResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(JDWP_HANDSHAKE).await?;
    stream.flush().await?;

    let mut buf = vec![0u8; JDWP_HANDSHAKE.len()];
    stream.read_exact(&mut buf).await?;

    if buf != JDWP_HANDSHAKE {
        warn!("Invalid handshake response: {:?}", buf);
        return Err(JdwpError::InvalidHandshake);
    }

    debug!("JDWP handshake successful");
    Ok(())
}
