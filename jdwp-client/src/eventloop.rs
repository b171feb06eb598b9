// JDWP event loop
//
// One task owns the socket. It writes outgoing commands, routes replies to
// their waiting callers by packet id, and forwards composite events.

use crate::commands::{command_sets, event_set_commands};
use crate::events::{parse_event_packet, EventSet};
use crate::protocol::{CommandPacket, JdwpError, JdwpResult, ReplyPacket, HEADER_SIZE, REPLY_FLAG};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Upper bound on a single packet, so a broken peer cannot exhaust memory
const MAX_PACKET_SIZE: usize = 10 * 1024 * 1024;

struct CommandRequest {
    packet: CommandPacket,
    reply_tx: oneshot::Sender<JdwpResult<ReplyPacket>>,
}

#[derive(Clone, Debug)]
pub struct EventLoopHandle {
    command_tx: mpsc::Sender<CommandRequest>,
    event_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<EventSet>>>,
}

impl EventLoopHandle {
    pub async fn send_command(&self, packet: CommandPacket) -> JdwpResult<ReplyPacket> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(CommandRequest { packet, reply_tx })
            .await
            .map_err(|_| JdwpError::ConnectionClosed)?;

        reply_rx.await.map_err(|_| JdwpError::ConnectionClosed)?
    }

    pub async fn recv_event(&self) -> Option<EventSet> {
        self.event_rx.lock().await.recv().await
    }
}

pub fn spawn_event_loop<R, W>(reader: R, writer: W) -> EventLoopHandle
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(32);
    // Unbounded: every event set leaves threads suspended until answered,
    // so none may be dropped
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    tokio::spawn(event_loop_task(reader, writer, command_rx, event_tx));

    EventLoopHandle {
        command_tx,
        event_rx: Arc::new(tokio::sync::Mutex::new(event_rx)),
    }
}

type Packet = (u8, u32, Vec<u8>);

async fn event_loop_task<R, W>(
    reader: R,
    mut writer: W,
    mut command_rx: mpsc::Receiver<CommandRequest>,
    event_tx: mpsc::UnboundedSender<EventSet>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
{
    info!("Event loop started");

    // Reads are not cancel-safe, so they run on their own task
    let (packet_tx, mut packet_rx) = mpsc::unbounded_channel();
    let read_task = tokio::spawn(read_loop(reader, packet_tx));

    let mut pending: HashMap<u32, oneshot::Sender<JdwpResult<ReplyPacket>>> = HashMap::new();

    loop {
        tokio::select! {
            cmd = command_rx.recv() => {
                let Some(cmd) = cmd else {
                    debug!("all connection handles dropped");
                    break;
                };
                let encoded = cmd.packet.encode();
                let written = async {
                    writer.write_all(&encoded).await?;
                    writer.flush().await
                }
                .await;
                match written {
                    Ok(()) => {
                        pending.insert(cmd.packet.id, cmd.reply_tx);
                    }
                    Err(e) => {
                        error!("Failed to write command: {}", e);
                        cmd.reply_tx.send(Err(JdwpError::Io(e))).ok();
                    }
                }
            }

            packet = packet_rx.recv() => {
                let Some((flags, packet_id, data)) = packet else {
                    break;
                };

                if flags == REPLY_FLAG {
                    match pending.remove(&packet_id) {
                        Some(tx) => {
                            tx.send(ReplyPacket::decode(&data)).ok();
                        }
                        None => warn!("Received reply for unknown command id={}", packet_id),
                    }
                    continue;
                }

                // Commands from the VM: only Event.Composite is defined
                let (set, command) = (data[9], data[10]);
                if set != command_sets::EVENT || command != event_set_commands::COMPOSITE {
                    warn!(set, command, "ignoring unexpected command from VM");
                    continue;
                }
                match parse_event_packet(&data[HEADER_SIZE..]) {
                    Ok(event_set) => {
                        debug!(
                            events = event_set.events.len(),
                            suspend_policy = event_set.suspend_policy,
                            "received event set"
                        );
                        if event_tx.send(event_set).is_err() {
                            debug!("event receiver dropped");
                        }
                    }
                    Err(e) => warn!("Failed to parse event: {}", e),
                }
            }
        }
    }

    read_task.abort();
    for (_, tx) in pending.drain() {
        tx.send(Err(JdwpError::ConnectionClosed)).ok();
    }
    info!("Event loop shutting down");
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, packets: mpsc::UnboundedSender<Packet>) {
    loop {
        match read_packet(&mut reader).await {
            Ok(packet) => {
                if packets.send(packet).is_err() {
                    return;
                }
            }
            Err(e) => {
                info!("connection ended: {}", e);
                return;
            }
        }
    }
}

/// Read one packet: (flags, id, whole packet including header)
async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> JdwpResult<Packet> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await?;

    let length = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let packet_id = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    let flags = header[8];

    if length < HEADER_SIZE {
        return Err(JdwpError::Protocol(format!("Invalid packet length: {}", length)));
    }
    if length > MAX_PACKET_SIZE {
        return Err(JdwpError::Protocol(format!(
            "Packet too large: {} bytes (max: {} bytes)",
            length, MAX_PACKET_SIZE
        )));
    }

    let mut packet = vec![0u8; length];
    packet[..HEADER_SIZE].copy_from_slice(&header);
    reader.read_exact(&mut packet[HEADER_SIZE..]).await?;

    Ok((flags, packet_id, packet))
}
