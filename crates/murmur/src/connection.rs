//! Per-connection tasks: admission, the read loop and the writer.
//!
//! Each admitted connection gets two Tokio tasks:
//!   1. a writer that drains the peer's outbound queue onto the socket, and
//!   2. a reader that waits for frames with a timeout, runs the heartbeat,
//!      intercepts control messages and hands application messages to the
//!      handler.
//!
//! Whatever ends the reader (goodbye, silence, error, malformed input) ends
//! in [`ServerHandle::retire`], which is idempotent.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use murmur_protocol::{ClientId, Codec, Control, Payload, wire};
use murmur_registry::{Outbound, Peer, PeerQueue};
use murmur_transport::{Connection, FrameReader, FrameWriter};
use tokio_util::sync::CancellationToken;

use crate::heartbeat::{Heartbeat, HeartbeatAction};
use crate::server::control_frame;
use crate::{ServerHandle, ServerHandler};

/// Registers a freshly accepted connection and starts its tasks, or turns
/// it away if the gate is shut.
///
/// Order matters: the id notice is queued before the peer becomes visible
/// to broadcasts, and `client_connected` runs before the read loop starts,
/// so the handler never sees a message from a client it hasn't been told
/// about.
pub(crate) fn admit<H, C>(server: &ServerHandle<H>, conn: C)
where
    H: ServerHandler,
    C: Connection,
{
    let addr = conn.peer_addr();
    let (reader, mut writer) = conn.split();

    let registered = {
        let mut registry = server.registry();
        if registry.is_accepting() {
            let allocated = registry.allocate_id(&mut **server.ids());
            allocated.and_then(|id| {
                let (peer, queue) = Peer::new(id, addr, CancellationToken::new());
                if let Ok(notice) = control_frame(Control::AssignId(id)) {
                    peer.send(notice);
                }
                let gate = peer.write_gate();
                let cancel = peer.cancel_token();
                registry.insert(peer)?;
                Ok(Some((id, queue, gate, cancel)))
            })
        } else {
            Ok(None)
        }
    };

    let (id, queue, gate, cancel) = match registered {
        Ok(Some(parts)) => parts,
        Ok(None) => {
            tracing::warn!(?addr, "not accepting connections, closing");
            server.shared.tasks.spawn(async move {
                drop(reader);
                if let Err(e) = writer.close().await {
                    tracing::debug!(?addr, error = %e, "close of refused connection failed");
                }
            });
            return;
        }
        Err(e) => {
            tracing::warn!(?addr, error = %e, "could not register connection");
            return;
        }
    };

    tracing::info!(client_id = %id, ?addr, "client connected");
    server.shared.tasks.spawn(write_loop(writer, queue, gate, id));

    let accept_more = server.shared.handler.client_connected(server, id);
    server.registry().set_accepting(accept_more);
    if !accept_more {
        tracing::info!("handler closed the connection gate");
    }

    server
        .shared
        .tasks
        .spawn(read_loop(server.clone(), reader, id, cancel));
}

/// Drains one peer's outbound queue onto its socket.
///
/// Stops on [`Outbound::Close`], when every sender is gone, or on the
/// first failed write. A failed write clears the write gate so later sends
/// skip this peer; detecting the dead connection is the reader's job.
///
/// `peer` names the remote end in log events.
pub(crate) async fn write_loop<W: FrameWriter>(
    mut writer: W,
    mut queue: PeerQueue,
    gate: Arc<AtomicBool>,
    peer: ClientId,
) {
    while let Some(outbound) = queue.recv().await {
        match outbound {
            Outbound::Frame(frame) => {
                if let Err(e) = writer.send(frame).await {
                    gate.store(false, Ordering::Release);
                    tracing::debug!(%peer, error = %e, "write failed");
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    if let Err(e) = writer.close().await {
        tracing::debug!(%peer, error = %e, "close failed");
    }
}

/// Reads frames from one client until something ends the connection.
async fn read_loop<H, R>(
    server: ServerHandle<H>,
    mut reader: R,
    id: ClientId,
    cancel: CancellationToken,
) where
    H: ServerHandler,
    R: FrameReader,
{
    let read_timeout = server.shared.config.read_timeout;
    let mut heartbeat = Heartbeat::new();

    let reason = loop {
        let received = tokio::select! {
            // Someone else already retired this client.
            _ = cancel.cancelled() => return,
            received = tokio::time::timeout(read_timeout, reader.recv()) => received,
        };

        let frame = match received {
            Ok(Ok(Some(frame))) => frame,
            Ok(Ok(None)) => break "connection closed",
            Ok(Err(e)) if e.is_reset() => {
                tracing::debug!(client_id = %id, error = %e, "connection reset by client");
                break "connection reset";
            }
            Ok(Err(e)) => {
                tracing::warn!(client_id = %id, error = %e, "recv error");
                break "read error";
            }
            Err(_) => match heartbeat.on_timeout() {
                HeartbeatAction::SendPing => {
                    tracing::debug!(client_id = %id, "client silent, pinging");
                    server.send_control(id, Control::Ping);
                    continue;
                }
                HeartbeatAction::Expire => break "heartbeat expired",
            },
        };

        let envelope = match wire::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(client_id = %id, error = %e, "malformed envelope");
                break "malformed envelope";
            }
        };
        heartbeat.on_traffic();

        match envelope.payload {
            Payload::Control(Control::Disconnect) => break "client left",
            Payload::Control(Control::Pong) => {}
            Payload::Control(other) => {
                tracing::debug!(client_id = %id, ?other, "ignoring unexpected control message");
            }
            Payload::App(body) => {
                match server.shared.codec.decode::<H::Message>(&body) {
                    // The envelope's sender field is the client's claim; the
                    // connection's own id is what the handler sees.
                    Ok(message) => {
                        server.shared.handler.process_message(&server, id, message);
                    }
                    Err(e) => {
                        tracing::debug!(client_id = %id, error = %e, "undecodable payload");
                        break "malformed payload";
                    }
                }
            }
        }
    };

    server.retire(id, reason);
}
