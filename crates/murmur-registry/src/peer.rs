//! A registered connection, as seen by the rest of the server.
//!
//! The registry never touches sockets. Each [`Peer`] holds the sending end
//! of an unbounded queue; a per-connection writer task owns the receiving
//! end ([`PeerQueue`]) and the socket. Enqueueing never blocks, so a send
//! made under the registry lock can't be stalled by a slow peer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use murmur_protocol::ClientId;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// An instruction for a connection's writer task.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Write this encoded envelope.
    Frame(Bytes),
    /// Flush everything queued before this, then close the socket.
    Close,
}

/// Receiving end of a peer's outbound queue, owned by its writer task.
pub type PeerQueue = mpsc::UnboundedReceiver<Outbound>;

/// One live connection in the [`Registry`](crate::Registry).
#[derive(Debug)]
pub struct Peer {
    id: ClientId,
    addr: Option<SocketAddr>,
    outbound: mpsc::UnboundedSender<Outbound>,
    /// Cleared on retirement, or by the writer task after a failed write.
    accepting_writes: Arc<AtomicBool>,
    /// Cancelled on retirement; the connection's read loop watches it.
    cancel: CancellationToken,
}

impl Peer {
    /// Creates a peer and the queue its writer task will drain.
    ///
    /// `cancel` is usually a child of the server's shutdown token.
    pub fn new(
        id: ClientId,
        addr: Option<SocketAddr>,
        cancel: CancellationToken,
    ) -> (Self, PeerQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let peer = Self {
            id,
            addr,
            outbound: tx,
            accepting_writes: Arc::new(AtomicBool::new(true)),
            cancel,
        };
        (peer, rx)
    }

    /// The id assigned to this connection.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The remote address, when the transport reported one.
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Returns `true` while frames sent to this peer will be written.
    pub fn is_accepting_writes(&self) -> bool {
        self.accepting_writes.load(Ordering::Acquire)
    }

    /// A shared handle to the write gate, for the writer task to clear
    /// when the socket stops taking writes.
    pub fn write_gate(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.accepting_writes)
    }

    /// A clone of the token that stops this connection's read loop.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Enqueues one frame. Returns `false` if the peer no longer accepts
    /// writes or its writer task has exited; the frame is dropped.
    pub fn send(&self, frame: Bytes) -> bool {
        if !self.is_accepting_writes() {
            return false;
        }
        self.outbound.send(Outbound::Frame(frame)).is_ok()
    }

    /// Stops the connection: no further frames are accepted, frames already
    /// queued are flushed, then the socket closes and the read loop stops.
    pub fn close(&self) {
        self.accepting_writes.store(false, Ordering::Release);
        // The writer may already be gone if its socket failed.
        let _ = self.outbound.send(Outbound::Close);
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> (Peer, PeerQueue) {
        Peer::new(ClientId(1), None, CancellationToken::new())
    }

    #[test]
    fn test_send_enqueues_frame() {
        let (peer, mut queue) = peer();
        assert!(peer.send(Bytes::from_static(b"x")));

        match queue.try_recv() {
            Ok(Outbound::Frame(frame)) => assert_eq!(frame.as_ref(), b"x"),
            other => panic!("expected a frame, got {other:?}"),
        }
    }

    #[test]
    fn test_close_flushes_then_stops() {
        let (peer, mut queue) = peer();
        peer.send(Bytes::from_static(b"last words"));
        peer.close();

        assert!(matches!(queue.try_recv(), Ok(Outbound::Frame(_))));
        assert!(matches!(queue.try_recv(), Ok(Outbound::Close)));
        assert!(peer.cancel_token().is_cancelled());
        assert!(!peer.is_accepting_writes());
    }

    #[test]
    fn test_send_after_close_is_dropped() {
        let (peer, mut queue) = peer();
        peer.close();

        assert!(!peer.send(Bytes::from_static(b"too late")));
        assert!(matches!(queue.try_recv(), Ok(Outbound::Close)));
        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn test_cleared_write_gate_drops_frames() {
        let (peer, mut queue) = peer();
        peer.write_gate().store(false, Ordering::Release);

        assert!(!peer.send(Bytes::from_static(b"x")));
        assert!(queue.try_recv().is_err());
    }

    #[test]
    fn test_send_fails_once_writer_is_gone() {
        let (peer, queue) = peer();
        drop(queue);
        assert!(!peer.send(Bytes::from_static(b"x")));
    }
}
