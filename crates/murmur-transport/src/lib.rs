//! Transport abstraction layer for Murmur.
//!
//! Provides the [`Transport`], [`Connection`], [`FrameReader`] and
//! [`FrameWriter`] traits that abstract over framed byte streams, plus two
//! implementations:
//!
//! - [`TcpTransport`]: raw TCP with a 4-byte big-endian length prefix per
//!   frame (always available).
//! - [`WebSocketTransport`]: one binary WebSocket message per frame.
//!
//! A connection is always split into an independent reader and writer so a
//! task can block on `recv` while other tasks keep writing.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

use std::future::Future;
use std::net::SocketAddr;

use bytes::Bytes;

mod error;
mod tcp;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use tcp::{
    TcpConnection, TcpFrameReader, TcpFrameWriter, TcpTransport,
    DEFAULT_MAX_FRAME_LEN,
};
#[cfg(feature = "websocket")]
pub use websocket::{
    DEFAULT_HANDSHAKE_TIMEOUT, WebSocketConnection, WebSocketFrameReader,
    WebSocketFrameWriter, WebSocketTransport,
};

/// Accepts new incoming connections.
pub trait Transport: Send + 'static {
    /// The connection type produced by this transport.
    type Connection: Connection;

    /// Waits for and accepts the next incoming connection.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;

    /// Returns the address the transport is listening on.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// A single established connection, before it is split into halves.
pub trait Connection: Send + 'static {
    /// The receiving half.
    type Reader: FrameReader;
    /// The sending half.
    type Writer: FrameWriter;

    /// Address of the remote peer, when the transport knows it.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Address of the local end, when the transport knows it.
    fn local_addr(&self) -> Option<SocketAddr>;

    /// Splits the connection into independently owned halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// The receiving half of a connection.
pub trait FrameReader: Send + 'static {
    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    ///
    /// Implementations must be cancel safe: dropping the returned future
    /// (for example when a read timeout fires) must not lose a partially
    /// received frame.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Bytes>, TransportError>> + Send;
}

/// The sending half of a connection.
pub trait FrameWriter: Send + 'static {
    /// Sends one frame to the remote peer.
    fn send(
        &mut self,
        frame: Bytes,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Flushes pending frames and closes the sending direction.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_errors_are_classified() {
        let reset = TransportError::ReceiveFailed(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        ));
        assert!(reset.is_reset());

        let broken = TransportError::SendFailed(std::io::Error::from(
            std::io::ErrorKind::BrokenPipe,
        ));
        assert!(broken.is_reset());
    }

    #[test]
    fn test_local_failures_are_not_resets() {
        let bind = TransportError::Bind(std::io::Error::from(
            std::io::ErrorKind::AddrInUse,
        ));
        assert!(!bind.is_reset());

        let oversized = TransportError::ReceiveFailed(std::io::Error::from(
            std::io::ErrorKind::InvalidData,
        ));
        assert!(!oversized.is_reset());
    }

    #[test]
    fn test_error_display_includes_cause() {
        let err = TransportError::Connect(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "nobody home",
        ));
        assert!(err.to_string().contains("connect failed"));
        assert!(err.to_string().contains("nobody home"));
    }
}
