//! Length-delimited TCP transport.
//!
//! Every frame is written as a 4-byte big-endian length followed by that
//! many bytes. Framing is handled by `tokio_util`'s
//! [`LengthDelimitedCodec`], which keeps partially received frames in its
//! read buffer so [`FrameReader::recv`] stays cancel safe.

use std::io;
use std::net::SocketAddr;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::{Connection, FrameReader, FrameWriter, Transport, TransportError};

/// Default upper bound on a single frame: 1 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Pending connections the OS may queue before `accept` is called.
const LISTEN_BACKLOG: u32 = 1024;

fn frame_codec(max_frame_len: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_len)
        .new_codec()
}

async fn resolve(addr: &str) -> io::Result<SocketAddr> {
    tokio::net::lookup_host(addr).await?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{addr} did not resolve to any address"),
        )
    })
}

/// Binds a listening socket with address reuse enabled, so a restarted
/// server can take the port back while old sockets sit in `TIME_WAIT`.
pub(crate) async fn listen(addr: &str) -> Result<TcpListener, TransportError> {
    let addr = resolve(addr).await.map_err(TransportError::Bind)?;
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()
    } else {
        TcpSocket::new_v6()
    }
    .map_err(TransportError::Bind)?;
    socket.set_reuseaddr(true).map_err(TransportError::Bind)?;
    socket.bind(addr).map_err(TransportError::Bind)?;
    socket.listen(LISTEN_BACKLOG).map_err(TransportError::Bind)
}

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
    max_frame_len: usize,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address with the default
    /// frame limit.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        Self::bind_with(addr, DEFAULT_MAX_FRAME_LEN).await
    }

    /// Binds a new TCP transport with an explicit frame limit.
    pub async fn bind_with(
        addr: &str,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        let listener = listen(addr).await?;

        tracing::info!(addr, "TCP transport listening");
        Ok(Self {
            listener,
            max_frame_len,
        })
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;

    async fn accept(&mut self) -> Result<TcpConnection, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%addr, "accepted TCP connection");
        Ok(TcpConnection::from_stream(stream, self.max_frame_len))
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Bind)
    }
}

/// A single TCP connection carrying length-delimited frames.
pub struct TcpConnection {
    stream: TcpStream,
    max_frame_len: usize,
}

impl TcpConnection {
    /// Opens a connection to `addr` with the default frame limit.
    pub async fn connect(addr: &str) -> Result<Self, TransportError> {
        Self::connect_with(addr, DEFAULT_MAX_FRAME_LEN).await
    }

    /// Opens a connection to `addr` with an explicit frame limit.
    pub async fn connect_with(
        addr: &str,
        max_frame_len: usize,
    ) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(TransportError::Connect)?;
        tracing::debug!(addr, "connected over TCP");
        Ok(Self::from_stream(stream, max_frame_len))
    }

    fn from_stream(stream: TcpStream, max_frame_len: usize) -> Self {
        // Envelopes are small and latency matters more than throughput.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        Self {
            stream,
            max_frame_len,
        }
    }
}

impl Connection for TcpConnection {
    type Reader = TcpFrameReader;
    type Writer = TcpFrameWriter;

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.local_addr().ok()
    }

    fn split(self) -> (TcpFrameReader, TcpFrameWriter) {
        let (read, write) = self.stream.into_split();
        (
            TcpFrameReader {
                frames: FramedRead::new(read, frame_codec(self.max_frame_len)),
            },
            TcpFrameWriter {
                frames: FramedWrite::new(
                    write,
                    frame_codec(self.max_frame_len),
                ),
            },
        )
    }
}

/// Receiving half of a [`TcpConnection`].
pub struct TcpFrameReader {
    frames: FramedRead<OwnedReadHalf, LengthDelimitedCodec>,
}

impl FrameReader for TcpFrameReader {
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.frames.next().await {
            Some(Ok(frame)) => Ok(Some(frame.freeze())),
            Some(Err(e)) => Err(TransportError::ReceiveFailed(e)),
            None => Ok(None),
        }
    }
}

/// Sending half of a [`TcpConnection`].
pub struct TcpFrameWriter {
    frames: FramedWrite<OwnedWriteHalf, LengthDelimitedCodec>,
}

impl FrameWriter for TcpFrameWriter {
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.frames
            .send(frame)
            .await
            .map_err(TransportError::SendFailed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        // `SinkExt::close` flushes the codec buffer, then shuts down the
        // write half so the peer reads EOF.
        SinkExt::<Bytes>::close(&mut self.frames)
            .await
            .map_err(TransportError::SendFailed)
    }
}
