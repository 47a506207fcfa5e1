//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each frame travels as one binary WebSocket message. Text messages are
//! accepted and passed through as their UTF-8 bytes; ping/pong frames are
//! answered by tungstenite itself and never surface as frames.
//!
//! The server side runs each opening handshake in its own task with a
//! deadline. A peer that connects and then says nothing holds up only
//! itself; [`Transport::accept`] keeps taking new sockets meanwhile.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::tcp::listen;
use crate::{Connection, FrameReader, FrameWriter, Transport, TransportError};

/// How long a new socket may take to complete the WebSocket upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

fn ws_error(
    kind: std::io::ErrorKind,
    e: tokio_tungstenite::tungstenite::Error,
) -> std::io::Error {
    std::io::Error::new(kind, e)
}

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    /// Upgrades in flight. Dropping the transport aborts them.
    handshakes: JoinSet<Option<WebSocketConnection<TcpStream>>>,
    handshake_timeout: Duration,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    ///
    /// Address reuse is enabled, as for
    /// [`TcpTransport`](crate::TcpTransport).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = listen(addr).await?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener,
            handshakes: JoinSet::new(),
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        })
    }

    /// Sets how long a new socket may take to complete the upgrade before
    /// it is dropped.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// Upgrades one accepted socket. `None` if the peer failed the handshake or
/// ran out of time.
async fn handshake(
    stream: TcpStream,
    addr: SocketAddr,
    deadline: Duration,
) -> Option<WebSocketConnection<TcpStream>> {
    let local = stream.local_addr().ok();
    match tokio::time::timeout(deadline, tokio_tungstenite::accept_async(stream)).await {
        Ok(Ok(ws)) => {
            tracing::debug!(%addr, "accepted WebSocket connection");
            Some(WebSocketConnection {
                ws,
                peer: Some(addr),
                local,
            })
        }
        Ok(Err(e)) => {
            tracing::debug!(%addr, error = %e, "WebSocket handshake failed");
            None
        }
        Err(_) => {
            tracing::debug!(%addr, ?deadline, "WebSocket handshake timed out");
            None
        }
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection<TcpStream>;

    /// Returns the next connection whose handshake has finished. Sockets
    /// keep being accepted while earlier handshakes are pending.
    async fn accept(
        &mut self,
    ) -> Result<WebSocketConnection<TcpStream>, TransportError> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, addr) =
                        accepted.map_err(TransportError::AcceptFailed)?;
                    self.handshakes.spawn(handshake(
                        stream,
                        addr,
                        self.handshake_timeout,
                    ));
                }
                Some(done) = self.handshakes.join_next() => match done {
                    Ok(Some(conn)) => return Ok(conn),
                    Ok(None) => {}
                    Err(e) => tracing::warn!(error = %e, "WebSocket handshake task failed"),
                },
            }
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Bind)
    }
}

/// A single WebSocket connection over any byte stream `S`.
pub struct WebSocketConnection<S = TcpStream> {
    ws: WebSocketStream<S>,
    peer: Option<SocketAddr>,
    local: Option<SocketAddr>,
}

impl WebSocketConnection<MaybeTlsStream<TcpStream>> {
    /// Connects to a WebSocket server at `url` (e.g. `ws://127.0.0.1:10301`).
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| {
                TransportError::Connect(ws_error(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;

        let (peer, local) = match ws.get_ref() {
            MaybeTlsStream::Plain(tcp) => {
                (tcp.peer_addr().ok(), tcp.local_addr().ok())
            }
            _ => (None, None),
        };
        tracing::debug!(url, "connected over WebSocket");
        Ok(Self { ws, peer, local })
    }
}

impl<S> Connection for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Reader = WebSocketFrameReader<S>;
    type Writer = WebSocketFrameWriter<S>;

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        let (sink, stream) = self.ws.split();
        (
            WebSocketFrameReader { stream },
            WebSocketFrameWriter { sink },
        )
    }
}

/// Receiving half of a [`WebSocketConnection`].
pub struct WebSocketFrameReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> FrameReader for WebSocketFrameReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data)),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(Bytes::copy_from_slice(text.as_bytes())));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(ws_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }
}

/// Sending half of a [`WebSocketConnection`].
pub struct WebSocketFrameWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> FrameWriter for WebSocketFrameWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.sink.send(Message::Binary(frame)).await.map_err(|e| {
            TransportError::SendFailed(ws_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await.map_err(|e| {
            TransportError::SendFailed(ws_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}
