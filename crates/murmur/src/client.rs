//! The client side: one connection to a server, an inbox, and a send
//! operation.
//!
//! A background task reads from the server for as long as the connection
//! lives. It answers pings on its own, records the id the server assigns,
//! and queues every application message in the inbox until the owner
//! drains it. Sends go through a writer task, so [`Client::send`] never
//! waits on the network.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use murmur_protocol::{
    ClientId, Codec, Control, Envelope, JsonCodec, Message, Payload, wire,
};
use murmur_registry::Peer;
use murmur_transport::{Connection, FrameReader, TcpConnection};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::connection::write_loop;
use crate::{ClientConfig, MurmurError};

/// An application message as it arrived, with its envelope metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound<M> {
    /// The client that sent it, [`ClientId::SERVER`] for server notices, or
    /// [`ClientId::UNKNOWN`] when the server no longer knows.
    pub sender: ClientId,
    /// `true` if it was addressed to this client alone.
    pub personal: bool,
    /// The decoded message.
    pub payload: M,
}

/// State written by the read task and read by the owner.
#[derive(Debug)]
struct LinkState {
    /// `ClientId::UNKNOWN` until the server assigns an id.
    id: AtomicU64,
    connected: AtomicBool,
}

impl LinkState {
    fn id(&self) -> Option<ClientId> {
        let id = ClientId(self.id.load(Ordering::Acquire));
        id.is_assignable().then_some(id)
    }

    /// The sender id to stamp on outgoing envelopes.
    fn sender(&self) -> ClientId {
        self.id().unwrap_or(ClientId::UNKNOWN)
    }
}

/// A connection to a Murmur server carrying messages of type `M`.
///
/// ## Example
///
/// ```rust,no_run
/// use murmur::Client;
///
/// # async fn run() -> Result<(), murmur::MurmurError> {
/// let client = Client::<String>::connect("127.0.0.1:10301").await?;
/// client.send("hello".to_string());
/// for line in client.drain_messages() {
///     println!("{line}");
/// }
/// client.disconnect();
/// # Ok(())
/// # }
/// ```
pub struct Client<M: Message> {
    /// Outbound queue to the writer task. Its id is the remote end's.
    link: Arc<Peer>,
    inbox: Mutex<mpsc::UnboundedReceiver<Inbound<M>>>,
    state: Arc<LinkState>,
    codec: JsonCodec,
    server_addr: Option<SocketAddr>,
    local_addr: Option<SocketAddr>,
    tasks: TaskTracker,
}

impl<M: Message> Client<M> {
    /// Connects to a server over TCP with default settings.
    ///
    /// # Errors
    /// Returns a [`MurmurError`] wrapping
    /// [`TransportError::Connect`](murmur_transport::TransportError::Connect)
    /// if the server can't be reached. Nothing is spawned in that case.
    pub async fn connect(addr: &str) -> Result<Self, MurmurError> {
        Self::connect_with(addr, ClientConfig::default()).await
    }

    /// Connects to a server over TCP.
    ///
    /// # Errors
    /// Same as [`connect`](Self::connect).
    pub async fn connect_with(
        addr: &str,
        config: ClientConfig,
    ) -> Result<Self, MurmurError> {
        let conn = TcpConnection::connect_with(addr, config.max_frame_len).await?;
        Ok(Self::with_connection(conn))
    }

    /// Wraps an established connection from any transport and starts the
    /// background tasks. Must be called from within a Tokio runtime.
    pub fn with_connection<C: Connection>(conn: C) -> Self {
        let server_addr = conn.peer_addr();
        let local_addr = conn.local_addr();
        let (reader, writer) = conn.split();

        let cancel = CancellationToken::new();
        let (link, queue) = Peer::new(ClientId::SERVER, server_addr, cancel.clone());
        let link = Arc::new(link);
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let state = Arc::new(LinkState {
            id: AtomicU64::new(ClientId::UNKNOWN.0),
            connected: AtomicBool::new(true),
        });

        let tasks = TaskTracker::new();
        tasks.spawn(write_loop(writer, queue, link.write_gate(), ClientId::SERVER));
        tasks.spawn(read_loop::<M, _>(
            reader,
            Arc::clone(&link),
            inbox_tx,
            Arc::clone(&state),
            cancel,
        ));
        tasks.close();

        tracing::info!(?server_addr, ?local_addr, "connected to server");
        Self {
            link,
            inbox: Mutex::new(inbox_rx),
            state,
            codec: JsonCodec,
            server_addr,
            local_addr,
            tasks,
        }
    }

    /// Sends a message to the server.
    ///
    /// `None` and blank messages (see [`Message::is_blank`]) are silently
    /// dropped: nothing goes on the wire. Failures are logged, never
    /// returned.
    pub fn send(&self, message: impl Into<Option<M>>) {
        let Some(message) = message.into() else {
            return;
        };
        if message.is_blank() {
            return;
        }
        let body = match self.codec.encode(&message) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode message");
                return;
            }
        };
        enqueue(&self.link, &Envelope::app(self.state.sender(), false, body));
    }

    /// Tells the server this client is leaving.
    ///
    /// The socket is left open so the notice can be processed; the server
    /// closes its end in response. Call [`close`](Self::close) (or drop the
    /// client) to release local resources.
    pub fn disconnect(&self) {
        enqueue(
            &self.link,
            &client_control(self.state.sender(), Control::Disconnect),
        );
    }

    /// Empties the inbox and returns the messages in arrival order.
    pub fn drain_messages(&self) -> Vec<M> {
        self.drain_inbound()
            .into_iter()
            .map(|inbound| inbound.payload)
            .collect()
    }

    /// Like [`drain_messages`](Self::drain_messages), keeping each message's
    /// sender and addressing.
    pub fn drain_inbound(&self) -> Vec<Inbound<M>> {
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        let mut drained = Vec::new();
        while let Ok(inbound) = inbox.try_recv() {
            drained.push(inbound);
        }
        drained
    }

    /// The id the server assigned, once its notice has arrived.
    pub fn id(&self) -> Option<ClientId> {
        self.state.id()
    }

    /// Returns `true` until the read task stops (server gone, kicked,
    /// error, or [`close`](Self::close)).
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// The server's address, when the transport reported one.
    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    /// This end's address, when the transport reported one.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Closes the connection after flushing queued messages, and waits for
    /// the background tasks to finish.
    pub async fn close(self) {
        self.link.close();
        self.tasks.wait().await;
    }
}

impl<M: Message> Drop for Client<M> {
    fn drop(&mut self) {
        self.link.close();
    }
}

fn client_control(sender: ClientId, control: Control) -> Envelope {
    Envelope {
        sender,
        personal: true,
        payload: Payload::Control(control),
    }
}

fn enqueue(link: &Peer, envelope: &Envelope) {
    match wire::encode(envelope) {
        Ok(frame) => {
            if !link.send(frame) {
                tracing::debug!("connection closed, message dropped");
            }
        }
        Err(e) => tracing::warn!(error = %e, "failed to encode envelope"),
    }
}

/// Reads from the server until the connection ends.
async fn read_loop<M, R>(
    mut reader: R,
    link: Arc<Peer>,
    inbox: mpsc::UnboundedSender<Inbound<M>>,
    state: Arc<LinkState>,
    cancel: CancellationToken,
) where
    M: Message,
    R: FrameReader,
{
    let codec = JsonCodec;
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = reader.recv() => received,
        };
        let frame = match received {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::info!("server closed the connection");
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, "recv error");
                break;
            }
        };
        let envelope = match wire::decode(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "malformed envelope from server");
                break;
            }
        };

        match envelope.payload {
            Payload::Control(Control::Ping) => {
                enqueue(&link, &client_control(state.sender(), Control::Pong));
            }
            Payload::Control(Control::AssignId(id)) => {
                state.id.store(id.0, Ordering::Release);
                tracing::debug!(client_id = %id, "id assigned");
            }
            Payload::Control(Control::Kicked { reason }) => {
                tracing::info!(%reason, "kicked by server");
                break;
            }
            Payload::Control(Control::Disconnect) => break,
            Payload::Control(Control::Pong) => {}
            Payload::App(body) => match codec.decode::<M>(&body) {
                Ok(payload) => {
                    let inbound = Inbound {
                        sender: envelope.sender,
                        personal: envelope.personal,
                        payload,
                    };
                    // The owner dropped the client.
                    if inbox.send(inbound).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(sender = %envelope.sender, error = %e, "skipping undecodable payload");
                }
            },
        }
    }
    state.connected.store(false, Ordering::Release);
}
