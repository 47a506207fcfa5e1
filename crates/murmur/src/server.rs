//! `Server` builder, shared handle and accept loop.
//!
//! This is the entry point for running a Murmur server. It ties together
//! all the layers: transport → protocol → registry → handler.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use murmur_protocol::{
    ClientId, Codec, Control, Envelope, JsonCodec, ProtocolError, Recipient,
    wire,
};
use murmur_registry::{
    IdGenerator, RandomIds, Registry, ServerPhase,
};
use murmur_transport::{TcpTransport, Transport};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::connection::admit;
use crate::{MurmurError, ServerConfig, ServerHandler};

/// Shared server state, one per server, reachable from every task.
///
/// Wrapped in `Arc` so it can be cheaply cloned across tasks. The registry
/// and the id generator sit behind `std::sync::Mutex`: neither lock is ever
/// held across an `.await` or while a handler callback runs.
pub(crate) struct Shared<H: ServerHandler> {
    pub(crate) handler: H,
    registry: Mutex<Registry>,
    ids: Mutex<Box<dyn IdGenerator>>,
    pub(crate) codec: JsonCodec,
    pub(crate) config: ServerConfig,
    /// Every connection's reader and writer task.
    pub(crate) tasks: TaskTracker,
}

// ---------------------------------------------------------------------------
// ServerHandle
// ---------------------------------------------------------------------------

/// A cheap, cloneable handle to a running server.
///
/// Handlers receive one in every callback; the [`Server`] hands one out via
/// [`Server::handle`]. All methods are safe to call from any task.
pub struct ServerHandle<H: ServerHandler> {
    pub(crate) shared: Arc<Shared<H>>,
}

impl<H: ServerHandler> Clone for ServerHandle<H> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: ServerHandler> ServerHandle<H> {
    /// The application handler this server was started with.
    pub fn handler(&self) -> &H {
        &self.shared.handler
    }

    /// Sends `message` to every connected client, the sender included.
    ///
    /// Returns how many clients it was queued for. A client whose socket
    /// has failed is skipped without affecting the rest.
    pub fn broadcast(&self, sender: ClientId, message: &H::Message) -> usize {
        self.send(Recipient::All, sender, message)
    }

    /// Sends `message` to the client `target` only.
    ///
    /// Returns `false` if no such client is connected, which is not an
    /// error: a client may leave at any moment.
    pub fn unicast(
        &self,
        sender: ClientId,
        message: &H::Message,
        target: ClientId,
    ) -> bool {
        self.send(Recipient::Client(target), sender, message) > 0
    }

    /// Sends `message` to whoever `recipient` covers. Envelopes are marked
    /// personal only for [`Recipient::Client`].
    pub fn send(
        &self,
        recipient: Recipient,
        sender: ClientId,
        message: &H::Message,
    ) -> usize {
        let frame = match self.app_frame(sender, recipient.is_personal(), message)
        {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outgoing message");
                return 0;
            }
        };
        self.registry().deliver(recipient, &frame)
    }

    /// Sends `message` to each listed client that is still connected.
    ///
    /// Like a broadcast, the envelopes are not personal. Handlers that keep
    /// their own membership (who has been caught up, who is in which room)
    /// use this instead of [`broadcast`](Self::broadcast). Returns how many
    /// clients it was queued for.
    pub fn multicast<'a, I>(&self, targets: I, sender: ClientId, message: &H::Message) -> usize
    where
        I: IntoIterator<Item = &'a ClientId>,
    {
        let frame = match self.app_frame(sender, false, message) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode outgoing message");
                return 0;
            }
        };
        self.registry().deliver_to(targets, &frame)
    }

    /// Tells a client why it is being dropped, then disconnects it.
    ///
    /// Returns `false` if the client was not connected.
    pub fn kick(&self, id: ClientId, reason: impl Into<String>) -> bool {
        let notice = Control::Kicked {
            reason: reason.into(),
        };
        if !self.send_control(id, notice) {
            return false;
        }
        self.retire(id, "kicked")
    }

    /// Snapshot of the connected client ids, in no particular order.
    pub fn clients(&self) -> Vec<ClientId> {
        self.registry().ids()
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.registry().len()
    }

    /// Returns `true` if new connections are being admitted.
    pub fn is_accepting(&self) -> bool {
        self.registry().is_accepting()
    }

    /// Opens or shuts the gate for new connections. A refused connection is
    /// accepted and closed straight away rather than left in the backlog.
    pub fn set_accepting(&self, accepting: bool) {
        self.registry().set_accepting(accepting);
        tracing::debug!(accepting, "connection gate changed");
    }

    /// Returns `true` until the server starts closing.
    pub fn is_running(&self) -> bool {
        self.phase() == ServerPhase::Running
    }

    /// The server's lifecycle phase.
    pub fn phase(&self) -> ServerPhase {
        self.registry().phase()
    }

    /// Runs the disconnection path for `id`: unregister, close the socket
    /// after queued frames are flushed, stop the read loop and tell the
    /// handler.
    ///
    /// Any number of tasks may call this for the same client; only the one
    /// that actually removes it from the registry does anything.
    pub(crate) fn retire(&self, id: ClientId, reason: &'static str) -> bool {
        let removed = self.registry().remove(id);
        let Some(peer) = removed else {
            return false;
        };
        peer.close();
        tracing::info!(client_id = %id, addr = ?peer.addr(), reason, "client disconnected");
        self.shared.handler.client_disconnected(self, id);
        true
    }

    /// Queues a control envelope for one client.
    pub(crate) fn send_control(&self, id: ClientId, control: Control) -> bool {
        match control_frame(control) {
            Ok(frame) => {
                self.registry().deliver(Recipient::Client(id), &frame) > 0
            }
            Err(e) => {
                tracing::warn!(client_id = %id, error = %e, "failed to encode control message");
                false
            }
        }
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, Registry> {
        // A panicking handler can't leave the registry half-updated: every
        // mutation completes before the guard drops.
        self.shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn ids(&self) -> MutexGuard<'_, Box<dyn IdGenerator>> {
        self.shared.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn app_frame(
        &self,
        sender: ClientId,
        personal: bool,
        message: &H::Message,
    ) -> Result<Bytes, ProtocolError> {
        let body = self.shared.codec.encode(message)?;
        wire::encode(&Envelope::app(sender, personal, body))
    }
}

/// Encodes a personal control envelope from the server.
pub(crate) fn control_frame(control: Control) -> Result<Bytes, ProtocolError> {
    wire::encode(&Envelope::control(control))
}

// ---------------------------------------------------------------------------
// ServerBuilder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a [`Server`].
///
/// # Example
///
/// ```rust,ignore
/// use murmur::prelude::*;
///
/// let server = ServerBuilder::new()
///     .bind("127.0.0.1:0")
///     .read_timeout(Duration::from_millis(250))
///     .seed(7)
///     .start(MyHandler::default())
///     .await?;
/// ```
pub struct ServerBuilder {
    bind_addr: String,
    config: ServerConfig,
    ids: Option<Box<dyn IdGenerator>>,
}

impl ServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:10301".to_string(),
            config: ServerConfig::default(),
            ids: None,
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how long a connection may stay silent before it is pinged.
    pub fn read_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Uses `ids` to generate client ids.
    pub fn ids(mut self, ids: impl IdGenerator) -> Self {
        self.ids = Some(Box::new(ids));
        self
    }

    /// Generates client ids from a seeded RNG, for reproducible runs.
    pub fn seed(self, seed: u64) -> Self {
        self.ids(RandomIds::seeded(seed))
    }

    /// Binds a TCP listener and starts the server.
    ///
    /// # Errors
    /// Returns a [`MurmurError`] wrapping [`TransportError::Bind`] if the
    /// address can't be bound (already in use, unresolvable, no
    /// permission). No task is spawned in that case.
    ///
    /// [`TransportError::Bind`]: murmur_transport::TransportError::Bind
    pub async fn start<H: ServerHandler>(
        self,
        handler: H,
    ) -> Result<Server<H>, MurmurError> {
        let transport =
            TcpTransport::bind_with(&self.bind_addr, self.config.frame_limit())
                .await?;
        self.start_with(transport, handler)
    }

    /// Starts the server on an already bound transport, such as a
    /// [`WebSocketTransport`](murmur_transport::WebSocketTransport).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start_with<H, T>(
        self,
        transport: T,
        handler: H,
    ) -> Result<Server<H>, MurmurError>
    where
        H: ServerHandler,
        T: Transport,
    {
        let config = self.config.validated();
        let local_addr = transport.local_addr()?;
        let ids = self
            .ids
            .unwrap_or_else(|| Box::new(RandomIds::from_os_rng()));

        let mut registry = Registry::new();
        registry.advance(ServerPhase::Running);

        let handle = ServerHandle {
            shared: Arc::new(Shared {
                handler,
                registry: Mutex::new(registry),
                ids: Mutex::new(ids),
                codec: JsonCodec,
                config,
                tasks: TaskTracker::new(),
            }),
        };

        let shutdown = CancellationToken::new();
        let accept_task = tokio::spawn(accept_loop(
            transport,
            handle.clone(),
            shutdown.clone(),
        ));

        tracing::info!(%local_addr, "murmur server listening");
        Ok(Server {
            handle,
            local_addr,
            shutdown,
            accept_task: Some(accept_task),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A running Murmur server.
///
/// The accept loop runs in the background from the moment the server is
/// started. Use [`handle`](Self::handle) to send messages, and
/// [`close`](Self::close) to shut down. Dropping a server without closing
/// it stops the accept loop; connected clients are left to the heartbeat.
pub struct Server<H: ServerHandler> {
    handle: ServerHandle<H>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    /// `None` once `close` has joined it.
    accept_task: Option<JoinHandle<()>>,
}

impl<H: ServerHandler> Server<H> {
    /// Binds `0.0.0.0:port` with default settings and starts the server.
    ///
    /// # Errors
    /// Fails if the port is unavailable.
    pub async fn start(port: u16, handler: H) -> Result<Self, MurmurError> {
        ServerBuilder::new()
            .bind(format!("0.0.0.0:{port}"))
            .start(handler)
            .await
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle for sending messages and inspecting connections.
    pub fn handle(&self) -> &ServerHandle<H> {
        &self.handle
    }

    /// Shuts the server down and waits until it is fully quiet.
    ///
    /// 1. Stop accepting: the accept loop exits and the listener closes.
    /// 2. If `notify_peers`, broadcast the handler's
    ///    [`shutdown_notice`](ServerHandler::shutdown_notice).
    /// 3. Disconnect every client. Each one's queued frames (the notice
    ///    included) are flushed before its socket closes, and
    ///    `client_disconnected` fires for each.
    /// 4. Wait for every connection task to finish.
    pub async fn close(mut self, notify_peers: bool) {
        let shared = Arc::clone(&self.handle.shared);
        self.handle.registry().advance(ServerPhase::Closing);

        self.shutdown.cancel();
        if let Some(accept_task) = self.accept_task.take() {
            if let Err(e) = accept_task.await {
                tracing::warn!(error = %e, "accept task ended abnormally");
            }
        }

        if notify_peers {
            if let Some(notice) = shared.handler.shutdown_notice() {
                let reached = self.handle.broadcast(ClientId::SERVER, &notice);
                tracing::debug!(clients = reached, "shutdown notice sent");
            }
        }

        for id in self.handle.clients() {
            self.handle.retire(id, "server closing");
        }

        shared.tasks.close();
        shared.tasks.wait().await;

        self.handle.registry().advance(ServerPhase::Closed);
        tracing::info!(addr = %self.local_addr, "murmur server closed");
    }
}

impl<H: ServerHandler> Drop for Server<H> {
    fn drop(&mut self) {
        if self.accept_task.is_some() {
            tracing::debug!(addr = %self.local_addr, "server dropped without close, stopping accept loop");
        }
        self.shutdown.cancel();
    }
}

/// Accepts connections until `shutdown` fires.
///
/// A failed accept (out of file descriptors, a WebSocket handshake gone
/// wrong) is logged and retried after a short pause; it never ends the loop.
async fn accept_loop<H, T>(
    mut transport: T,
    server: ServerHandle<H>,
    shutdown: CancellationToken,
) where
    H: ServerHandler,
    T: Transport,
{
    let backoff = server.shared.config.accept_backoff;
    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = transport.accept() => accepted,
        };
        match accepted {
            Ok(conn) => admit(&server, conn),
            Err(e) => {
                tracing::warn!(error = %e, "accept failed");
                tokio::time::sleep(backoff).await;
            }
        }
    }
    tracing::debug!("accept loop stopped");
}
