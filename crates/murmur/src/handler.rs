//! The `ServerHandler` trait: the extension point for applications.
//!
//! A server is generic over one handler. The server owns sockets, ids,
//! heartbeats and the registry; the handler decides what incoming messages
//! mean and who hears about them.

use murmur_protocol::{ClientId, Message};

use crate::ServerHandle;

/// Callbacks a [`Server`](crate::Server) invokes on behalf of its
/// connections.
///
/// Every callback runs synchronously on the task that triggered it (the
/// accept loop, or the connection's read loop) and never while the registry
/// lock is held, so it may freely call back into the [`ServerHandle`]. It
/// must not block for long: while `process_message` runs, that client's
/// next message waits.
///
/// ## Example
///
/// ```rust
/// use murmur::prelude::*;
///
/// /// Rebroadcasts every line to everyone, sender included.
/// struct Echo;
///
/// impl ServerHandler for Echo {
///     type Message = String;
///
///     fn process_message(&self, server: &ServerHandle<Self>, sender: ClientId, line: String) {
///         server.broadcast(sender, &line);
///     }
/// }
/// ```
pub trait ServerHandler: Send + Sync + Sized + 'static {
    /// The application payload clients and server exchange.
    type Message: Message;

    /// A client was registered and has been sent its id.
    ///
    /// The return value becomes the server's "accepting new connections"
    /// gate: return `false` to refuse further clients until
    /// [`ServerHandle::set_accepting`] opens it again. Default: keep
    /// accepting.
    fn client_connected(&self, _server: &ServerHandle<Self>, _id: ClientId) -> bool {
        true
    }

    /// A client is gone: it said goodbye, went silent, errored, was kicked,
    /// or the server closed. Called exactly once per connected client.
    fn client_disconnected(&self, _server: &ServerHandle<Self>, _id: ClientId) {}

    /// A client sent an application message.
    ///
    /// Messages from one client arrive here in the order it sent them.
    fn process_message(
        &self,
        server: &ServerHandle<Self>,
        sender: ClientId,
        message: Self::Message,
    );

    /// The message broadcast to every client when the server closes with
    /// `notify_peers = true`. Default: none, so nothing is sent.
    fn shutdown_notice(&self) -> Option<Self::Message> {
        None
    }
}
