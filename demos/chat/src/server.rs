//! The chat server: a message log plus rebroadcast.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use murmur::prelude::*;

use crate::{ChatLine, PORT};

/// Line broadcast when the server closes with `notify = true`.
pub const SHUTDOWN_TEXT: &str = "Server has disconnected";

#[derive(Debug, Default)]
struct Room {
    log: Vec<ChatLine>,
    /// Clients that have been sent the backlog. New lines go to these only.
    members: HashSet<ClientId>,
}

/// The [`ServerHandler`] behind a [`ChatServer`].
///
/// A client is registered with the server before it is caught up, so lines
/// are relayed to room members rather than broadcast: a newcomer sees the
/// backlog first and every later line exactly once.
#[derive(Debug, Default)]
pub struct ChatRoom {
    room: Mutex<Room>,
}

impl ChatRoom {
    /// Every line said so far, oldest first.
    pub fn log(&self) -> Vec<ChatLine> {
        self.room().log.clone()
    }

    fn room(&self) -> MutexGuard<'_, Room> {
        self.room.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ServerHandler for ChatRoom {
    type Message = ChatLine;

    /// Catches the newcomer up on the conversation. Replayed lines are
    /// personal and carry no sender: whoever said them may be long gone.
    fn client_connected(&self, server: &ServerHandle<Self>, id: ClientId) -> bool {
        let mut room = self.room();
        for line in &room.log {
            server.unicast(ClientId::UNKNOWN, line, id);
        }
        room.members.insert(id);
        tracing::debug!(client_id = %id, replayed = room.log.len(), "caught up new client");
        true
    }

    fn client_disconnected(&self, _server: &ServerHandle<Self>, id: ClientId) {
        self.room().members.remove(&id);
    }

    fn process_message(&self, server: &ServerHandle<Self>, sender: ClientId, line: ChatLine) {
        tracing::info!(client_id = %sender, author = %line.author, "{}", line.text);
        let mut room = self.room();
        server.multicast(&room.members, sender, &line);
        room.log.push(line);
    }

    fn shutdown_notice(&self) -> Option<ChatLine> {
        Some(ChatLine::system(SHUTDOWN_TEXT))
    }
}

/// A running chat server.
pub struct ChatServer {
    server: Server<ChatRoom>,
}

impl ChatServer {
    /// Starts a chat server on `0.0.0.0:{PORT}`.
    ///
    /// # Errors
    /// Fails if the port is unavailable.
    pub async fn start() -> Result<Self, MurmurError> {
        Self::start_with(ServerBuilder::new().bind(format!("0.0.0.0:{PORT}"))).await
    }

    /// Starts a chat server from a configured builder.
    ///
    /// # Errors
    /// Fails if the builder's address can't be bound.
    pub async fn start_with(builder: ServerBuilder) -> Result<Self, MurmurError> {
        let server = builder.start(ChatRoom::default()).await?;
        Ok(Self { server })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn handle(&self) -> &ServerHandle<ChatRoom> {
        self.server.handle()
    }

    /// Every line said so far, oldest first.
    pub fn log(&self) -> Vec<ChatLine> {
        self.server.handle().handler().log()
    }

    /// Shuts down; with `notify`, every client is told first.
    pub async fn close(self, notify: bool) {
        self.server.close(notify).await;
    }
}
