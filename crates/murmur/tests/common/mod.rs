//! Shared fixtures for the server and client integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use murmur::prelude::*;

// =========================================================================
// Recording handler
// =========================================================================

/// Everything the handler saw, shared with the test body.
#[derive(Default)]
pub struct Events {
    pub connected: Mutex<Vec<ClientId>>,
    pub disconnected: Mutex<Vec<ClientId>>,
    pub received: Mutex<Vec<(ClientId, String)>>,
}

impl Events {
    pub fn connected(&self) -> Vec<ClientId> {
        self.connected.lock().unwrap().clone()
    }

    pub fn disconnected(&self) -> Vec<ClientId> {
        self.disconnected.lock().unwrap().clone()
    }

    pub fn received(&self) -> Vec<(ClientId, String)> {
        self.received.lock().unwrap().clone()
    }
}

/// Rebroadcasts every line (echo included) and records every callback.
#[derive(Default)]
pub struct Recorder {
    pub events: Arc<Events>,
    /// Refuse further clients once this many have connected.
    pub accept_limit: Option<usize>,
    pub notice: Option<String>,
}

impl ServerHandler for Recorder {
    type Message = String;

    fn client_connected(&self, _server: &ServerHandle<Self>, id: ClientId) -> bool {
        let mut connected = self.events.connected.lock().unwrap();
        connected.push(id);
        self.accept_limit.is_none_or(|limit| connected.len() < limit)
    }

    fn client_disconnected(&self, _server: &ServerHandle<Self>, id: ClientId) {
        self.events.disconnected.lock().unwrap().push(id);
    }

    fn process_message(&self, server: &ServerHandle<Self>, sender: ClientId, line: String) {
        self.events.received.lock().unwrap().push((sender, line.clone()));
        server.broadcast(sender, &line);
    }

    fn shutdown_notice(&self) -> Option<String> {
        self.notice.clone()
    }
}

// =========================================================================
// Helpers
// =========================================================================

pub const READ_TIMEOUT: Duration = Duration::from_millis(150);

/// Starts a server on a random local port with a short read timeout.
pub async fn start(handler: Recorder) -> (Server<Recorder>, String) {
    let server = ServerBuilder::new()
        .bind("127.0.0.1:0")
        .read_timeout(READ_TIMEOUT)
        .seed(7)
        .start(handler)
        .await
        .expect("server should start");
    let addr = server.local_addr().to_string();
    (server, addr)
}

/// Connects a client and waits until the server has assigned its id, so
/// it is registered and will see broadcasts.
pub async fn join(addr: &str) -> Client<String> {
    let client = Client::<String>::connect(addr)
        .await
        .expect("client should connect");
    eventually("id assignment", || client.id().is_some()).await;
    client
}

/// Polls `check` until it holds, failing the test after a few seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Drains `client` until at least `n` messages have arrived.
pub async fn collect(client: &Client<String>, n: usize) -> Vec<String> {
    let mut got = Vec::new();
    eventually(&format!("{n} messages"), || {
        got.extend(client.drain_messages());
        got.len() >= n
    })
    .await;
    got
}
