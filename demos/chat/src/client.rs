//! The chat client: a named [`Client`] for [`ChatLine`]s.

use murmur::prelude::*;
use rand::Rng;

use crate::ChatLine;

/// A chat participant.
pub struct ChatClient {
    client: Client<ChatLine>,
    name: String,
}

impl ChatClient {
    /// Joins the chat at `addr` under a random five-digit name.
    ///
    /// # Errors
    /// Fails if the server can't be reached.
    pub async fn connect(addr: &str) -> Result<Self, MurmurError> {
        let name = rand::rng().random_range(10_000..100_000).to_string();
        Self::connect_as(addr, name).await
    }

    /// Joins the chat at `addr` under `name`.
    ///
    /// # Errors
    /// Fails if the server can't be reached.
    pub async fn connect_as(addr: &str, name: impl Into<String>) -> Result<Self, MurmurError> {
        let client = Client::connect(addr).await?;
        Ok(Self {
            client,
            name: sanitize(name.into()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Changes the name attached to future lines.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = sanitize(name.into());
    }

    /// Says `text` to the room. Blank text is ignored.
    pub fn send_message(&self, text: impl Into<String>) {
        self.client.send(ChatLine::new(self.name.clone(), text));
    }

    /// Every line received since the last call, oldest first.
    pub fn get_messages(&self) -> Vec<ChatLine> {
        self.client.drain_messages()
    }

    pub fn id(&self) -> Option<ClientId> {
        self.client.id()
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Leaves the room politely.
    pub fn disconnect(&self) {
        self.client.disconnect();
    }

    pub async fn close(self) {
        self.client.close().await;
    }
}

/// Lines render as `author: text`, so names may not contain `:`.
fn sanitize(name: String) -> String {
    name.replace(':', ".")
}
