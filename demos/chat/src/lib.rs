//! A chat room on top of Murmur.
//!
//! [`ChatServer`] keeps every line said this session and replays the lot to
//! each newcomer, then rebroadcasts new lines to everyone. [`ChatClient`]
//! attaches a display name to what it sends.

mod client;
mod server;

use std::fmt;

use murmur::Message;
use serde::{Deserialize, Serialize};

pub use client::ChatClient;
pub use server::{ChatRoom, ChatServer, SHUTDOWN_TEXT};

/// The port chat servers listen on unless told otherwise.
pub const PORT: u16 = 10301;

/// Author name used for lines the server itself says.
pub const SERVER_AUTHOR: &str = "server";

/// One line of chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    pub author: String,
    pub text: String,
}

impl ChatLine {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }

    /// A line spoken by the server.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(SERVER_AUTHOR, text)
    }
}

/// Whitespace-only lines aren't worth sending.
impl Message for ChatLine {
    fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.author, self.text)
    }
}
