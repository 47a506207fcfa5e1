//! # Murmur
//!
//! A small message server and client for broadcast and unicast over TCP.
//!
//! The server accepts connections, gives each one a unique [`ClientId`],
//! keeps it alive with a ping/pong heartbeat, and hands every application
//! message to a [`ServerHandler`] you implement. The handler decides who
//! hears about it: everyone ([`ServerHandle::broadcast`]) or one client
//! ([`ServerHandle::unicast`]). The [`Client`] connects, answers pings on
//! its own, and collects incoming messages in an inbox you drain.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use murmur::prelude::*;
//!
//! struct Echo;
//!
//! impl ServerHandler for Echo {
//!     type Message = String;
//!
//!     fn process_message(&self, server: &ServerHandle<Self>, sender: ClientId, line: String) {
//!         server.broadcast(sender, &line);
//!     }
//! }
//!
//! # async fn run() -> Result<(), MurmurError> {
//! let server = Server::start(10301, Echo).await?;
//!
//! let client = Client::<String>::connect("127.0.0.1:10301").await?;
//! client.send("hello".to_string());
//!
//! server.close(true).await;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod connection;
mod error;
mod handler;
mod heartbeat;
mod server;

pub use client::{Client, Inbound};
pub use config::{
    ClientConfig, MAX_FRAME_LEN, MIN_FRAME_LEN, MIN_READ_TIMEOUT, ServerConfig,
};
pub use error::MurmurError;
pub use handler::ServerHandler;
pub use heartbeat::{Heartbeat, HeartbeatAction};
pub use server::{Server, ServerBuilder, ServerHandle};

pub use murmur_protocol::{ClientId, Message, Recipient};
pub use murmur_registry::{IdGenerator, RandomIds, ServerPhase};
pub use murmur_transport::TransportError;

/// Everything an application usually needs, in one import.
pub mod prelude {
    pub use crate::{
        Client, ClientConfig, ClientId, IdGenerator, Inbound, Message,
        MurmurError, RandomIds, Recipient, Server, ServerBuilder,
        ServerConfig, ServerHandle, ServerHandler, ServerPhase,
        TransportError,
    };
}

/// The layers underneath, for custom transports and low-level tooling.
pub mod transport {
    pub use murmur_transport::*;
}

/// Envelope types and the wire codec.
pub mod protocol {
    pub use murmur_protocol::*;
}
