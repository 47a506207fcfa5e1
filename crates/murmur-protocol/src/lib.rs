//! Wire protocol for Murmur.
//!
//! This crate defines the "language" that clients and servers speak:
//!
//! - **Types** ([`Envelope`], [`Payload`], [`Control`], [`ClientId`],
//!   [`Recipient`]): the message structures that travel on the wire.
//! - **Wire schema** ([`wire::encode`], [`wire::decode`]): the fixed binary
//!   layout of one envelope.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how application payloads
//!   are converted to/from the bytes inside an envelope.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (frames) and the server/client
//! (connections and inboxes). It doesn't know about sockets; it only knows
//! how envelopes look as bytes.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Server / Client
//! ```

mod codec;
mod error;
mod message;
mod types;
pub mod wire;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use message::Message;
pub use types::{ClientId, Control, Envelope, Payload, Recipient};
