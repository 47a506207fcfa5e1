//! Core protocol types for Murmur's wire format.
//!
//! This module defines every type that travels "on the wire": the
//! [`Envelope`] wrapper, its [`Payload`], and the transport-level
//! [`Control`] messages that never reach application code.
//!
//! Think of this as the "language" that the client and server speak.

// Serde's derive macros give `ClientId` and `Recipient` a JSON form so
// applications can embed them inside their own payloads (a chat line that
// names its author, for example).
use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identifier the server assigns to each connected client.
///
/// This is a "newtype wrapper" around `u64`: you can't accidentally pass a
/// raw counter or a port number where a client identity is expected, and
/// signatures like `fn kick(id: ClientId)` read better than `fn kick(id: u64)`.
///
/// Two values are reserved and never handed out to a client:
/// - [`ClientId::SERVER`] (`0`) marks envelopes the server itself sends.
/// - [`ClientId::UNKNOWN`] (`u64::MAX`) marks payloads whose original sender
///   is no longer known, such as replayed history.
///
/// `#[serde(transparent)]` serializes `ClientId(42)` as plain `42`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl ClientId {
    /// Sender id used for envelopes originating from the server.
    pub const SERVER: ClientId = ClientId(0);

    /// Sender id used when the original sender is not known.
    pub const UNKNOWN: ClientId = ClientId(u64::MAX);

    /// Returns `true` for ids that can belong to a connected client.
    pub fn is_assignable(self) -> bool {
        self != Self::SERVER && self != Self::UNKNOWN
    }
}

/// `tracing::info!(%client_id, "joined")` prints "C-42".
impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SERVER => write!(f, "server"),
            Self::UNKNOWN => write!(f, "unknown"),
            Self(id) => write!(f, "C-{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient: who should receive a message?
// ---------------------------------------------------------------------------

/// Specifies who should receive a server message.
///
/// Only `Client` produces a *personal* envelope; the other two are
/// broadcasts and carry `personal = false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Send to every registered connection, including the sender.
    All,

    /// Send to one specific client.
    Client(ClientId),

    /// Send to everyone EXCEPT the specified client.
    /// Useful for relaying a message without echoing it back.
    AllExcept(ClientId),
}

impl Recipient {
    /// Returns `true` if envelopes for this recipient are personal.
    pub fn is_personal(&self) -> bool {
        matches!(self, Self::Client(_))
    }

    /// Returns `true` if a connection with `id` should get the message.
    pub fn includes(&self, id: ClientId) -> bool {
        match *self {
            Self::All => true,
            Self::Client(target) => target == id,
            Self::AllExcept(excluded) => excluded != id,
        }
    }
}

// ---------------------------------------------------------------------------
// Control: transport-level messages
// ---------------------------------------------------------------------------

/// Messages consumed by the transport layer itself.
///
/// Control messages never reach application callbacks or a client's inbox:
/// the server's connection loop and the client's read loop intercept them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// Server → Client: "Are you still there?"
    /// Sent when a connection has been silent for one read timeout.
    Ping,

    /// Client → Server: "Still here."
    /// The only correct answer to a [`Control::Ping`].
    Pong,

    /// Client → Server: "I'm leaving."
    /// The server runs its disconnection path on receipt.
    Disconnect,

    /// Server → Client: "This is the id I gave you."
    /// Sent once, personal, right after the connection is registered.
    AssignId(ClientId),

    /// Server → Client: "You are being disconnected, and here's why."
    Kicked { reason: String },
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope: either a control message or application data.
///
/// Application data is opaque to the protocol layer. It is whatever bytes
/// the payload [`Codec`](crate::Codec) produced for the application's
/// message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A transport-level message (heartbeat, id assignment, disconnect).
    Control(Control),

    /// Application data, passed through untouched.
    App(Vec<u8>),
}

/// The unit of transmission. Every frame on the wire is one `Envelope`.
///
/// ```text
/// ┌──────────────────────────────┐
/// │ sender: C-42                 │  ← who sent it (server = 0)
/// │ personal: false              │  ← one recipient or everyone?
/// │ ┌──────────────────────────┐ │
/// │ │ payload: App([...])      │ │  ← control message or app bytes
/// │ └──────────────────────────┘ │
/// └──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The client that originated the payload.
    pub sender: ClientId,

    /// `true` if the envelope is addressed to exactly one recipient.
    pub personal: bool,

    /// The actual content.
    pub payload: Payload,
}

impl Envelope {
    /// A personal control envelope from the server.
    pub fn control(control: Control) -> Self {
        Self {
            sender: ClientId::SERVER,
            personal: true,
            payload: Payload::Control(control),
        }
    }

    /// An application envelope.
    pub fn app(sender: ClientId, personal: bool, body: Vec<u8>) -> Self {
        Self {
            sender,
            personal,
            payload: Payload::App(body),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
