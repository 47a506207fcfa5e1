//! Connection registry for Murmur.
//!
//! This crate tracks every live connection on a server:
//!
//! 1. **Identity**: drawing unique [`ClientId`](murmur_protocol::ClientId)s
//!    from an [`IdGenerator`] and retrying on collision.
//! 2. **Registry**: the authoritative map of [`Peer`]s plus the
//!    "accepting new connections" gate and the server [`ServerPhase`].
//! 3. **Delivery**: enqueueing encoded frames on each peer's outbound
//!    queue for broadcast or unicast.
//!
//! # How it fits in the stack
//!
//! ```text
//! Server / connection tasks (above)  ← lock the registry, enqueue frames
//!     ↕
//! Registry (this crate)  ← who is connected, and where their queue is
//!     ↕
//! Protocol (below)  ← ClientId, Recipient
//! ```
//!
//! `Registry` is NOT thread-safe by itself. The server wraps it in a single
//! mutex so that every send and every removal is serialized by the same
//! lock.

mod error;
mod ids;
mod peer;
mod phase;
mod registry;

pub use error::RegistryError;
pub use ids::{IdGenerator, RandomIds};
pub use peer::{Outbound, Peer, PeerQueue};
pub use phase::ServerPhase;
pub use registry::{MAX_ID_ATTEMPTS, Registry};
