//! The registry: every live connection on a server.
//!
//! Besides the peer map it holds the two other pieces of state that more
//! than one task mutates: the "accepting new connections" gate and the
//! server phase. Keeping all three behind the one lock the server wraps
//! around this struct means a broadcast can never interleave with a
//! removal, and a connection can't slip in while the server is closing.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use murmur_protocol::{ClientId, Recipient};

use crate::{IdGenerator, Peer, RegistryError, ServerPhase};

/// How many candidates [`Registry::allocate_id`] draws before giving up.
pub const MAX_ID_ATTEMPTS: usize = 64;

/// Tracks every live connection on a server.
///
/// ## Lifecycle of a peer
///
/// ```text
/// allocate_id() ──→ insert() ──→ deliver() ... ──→ remove()
///                                                     │
///                                                     ▼
///                                       whoever gets Some(peer) runs
///                                       the disconnection path, once
/// ```
#[derive(Debug)]
pub struct Registry {
    peers: HashMap<ClientId, Peer>,
    accepting: bool,
    phase: ServerPhase,
}

impl Registry {
    /// Creates an empty registry: phase `Starting`, gate open.
    pub fn new() -> Self {
        Self {
            peers: HashMap::new(),
            accepting: true,
            phase: ServerPhase::Starting,
        }
    }

    /// Draws ids from `ids` until one is assignable and not already live.
    ///
    /// Collisions with a random 64-bit generator are vanishingly rare, but
    /// they are checked, not assumed away.
    ///
    /// # Errors
    /// Returns [`RegistryError::IdSpaceExhausted`] after
    /// [`MAX_ID_ATTEMPTS`] rejected candidates.
    pub fn allocate_id(
        &self,
        ids: &mut dyn IdGenerator,
    ) -> Result<ClientId, RegistryError> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let candidate = ids.next_id();
            if !candidate.is_assignable() {
                tracing::debug!(%candidate, "generator produced reserved id");
                continue;
            }
            if self.peers.contains_key(&candidate) {
                tracing::debug!(%candidate, "client id collision, redrawing");
                continue;
            }
            return Ok(candidate);
        }
        Err(RegistryError::IdSpaceExhausted {
            attempts: MAX_ID_ATTEMPTS,
        })
    }

    /// Registers a peer.
    ///
    /// # Errors
    /// - [`RegistryError::NotRunning`] once the server is closing
    /// - [`RegistryError::AlreadyRegistered`] if the id is live
    pub fn insert(&mut self, peer: Peer) -> Result<(), RegistryError> {
        if !self.phase.admits_peers() {
            return Err(RegistryError::NotRunning(self.phase));
        }
        let id = peer.id();
        if self.peers.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        self.peers.insert(id, peer);
        tracing::debug!(client_id = %id, peers = self.peers.len(), "peer registered");
        Ok(())
    }

    /// Removes a peer, returning it if it was still registered.
    ///
    /// This is the idempotence point of the disconnection path: several
    /// tasks may notice the same dead connection, but only the one that
    /// gets `Some` back goes on to close it and notify the application.
    pub fn remove(&mut self, id: ClientId) -> Option<Peer> {
        let peer = self.peers.remove(&id)?;
        tracing::debug!(client_id = %id, peers = self.peers.len(), "peer removed");
        Some(peer)
    }

    /// Enqueues `frame` for every peer `recipient` covers that still
    /// accepts writes. Returns how many peers took the frame.
    ///
    /// A peer that refuses the frame is skipped; it never prevents delivery
    /// to the rest.
    pub fn deliver(&self, recipient: Recipient, frame: &Bytes) -> usize {
        match recipient {
            Recipient::Client(id) => self
                .get(id)
                .map_or(0, |peer| usize::from(peer.send(frame.clone()))),
            Recipient::All | Recipient::AllExcept(_) => self
                .peers
                .values()
                .filter(|peer| recipient.includes(peer.id()))
                .filter(|peer| peer.send(frame.clone()))
                .count(),
        }
    }

    /// Enqueues `frame` for each listed peer that is still registered and
    /// accepts writes. Ids that are gone are skipped, as are repeats.
    pub fn deliver_to<'a, I>(&self, ids: I, frame: &Bytes) -> usize
    where
        I: IntoIterator<Item = &'a ClientId>,
    {
        let mut seen = HashSet::new();
        ids.into_iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.get(*id))
            .filter(|peer| peer.send(frame.clone()))
            .count()
    }

    /// Looks up a peer by id.
    pub fn get(&self, id: ClientId) -> Option<&Peer> {
        self.peers.get(&id)
    }

    /// Snapshot of the registered ids, in no particular order.
    pub fn ids(&self) -> Vec<ClientId> {
        self.peers.keys().copied().collect()
    }

    /// Returns the number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no peers are registered.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Returns `true` if new connections should be admitted.
    pub fn is_accepting(&self) -> bool {
        self.accepting && self.phase.admits_peers()
    }

    /// Opens or shuts the gate for new connections.
    pub fn set_accepting(&mut self, accepting: bool) {
        self.accepting = accepting;
    }

    /// The current server phase.
    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    /// Moves to the next phase. Returns `false` (and changes nothing) if
    /// `target` isn't the immediate successor of the current phase.
    pub fn advance(&mut self, target: ServerPhase) -> bool {
        if !self.phase.can_transition_to(target) {
            tracing::warn!(from = %self.phase, to = %target, "invalid phase transition");
            return false;
        }
        self.phase = target;
        true
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// =========================================================================
// Tests
// =========================================================================
