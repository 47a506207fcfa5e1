//! Client id generation.
//!
//! The server never reaches for a global random number generator. It owns
//! an [`IdGenerator`], handed to it at construction, so two servers in one
//! process don't share state and tests can seed ids deterministically.

use murmur_protocol::ClientId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Produces candidate ids for new connections.
///
/// Candidates don't have to be unique or even assignable: the registry
/// rejects reserved values and ids that are already live, and asks again.
///
/// Any `FnMut() -> ClientId` closure is a generator, which is handy in
/// tests:
///
/// ```rust
/// use murmur_protocol::ClientId;
/// use murmur_registry::IdGenerator;
///
/// let mut next = 0;
/// let mut ids = move || {
///     next += 1;
///     ClientId(next)
/// };
/// assert_eq!(ids.next_id(), ClientId(1));
/// assert_eq!(ids.next_id(), ClientId(2));
/// ```
pub trait IdGenerator: Send + 'static {
    /// Returns the next candidate id.
    fn next_id(&mut self) -> ClientId;
}

impl<F> IdGenerator for F
where
    F: FnMut() -> ClientId + Send + 'static,
{
    fn next_id(&mut self) -> ClientId {
        self()
    }
}

/// Uniformly random ids in `1..u64::MAX`, so neither reserved value
/// (`ClientId::SERVER`, `ClientId::UNKNOWN`) is ever produced.
#[derive(Debug, Clone)]
pub struct RandomIds {
    rng: StdRng,
}

impl RandomIds {
    /// A generator seeded from the operating system.
    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// A deterministic generator: the same seed yields the same ids.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RandomIds {
    fn default() -> Self {
        Self::from_os_rng()
    }
}

impl IdGenerator for RandomIds {
    fn next_id(&mut self) -> ClientId {
        ClientId(self.rng.random_range(1..u64::MAX))
    }
}
