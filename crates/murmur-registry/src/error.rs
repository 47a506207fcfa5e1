//! Error types for the registry layer.

use murmur_protocol::ClientId;

/// Errors that can occur while registering connections.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The id generator kept producing ids that are reserved or already
    /// taken. With a random 64-bit generator this means the generator is
    /// broken, not that the id space is actually full.
    #[error("no free client id after {attempts} attempts")]
    IdSpaceExhausted { attempts: usize },

    /// A peer with this id is already registered.
    #[error("client {0} is already registered")]
    AlreadyRegistered(ClientId),

    /// The server is not in a phase that admits new peers.
    #[error("registry is {0}, not accepting peers")]
    NotRunning(crate::ServerPhase),
}
