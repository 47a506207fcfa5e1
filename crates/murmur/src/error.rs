//! Unified error type for the Murmur crates.

use murmur_protocol::ProtocolError;
use murmur_registry::RegistryError;
use murmur_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `murmur` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]` attribute
/// on each variant generates the `From` impls, so `?` converts sub-crate
/// errors automatically.
///
/// Only startup failures reach callers this way: a server that cannot bind
/// ([`TransportError::Bind`]) and a client that cannot connect
/// ([`TransportError::Connect`]). Failures on an established connection are
/// logged and end that connection only.
#[derive(Debug, thiserror::Error)]
pub enum MurmurError {
    /// A transport-level error (bind, connect, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A malformed envelope or a payload that failed to (de)serialize.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A registry error (id space exhausted, server closing).
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl MurmurError {
    /// Returns `true` if a server could not bind its listening socket.
    pub fn is_bind(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Bind(_)))
    }

    /// Returns `true` if a client could not reach its server.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Connect(_)))
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use murmur_protocol::ClientId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::Bind(io::Error::from(io::ErrorKind::AddrInUse));
        let murmur_err: MurmurError = err.into();
        assert!(murmur_err.is_bind());
        assert!(!murmur_err.is_connect());
        assert!(murmur_err.to_string().contains("bind failed"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::UnknownTag(9);
        let murmur_err: MurmurError = err.into();
        assert!(matches!(murmur_err, MurmurError::Protocol(_)));
    }

    #[test]
    fn test_from_registry_error() {
        let err = RegistryError::AlreadyRegistered(ClientId(3));
        let murmur_err: MurmurError = err.into();
        assert!(matches!(murmur_err, MurmurError::Registry(_)));
        assert!(murmur_err.to_string().contains("C-3"));
    }
}
