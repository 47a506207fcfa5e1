/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be created or bound.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// An outbound connection to a server could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// Accepting an incoming connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a frame failed (reset, oversized frame, protocol error).
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),
}

impl TransportError {
    /// Returns `true` if this error came from a peer resetting or aborting
    /// the connection rather than from a local failure.
    pub fn is_reset(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            Self::ReceiveFailed(e) | Self::SendFailed(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}
