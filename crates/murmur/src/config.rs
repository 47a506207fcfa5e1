//! Server and client configuration.

use std::time::Duration;

use murmur_transport::DEFAULT_MAX_FRAME_LEN;

/// Shortest read timeout the server will run with.
pub const MIN_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Smallest frame limit the server will run with. An envelope header alone
/// is 14 bytes, so anything under this can't carry a useful payload.
pub const MIN_FRAME_LEN: usize = 64;

/// Largest frame limit the server will run with.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for a [`Server`](crate::Server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// How long a connection may stay silent before it is pinged. A second
    /// silent window after the ping disconnects it.
    pub read_timeout: Duration,

    /// Largest frame a peer may send, in bytes. Longer frames end the
    /// connection.
    pub max_frame_len: usize,

    /// Pause after a failed `accept` before trying again.
    pub accept_backoff: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            accept_backoff: Duration::from_millis(50),
        }
    }
}

impl ServerConfig {
    /// Returns a copy with out-of-range values clamped into range.
    ///
    /// A zero read timeout would ping every connection in a busy loop, so
    /// it is raised to [`MIN_READ_TIMEOUT`]. The frame limit is clamped to
    /// `[MIN_FRAME_LEN, MAX_FRAME_LEN]`. Every adjustment logs a warning.
    pub fn validated(mut self) -> Self {
        if self.read_timeout < MIN_READ_TIMEOUT {
            tracing::warn!(
                requested = ?self.read_timeout,
                using = ?MIN_READ_TIMEOUT,
                "read timeout too short, clamping"
            );
            self.read_timeout = MIN_READ_TIMEOUT;
        }
        let clamped = self.frame_limit();
        if clamped != self.max_frame_len {
            tracing::warn!(
                requested = self.max_frame_len,
                using = clamped,
                "max frame length out of range, clamping"
            );
            self.max_frame_len = clamped;
        }
        self
    }

    /// The frame limit [`validated`](Self::validated) would settle on,
    /// without logging.
    pub(crate) fn frame_limit(&self) -> usize {
        self.max_frame_len.clamp(MIN_FRAME_LEN, MAX_FRAME_LEN)
    }
}

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Largest frame the server may send, in bytes.
    pub max_frame_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}
