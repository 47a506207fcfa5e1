//! Error types for the protocol layer.
//!
//! Each crate in Murmur defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in turning envelopes or
//! payloads into bytes (or back), not in networking or the registry.

/// Errors that can occur in the protocol layer.
///
/// The wire variants (`Truncated` through `InvalidBody`) describe a
/// malformed envelope. A connection that produces one is treated as dead by
/// the server; it never affects other connections.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer ended before the fixed-size header was complete.
    #[error("truncated envelope: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// The type tag is not one this protocol revision knows.
    #[error("unknown envelope tag {0:#04x}")]
    UnknownTag(u8),

    /// The personal flag byte was neither 0 nor 1.
    #[error("invalid personal flag {0:#04x}")]
    InvalidFlag(u8),

    /// The declared body length does not match the bytes that follow it.
    #[error("body length mismatch: declared {declared}, found {found}")]
    LengthMismatch { declared: usize, found: usize },

    /// The body does not fit the rules for its tag (e.g. a Ping with a
    /// body, or a non-UTF-8 kick reason).
    #[error("invalid body: {0}")]
    InvalidBody(String),

    /// The body is larger than the 4-byte length field can describe.
    #[error("body too large: {0} bytes")]
    BodyTooLarge(usize),

    /// Serializing an application payload failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserializing an application payload failed.
    ///
    /// Common causes: malformed JSON, missing required fields, or a peer
    /// speaking a different payload type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
