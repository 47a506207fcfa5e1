//! The `Message` trait: what an application payload must be able to do.

use serde::{Serialize, de::DeserializeOwned};

/// An application payload type carried inside app envelopes.
///
/// Servers and clients are generic over one `Message` type. Anything that
/// serde can round-trip and that can be shared across tasks qualifies; the
/// only extra hook is [`is_blank`](Message::is_blank).
pub trait Message:
    Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    /// Returns `true` if this value is not worth transmitting.
    ///
    /// Clients silently drop blank messages instead of sending them.
    /// Default: nothing is blank.
    fn is_blank(&self) -> bool {
        false
    }
}

impl Message for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Message for Vec<u8> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

#[cfg(feature = "json")]
impl Message for serde_json::Value {
    fn is_blank(&self) -> bool {
        self.is_null()
    }
}
