//! Binary envelope schema.
//!
//! The layout is fixed and language independent. All integers are
//! big-endian:
//!
//! ```text
//! offset  size  field
//! 0       1     tag       0 app, 1 ping, 2 pong, 3 disconnect,
//!                         4 assign-id, 5 kicked
//! 1       8     sender    ClientId
//! 9       1     personal  0 or 1
//! 10      4     length    body length n
//! 14      n     body
//! ```
//!
//! Ping, Pong and Disconnect carry an empty body. AssignId carries the
//! 8-byte id. Kicked carries a UTF-8 reason. The transport frames each
//! envelope, so a decoded buffer must contain exactly one envelope: trailing
//! bytes are as malformed as missing ones.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{ClientId, Control, Envelope, Payload, ProtocolError};

/// Size of the fixed header that precedes the body.
pub const HEADER_LEN: usize = 14;

const TAG_APP: u8 = 0;
const TAG_PING: u8 = 1;
const TAG_PONG: u8 = 2;
const TAG_DISCONNECT: u8 = 3;
const TAG_ASSIGN_ID: u8 = 4;
const TAG_KICKED: u8 = 5;

const NO_BODY: &[u8] = &[];

/// Serializes an envelope into a single frame.
///
/// # Errors
/// Returns [`ProtocolError::BodyTooLarge`] if the body does not fit the
/// 4-byte length field.
pub fn encode(envelope: &Envelope) -> Result<Bytes, ProtocolError> {
    let (tag, body): (u8, &[u8]) = match &envelope.payload {
        Payload::App(data) => (TAG_APP, data.as_slice()),
        Payload::Control(Control::Ping) => (TAG_PING, NO_BODY),
        Payload::Control(Control::Pong) => (TAG_PONG, NO_BODY),
        Payload::Control(Control::Disconnect) => (TAG_DISCONNECT, NO_BODY),
        Payload::Control(Control::AssignId(id)) => {
            return Ok(frame(
                TAG_ASSIGN_ID,
                envelope,
                &id.0.to_be_bytes(),
            ));
        }
        Payload::Control(Control::Kicked { reason }) => {
            (TAG_KICKED, reason.as_bytes())
        }
    };

    if u32::try_from(body.len()).is_err() {
        return Err(ProtocolError::BodyTooLarge(body.len()));
    }
    Ok(frame(tag, envelope, body))
}

fn frame(tag: u8, envelope: &Envelope, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + body.len());
    buf.put_u8(tag);
    buf.put_u64(envelope.sender.0);
    buf.put_u8(u8::from(envelope.personal));
    // Callers have already checked that the length fits.
    buf.put_u32(body.len() as u32);
    buf.put_slice(body);
    buf.freeze()
}

/// Parses one frame back into an envelope.
///
/// # Errors
/// Returns a [`ProtocolError`] describing the first violation found:
/// truncated header, unknown tag, bad personal flag, a body length that
/// disagrees with the frame, or a body that breaks its tag's rules.
pub fn decode(mut data: &[u8]) -> Result<Envelope, ProtocolError> {
    if data.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            got: data.len(),
        });
    }

    let tag = data.get_u8();
    let sender = ClientId(data.get_u64());
    let personal = match data.get_u8() {
        0 => false,
        1 => true,
        other => return Err(ProtocolError::InvalidFlag(other)),
    };
    let declared = data.get_u32() as usize;
    if declared != data.remaining() {
        return Err(ProtocolError::LengthMismatch {
            declared,
            found: data.remaining(),
        });
    }
    let body = data;

    let payload = match tag {
        TAG_APP => Payload::App(body.to_vec()),
        TAG_PING => Payload::Control(empty(body, Control::Ping)?),
        TAG_PONG => Payload::Control(empty(body, Control::Pong)?),
        TAG_DISCONNECT => {
            Payload::Control(empty(body, Control::Disconnect)?)
        }
        TAG_ASSIGN_ID => {
            let raw: [u8; 8] = body.try_into().map_err(|_| {
                ProtocolError::InvalidBody(format!(
                    "assign-id body must be 8 bytes, got {}",
                    body.len()
                ))
            })?;
            Payload::Control(Control::AssignId(ClientId(u64::from_be_bytes(
                raw,
            ))))
        }
        TAG_KICKED => {
            let reason = std::str::from_utf8(body).map_err(|e| {
                ProtocolError::InvalidBody(format!("kick reason: {e}"))
            })?;
            Payload::Control(Control::Kicked {
                reason: reason.to_string(),
            })
        }
        other => return Err(ProtocolError::UnknownTag(other)),
    };

    Ok(Envelope {
        sender,
        personal,
        payload,
    })
}

fn empty(body: &[u8], control: Control) -> Result<Control, ProtocolError> {
    if body.is_empty() {
        Ok(control)
    } else {
        Err(ProtocolError::InvalidBody(format!(
            "{control:?} must not carry a body ({} bytes found)",
            body.len()
        )))
    }
}
