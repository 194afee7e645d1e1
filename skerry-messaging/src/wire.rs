//! Binary frame codec.
//!
//! Frame format:
//! `[magic:4][id:4][body_len:4][version:2][kind:1][flags:1][service:4][object:4][action:4][body:N]`
//!
//! All header fields are little-endian. `body_len` covers the full body,
//! including a recipient-uid tail when the sender appended one — a reader
//! that stops at its documented payload length never sees the tail, which is
//! what keeps the augmentation invisible to pre-handshake peers.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::message::{Body, Message, MessageKind};

/// Magic cookie opening every frame.
pub const MESSAGE_MAGIC: u32 = 0x534b_5259;

/// Wire protocol version.
pub const WIRE_VERSION: u16 = 1;

/// Header size: 4 (magic) + 4 (id) + 4 (body_len) + 2 (version) + 1 (kind)
/// + 1 (flags) + 4 (service) + 4 (object) + 4 (action) = 28 bytes.
pub const HEADER_SIZE: usize = 28;

/// Maximum body size (8 MiB).
///
/// Frames larger than this are rejected to bound memory per connection.
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Wire format error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Not enough data to parse the frame.
    #[error("insufficient data: need {needed} bytes, have {have}")]
    InsufficientData {
        /// Minimum bytes required to parse.
        needed: usize,
        /// Actual bytes available.
        have: usize,
    },

    /// The magic cookie did not match.
    #[error("bad magic: expected {MESSAGE_MAGIC:#010x}, got {actual:#010x}")]
    BadMagic {
        /// The value found where the magic was expected.
        actual: u32,
    },

    /// The peer speaks a protocol version this build does not.
    #[error("unsupported wire version {version}")]
    UnsupportedVersion {
        /// Version field from the header.
        version: u16,
    },

    /// The kind field held an unknown code.
    #[error("unknown message kind code {code}")]
    UnknownKind {
        /// The rejected code.
        code: u8,
    },

    /// Body exceeds [`MAX_BODY_SIZE`].
    #[error("body too large: {size} bytes (max {MAX_BODY_SIZE})")]
    BodyTooLarge {
        /// Declared body size in bytes.
        size: usize,
    },
}

/// Serialize a message into one contiguous frame.
///
/// # Errors
///
/// Returns [`WireError::BodyTooLarge`] if the body exceeds [`MAX_BODY_SIZE`].
pub fn encode_message(message: &Message) -> Result<Bytes, WireError> {
    let body_len = message.body().len();
    if body_len > MAX_BODY_SIZE {
        return Err(WireError::BodyTooLarge { size: body_len });
    }

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + body_len);
    frame.put_u32_le(MESSAGE_MAGIC);
    frame.put_u32_le(message.id());
    frame.put_u32_le(body_len as u32);
    frame.put_u16_le(WIRE_VERSION);
    frame.put_u8(message.kind().wire_code());
    frame.put_u8(message.flags());
    frame.put_u32_le(message.service());
    frame.put_u32_le(message.object());
    frame.put_u32_le(message.action());
    for segment in message.body().segments() {
        frame.extend_from_slice(segment);
    }
    Ok(frame.freeze())
}

/// Deserialize one complete frame.
///
/// Returns the message and the number of bytes consumed. The decoded
/// message's recipient slot is empty; extracting a uid from the body tail is
/// the dispatch layer's job.
///
/// # Errors
///
/// Any [`WireError`]; in particular [`WireError::InsufficientData`] when the
/// input holds less than one full frame.
pub fn decode_message(data: &[u8]) -> Result<(Message, usize), WireError> {
    match try_decode_message(data)? {
        Some(decoded) => Ok(decoded),
        None => Err(WireError::InsufficientData {
            needed: needed_len(data),
            have: data.len(),
        }),
    }
}

/// Try to deserialize from a buffer that may hold a partial frame.
///
/// Returns `Ok(None)` when more data is needed (not an error in streaming
/// reads), `Ok(Some((message, consumed)))` on a complete frame.
///
/// # Errors
///
/// Malformed input: bad magic, unsupported version, unknown kind, oversized
/// body.
pub fn try_decode_message(data: &[u8]) -> Result<Option<(Message, usize)>, WireError> {
    if data.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &data[..HEADER_SIZE];
    let magic = header.get_u32_le();
    if magic != MESSAGE_MAGIC {
        return Err(WireError::BadMagic { actual: magic });
    }
    let id = header.get_u32_le();
    let body_len = header.get_u32_le() as usize;
    let version = header.get_u16_le();
    if version != WIRE_VERSION {
        return Err(WireError::UnsupportedVersion { version });
    }
    let kind_code = header.get_u8();
    let kind = MessageKind::from_wire_code(kind_code)
        .ok_or(WireError::UnknownKind { code: kind_code })?;
    let flags = header.get_u8();
    let service = header.get_u32_le();
    let object = header.get_u32_le();
    let action = header.get_u32_le();

    if body_len > MAX_BODY_SIZE {
        return Err(WireError::BodyTooLarge { size: body_len });
    }

    let frame_len = HEADER_SIZE + body_len;
    if data.len() < frame_len {
        return Ok(None);
    }

    let body = Body::from_bytes(Bytes::copy_from_slice(&data[HEADER_SIZE..frame_len]));
    let message = Message::from_wire_parts(id, kind, flags, service, object, action, body);
    Ok(Some((message, frame_len)))
}

fn needed_len(data: &[u8]) -> usize {
    if data.len() < HEADER_SIZE {
        return HEADER_SIZE;
    }
    let declared = u32::from_le_bytes([data[8], data[9], data[10], data[11]]) as usize;
    HEADER_SIZE + declared
}
