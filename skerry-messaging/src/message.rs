//! The frame model as seen by the dispatch core.
//!
//! A [`Message`] is one frame: a small fixed header (id, kind, flags,
//! service/object/action ids), a variable-length [`Body`], and a
//! *recipient-uid* slot that never crosses the wire in the header — when
//! direct dispatch is negotiated the uid rides the tail of the body instead
//! (see [`crate::socket`] and [`crate::dispatch`]).

use std::sync::atomic::{AtomicU32, Ordering};

use bytes::{Bytes, BytesMut};
use skerry_core::ObjectUid;

/// Reserved service ids.
pub mod service_ids {
    /// The server service itself, target of connection-level control calls.
    pub const SERVER: u32 = 0;
}

/// Reserved object ids.
pub mod object_ids {
    /// No object; never a legitimate call target.
    pub const NONE: u32 = 0;
    /// The main object of a service.
    pub const MAIN: u32 = 1;
}

/// Flag bits carried in the header, meaningful only when the
/// `MessageFlags` capability is shared. Opaque to the dispatch core.
pub mod message_flags {
    /// The payload carries its own type signature.
    pub const RETURN_TYPE: u8 = 0x01;
    /// The payload is a dynamic value rather than a typed one.
    pub const DYNAMIC_PAYLOAD: u8 = 0x02;
}

/// The kind of a frame, as a stable wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Method invocation on a remote object.
    Call,
    /// Successful reply to a call.
    Reply,
    /// Error reply to a call.
    Error,
    /// Fire-and-forget invocation.
    Post,
    /// Signal notification.
    Event,
    /// Capability map exchange.
    Capability,
    /// Cancelation request for an in-flight call.
    Cancel,
    /// Acknowledgment that a call was canceled.
    Canceled,
}

impl MessageKind {
    /// The code written on the wire.
    pub const fn wire_code(self) -> u8 {
        match self {
            MessageKind::Call => 1,
            MessageKind::Reply => 2,
            MessageKind::Error => 3,
            MessageKind::Post => 4,
            MessageKind::Event => 5,
            MessageKind::Capability => 6,
            MessageKind::Cancel => 7,
            MessageKind::Canceled => 8,
        }
    }

    /// Decode a wire code.
    pub const fn from_wire_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(MessageKind::Call),
            2 => Some(MessageKind::Reply),
            3 => Some(MessageKind::Error),
            4 => Some(MessageKind::Post),
            5 => Some(MessageKind::Event),
            6 => Some(MessageKind::Capability),
            7 => Some(MessageKind::Cancel),
            8 => Some(MessageKind::Canceled),
            _ => None,
        }
    }
}

/// A chunked frame body.
///
/// The body is a sequence of [`Bytes`] segments. Appending a chunk is
/// zero-copy sub-buffer chaining: existing segments are never touched, which
/// is what lets the outbound hook append the recipient uid without copying
/// the payload (and lets pre-handshake readers parse the documented payload
/// while remaining blind to the tail).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    segments: Vec<Bytes>,
    len: usize,
}

impl Body {
    /// Empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Body made of a single segment.
    pub fn from_bytes(payload: impl Into<Bytes>) -> Self {
        let segment: Bytes = payload.into();
        let len = segment.len();
        if len == 0 {
            return Self::new();
        }
        Self {
            segments: vec![segment],
            len,
        }
    }

    /// Total length across all segments.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the body holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append a segment without copying the existing body.
    pub fn push_chunk(&mut self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        self.len += chunk.len();
        self.segments.push(chunk);
    }

    /// Append raw bytes (copied into a fresh segment).
    pub fn extend_from_slice(&mut self, slice: &[u8]) {
        self.push_chunk(Bytes::copy_from_slice(slice));
    }

    /// Read the trailing `out.len()` bytes of the body, across segment
    /// boundaries. Returns `false` (leaving `out` unspecified) when the body
    /// is shorter than the requested tail.
    pub fn read_tail(&self, out: &mut [u8]) -> bool {
        if out.len() > self.len {
            return false;
        }
        let mut remaining = out.len();
        for segment in self.segments.iter().rev() {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(segment.len());
            let src = &segment[segment.len() - take..];
            out[remaining - take..remaining].copy_from_slice(src);
            remaining -= take;
        }
        true
    }

    /// Flatten into one contiguous buffer. Single-segment bodies are
    /// returned without copying.
    pub fn to_bytes(&self) -> Bytes {
        match self.segments.as_slice() {
            [] => Bytes::new(),
            [single] => single.clone(),
            segments => {
                let mut flat = BytesMut::with_capacity(self.len);
                for segment in segments {
                    flat.extend_from_slice(segment);
                }
                flat.freeze()
            }
        }
    }

    /// The underlying segments, front to back.
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }
}

static NEXT_MESSAGE_ID: AtomicU32 = AtomicU32::new(1);

/// One frame exchanged over a stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    id: u32,
    kind: MessageKind,
    flags: u8,
    service: u32,
    object: u32,
    action: u32,
    body: Body,
    recipient_uid: Option<ObjectUid>,
}

impl Message {
    /// Build a frame with a fresh process-unique id.
    pub fn new(kind: MessageKind, service: u32, object: u32, action: u32) -> Self {
        Self {
            id: NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            flags: 0,
            service,
            object,
            action,
            body: Body::new(),
            recipient_uid: None,
        }
    }

    /// Build a call frame.
    pub fn call(service: u32, object: u32, action: u32) -> Self {
        Self::new(MessageKind::Call, service, object, action)
    }

    pub(crate) fn from_wire_parts(
        id: u32,
        kind: MessageKind,
        flags: u8,
        service: u32,
        object: u32,
        action: u32,
        body: Body,
    ) -> Self {
        Self {
            id,
            kind,
            flags,
            service,
            object,
            action,
            body,
            recipient_uid: None,
        }
    }

    /// Frame id, unique per process; used for logging and correlation.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The frame kind.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Header flag bits (see [`message_flags`]).
    pub fn flags(&self) -> u8 {
        self.flags
    }

    /// Set the header flag bits.
    pub fn set_flags(&mut self, flags: u8) {
        self.flags = flags;
    }

    /// Numeric id of the destination service.
    pub fn service(&self) -> u32 {
        self.service
    }

    /// Numeric id of the destination object within the service.
    pub fn object(&self) -> u32 {
        self.object
    }

    /// Numeric id of the method, signal or property being addressed.
    pub fn action(&self) -> u32 {
        self.action
    }

    /// The frame body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Mutable access to the frame body.
    pub fn body_mut(&mut self) -> &mut Body {
        &mut self.body
    }

    /// Replace the frame body.
    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    /// The recipient uid, once known.
    ///
    /// Empty on a freshly received frame; populated by the dispatch layer
    /// after tail extraction, or by the sender before transmission.
    pub fn recipient_uid(&self) -> Option<ObjectUid> {
        self.recipient_uid
    }

    /// Name the endpoint this frame is for.
    pub fn set_recipient_uid(&mut self, uid: ObjectUid) {
        self.recipient_uid = Some(uid);
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "message {{ id={}, kind={:?}, service={}, object={}, action={}, body_len={}",
            self.id,
            self.kind,
            self.service,
            self.object,
            self.action,
            self.body.len()
        )?;
        if let Some(uid) = &self.recipient_uid {
            write!(f, ", recipient={uid}")?;
        }
        write!(f, " }}")
    }
}
