//! The socket seam and the frame-layer dispatch hooks.
//!
//! The wire socket itself (connection establishment, TLS, reconnection)
//! lives outside this crate. [`MessageSocket`] is the slice of it the
//! dispatch layer needs: access to the per-connection [`StreamContext`] and
//! a transmit primitive. The provided [`send`](MessageSocket::send) wraps
//! that primitive with the outbound half of the direct-dispatch wire
//! contract; [`route_received`] is the symmetric inbound hook.

use std::sync::Arc;

use bytes::Bytes;

use crate::dispatch::can_be_directly_dispatched;
use crate::message::Message;
use crate::stream::StreamContext;

/// The socket surface the dispatch layer depends on.
///
/// Implemented by the transport's socket type; tests implement it with a
/// recording mock.
pub trait MessageSocket: Send + Sync {
    /// The per-connection negotiation state this socket carries.
    fn stream_context(&self) -> &StreamContext;

    /// Hand a fully-prepared frame to the transport for transmission.
    ///
    /// Returns `false` when the frame could not be queued (socket closed).
    fn send_raw(&self, message: Message) -> bool;

    /// Send a frame, applying the direct-dispatch augmentation first.
    ///
    /// When the negotiated capabilities permit direct dispatch for this
    /// frame, its recipient uid is appended to the body tail so the peer can
    /// route it without consulting the legacy router. The existing body is
    /// never copied or modified; the uid rides a chained sub-buffer.
    fn send(&self, message: Message) -> bool {
        let message = append_recipient_uid(message, self.stream_context());
        self.send_raw(message)
    }
}

/// Shared handle to a socket, as passed to endpoint handlers.
pub type SocketHandle = Arc<dyn MessageSocket>;

// Outbound half of the wire contract: the last OBJECT_UID_LEN body bytes of
// an eligible call frame are the recipient uid, raw, in the order the uid
// iterates.
fn append_recipient_uid(mut message: Message, context: &StreamContext) -> Message {
    if !can_be_directly_dispatched(&message, context) {
        return message;
    }
    match message.recipient_uid() {
        Some(uid) => {
            message
                .body_mut()
                .push_chunk(Bytes::copy_from_slice(uid.as_bytes()));
        }
        None => {
            debug_assert!(
                false,
                "direct-dispatchable message {} sent without a recipient uid",
                message.id()
            );
            tracing::warn!(
                message_id = message.id(),
                "no recipient uid on an eligible frame; peer will use legacy dispatch"
            );
        }
    }
    message
}

/// Inbound hook: route a received frame to its recipient endpoint.
///
/// Checks eligibility for the stream first — when the negotiated
/// capabilities forbid direct dispatch the frame is left untouched even if
/// it happens to carry a uid tail — then hands the frame to the stream's
/// [`DirectDispatchRegistry`](crate::dispatch::DirectDispatchRegistry).
///
/// Returns `true` when an endpoint consumed the frame. On `false` the
/// caller routes the frame through the legacy dispatcher.
pub fn route_received(message: &mut Message, socket: &SocketHandle) -> bool {
    let context = socket.stream_context();
    if !can_be_directly_dispatched(message, context) {
        return false;
    }
    context
        .direct_dispatch_registry()
        .dispatch_message(message, socket)
}
