//! Direct message dispatch.
//!
//! "Direct dispatch" delivers an inbound frame straight to the endpoint
//! named by the recipient uid carried at the tail of the frame body,
//! bypassing the legacy service/object-id router. The mechanism exists
//! because the legacy router could send messages to objects that were not
//! the destination: nothing in the old protocol identified objects uniquely.
//!
//! Everything here is best-effort: any failure returns `false` and the
//! caller falls back to the legacy router, which is always reachable.

mod registry;

pub use registry::EndpointRegistry;

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use skerry_core::{OBJECT_UID_LEN, ObjectUid};

use crate::message::{Message, MessageKind, object_ids, service_ids};
use crate::socket::SocketHandle;
use crate::stream::StreamContext;

/// An object handling network traffic for one application-level object:
/// a remote proxy on the client side, or a bound object on the server side.
///
/// Endpoints own their lifetime. The dispatch registry keeps only weak
/// references, so dropping the endpoint is sufficient to stop receiving.
pub trait MessageEndpoint: Send + Sync {
    /// Stable identifier of the object this endpoint fronts.
    fn uid(&self) -> ObjectUid;

    /// Handle one inbound frame, with the socket it arrived on.
    ///
    /// Runs on a shared I/O executor thread; implementations hand off long
    /// work. The registry lock is not held during this call, so handlers may
    /// re-enter the registry (look up peers, unregister themselves).
    ///
    /// # Errors
    ///
    /// Any error is logged at the dispatch boundary and degrades the frame
    /// to the legacy router; it never reaches the executor.
    fn on_message(&self, message: &Message, socket: &SocketHandle) -> Result<(), DispatchError>;
}

/// Errors surfaced by endpoint handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The endpoint failed to process the frame.
    #[error("endpoint handler failed: {message}")]
    Handler {
        /// Details about the handler failure.
        message: String,
    },
}

/// Whether `message` is eligible for the direct-dispatch fast path on the
/// stream described by `context`.
///
/// Only calls are routed directly for now; replies and the rest stay on the
/// legacy router. Frames aimed at the main or null object, or at the server
/// service, keep the legacy path too — those recipients are not identified
/// by uid.
pub fn can_be_directly_dispatched(message: &Message, context: &StreamContext) -> bool {
    message.kind() == MessageKind::Call
        && message.object() != object_ids::MAIN
        && message.object() != object_ids::NONE
        && message.service() != service_ids::SERVER
        && context.is_direct_dispatch_allowed()
}

type SharedEndpoint = Arc<dyn MessageEndpoint>;
type Registry = Mutex<EndpointRegistry<dyn MessageEndpoint>>;

/// Routes received frames to the registered endpoint matching their
/// recipient uid.
///
/// One registry per endpoint kind: remote proxies and server-bound objects.
/// The two kinds share nothing but the ordered fallback in
/// [`dispatch_message`](Self::dispatch_message).
#[derive(Debug, Default)]
pub struct DirectDispatchRegistry {
    remote_objects: Registry,
    bound_objects: Registry,
}

impl DirectDispatchRegistry {
    /// Empty registry pair.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(registry: &Registry) -> MutexGuard<'_, EndpointRegistry<dyn MessageEndpoint>> {
        registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a remote-proxy endpoint under its own uid.
    pub fn register_remote_object(&self, endpoint: SharedEndpoint) {
        Self::lock(&self.remote_objects).add(endpoint.uid(), &endpoint);
    }

    /// Register a server-bound endpoint under its own uid.
    pub fn register_bound_object(&self, endpoint: SharedEndpoint) {
        Self::lock(&self.bound_objects).add(endpoint.uid(), &endpoint);
    }

    /// Unregister a remote-proxy endpoint.
    pub fn unregister_remote_object(&self, endpoint: &dyn MessageEndpoint) {
        Self::lock(&self.remote_objects).remove(&endpoint.uid());
    }

    /// Unregister a server-bound endpoint.
    pub fn unregister_bound_object(&self, endpoint: &dyn MessageEndpoint) {
        Self::lock(&self.bound_objects).remove(&endpoint.uid());
    }

    /// Look up the remote-proxy endpoint registered under `uid`.
    pub fn find_remote_object(&self, uid: &ObjectUid) -> Option<SharedEndpoint> {
        Self::lock(&self.remote_objects).find(uid)
    }

    /// Look up the server-bound endpoint registered under `uid`.
    pub fn find_bound_object(&self, uid: &ObjectUid) -> Option<SharedEndpoint> {
        Self::lock(&self.bound_objects).find(uid)
    }

    /// Deliver a received frame to the endpoint named by its body tail.
    ///
    /// Expects a frame whose recipient slot is still empty and whose
    /// eligibility ([`can_be_directly_dispatched`]) the caller has already
    /// checked. Extracts the trailing [`OBJECT_UID_LEN`] body bytes, records
    /// them in the recipient slot, and tries the bound-object registry, then
    /// the remote-object one.
    ///
    /// Returns `true` when an endpoint was invoked and processed the frame.
    /// `false` means the caller must hand the frame to the legacy router: a
    /// short body, an unknown uid, or a failing handler all degrade there.
    /// Failures (including handler panics) are logged and contained; this
    /// runs on the I/O executor and must never unwind into it.
    pub fn dispatch_message(&self, message: &mut Message, socket: &SocketHandle) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch_inner(message, socket)));
        match outcome {
            Ok(delivered) => delivered,
            Err(panic) => {
                tracing::error!(
                    reason = panic_reason(panic.as_ref()),
                    "direct dispatch failed"
                );
                false
            }
        }
    }

    fn dispatch_inner(&self, message: &mut Message, socket: &SocketHandle) -> bool {
        if let Some(uid) = message.recipient_uid() {
            // A populated slot on the receive path is a bug upstream, not a
            // routing miss.
            debug_assert!(
                false,
                "received message {} already routed to {uid}",
                message.id()
            );
            tracing::warn!(
                message_id = message.id(),
                recipient = %uid,
                "message already carries a recipient uid, refusing to re-route"
            );
            return false;
        }

        let Some(uid) = extract_recipient_uid(message) else {
            return false;
        };
        message.set_recipient_uid(uid);

        tracing::debug!(message_id = message.id(), recipient = %uid, "direct dispatch");
        if let Some(delivered) = deliver(&self.bound_objects, &uid, message, socket) {
            return delivered;
        }
        if let Some(delivered) = deliver(&self.remote_objects, &uid, message, socket) {
            return delivered;
        }

        tracing::warn!(
            message = %message,
            "no endpoint for recipient uid, falling back to legacy dispatch"
        );
        false
    }
}

/// Read the recipient uid from the trailing bytes of the frame body.
///
/// The tail placement is deliberate: a reader that stops at its documented
/// payload length never sees the uid, so pre-handshake peers parse the body
/// unchanged.
fn extract_recipient_uid(message: &Message) -> Option<ObjectUid> {
    let mut raw = [0u8; OBJECT_UID_LEN];
    if !message.body().read_tail(&mut raw) {
        return None;
    }
    let uid = ObjectUid::from_bytes(raw);
    // A null uid cannot have been appended by a conforming sender. It
    // matches no registered endpoint, so release builds fall through to the
    // legacy router.
    debug_assert!(!uid.is_null(), "null recipient uid on the wire");
    Some(uid)
}

/// `Some(delivered)` when `uid` resolved in `registry`, `None` when it is
/// not registered there.
///
/// The registry lock is released before `on_message` runs; the strong
/// reference pins the endpoint across the call, and the handler is free to
/// re-enter the registry.
fn deliver(
    registry: &Registry,
    uid: &ObjectUid,
    message: &Message,
    socket: &SocketHandle,
) -> Option<bool> {
    let endpoint = DirectDispatchRegistry::lock(registry).find(uid);
    let endpoint = endpoint?;
    match endpoint.on_message(message, socket) {
        Ok(()) => Some(true),
        Err(error) => {
            tracing::error!(
                message_id = message.id(),
                recipient = %uid,
                error = %error,
                "endpoint handler failed"
            );
            Some(false)
        }
    }
}

fn panic_reason(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityMap, capability_names};
    use skerry_core::DynValue;

    // Explicit maps, so the tests do not depend on the process environment
    // overlay baked into the default table.
    fn negotiated_context() -> StreamContext {
        let capabilities = CapabilityMap::from([
            (
                capability_names::OBJECT_PTR_UID.to_owned(),
                DynValue::from(true),
            ),
            (
                capability_names::DIRECT_MESSAGE_DISPATCH.to_owned(),
                DynValue::from(true),
            ),
        ]);
        let context = StreamContext::with_local_capabilities(capabilities.clone());
        context.update_remote_capabilities(&capabilities);
        context
    }

    #[test]
    fn test_calls_to_plain_objects_are_eligible() {
        let context = negotiated_context();
        let message = Message::call(7, 3, 12);
        assert!(can_be_directly_dispatched(&message, &context));
    }

    #[test]
    fn test_non_calls_are_not_eligible() {
        let context = negotiated_context();
        for kind in [
            MessageKind::Reply,
            MessageKind::Error,
            MessageKind::Post,
            MessageKind::Event,
            MessageKind::Capability,
            MessageKind::Cancel,
            MessageKind::Canceled,
        ] {
            let message = Message::new(kind, 7, 3, 12);
            assert!(!can_be_directly_dispatched(&message, &context), "{kind:?}");
        }
    }

    #[test]
    fn test_reserved_targets_are_not_eligible() {
        let context = negotiated_context();
        assert!(!can_be_directly_dispatched(
            &Message::call(7, object_ids::MAIN, 12),
            &context
        ));
        assert!(!can_be_directly_dispatched(
            &Message::call(7, object_ids::NONE, 12),
            &context
        ));
        assert!(!can_be_directly_dispatched(
            &Message::call(service_ids::SERVER, 3, 12),
            &context
        ));
    }

    #[test]
    fn test_context_gate() {
        let context = negotiated_context();
        let map = CapabilityMap::from([(
            capability_names::DIRECT_MESSAGE_DISPATCH.to_owned(),
            DynValue::from(false),
        )]);
        context.update_remote_capabilities(&map);

        let message = Message::call(7, 3, 12);
        assert!(!can_be_directly_dispatched(&message, &context));
    }
}
