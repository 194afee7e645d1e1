//! # Skerry Messaging Layer
//!
//! Direct-dispatch subsystem of the skerry object-messaging runtime.
//! Clients and servers exchange binary frames over streaming sockets to
//! invoke methods on remotely exposed objects; this crate decides, for every
//! inbound frame, which local endpoint receives it, under which negotiated
//! capabilities, and with which fallback when the peer lacks a feature.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │                Application Objects                  │
//! │      (remote proxies and server-bound objects)     │
//! ├────────────────────────────────────────────────────┤
//! │   DirectDispatchRegistry (uid → endpoint routing)  │
//! │   • weak-reference registries, lazy pruning        │
//! │   • bound-then-remote dispatch with fallback       │
//! ├────────────────────────────────────────────────────┤
//! │   StreamContext (per-connection negotiation)       │
//! │   • local/remote capability maps                   │
//! │   • metaobject cache, send and receive halves      │
//! ├────────────────────────────────────────────────────┤
//! │   Frame hooks + wire codec                         │
//! │   • recipient uid appended at the body tail        │
//! │   • extracted symmetrically on reception           │
//! └────────────────────────────────────────────────────┘
//! ```
//!
//! ## Components
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | [`StreamContext`] | Capability negotiation and metaobject cache for one stream |
//! | [`DirectDispatchRegistry`] | Routes inbound call frames to the endpoint named by the recipient uid |
//! | [`MessageSocket`] | The socket-facing seam; its `send` augments outbound frames |
//! | [`wire`] | Binary frame codec |
//!
//! A `false` from the dispatch path always means "hand the frame to the
//! legacy service/object-id router"; the fast path is best-effort by design.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

// Re-export core types for convenience
pub use skerry_core::{
    DynValue, FromDynValue, MetaObject, OBJECT_UID_LEN, ObjectUid, ObjectUidError,
};

// =============================================================================
// Modules
// =============================================================================

/// Capability names, defaults and the environment overlay.
pub mod capability;

/// Endpoint registries and the direct dispatch entry point.
pub mod dispatch;

/// The frame model as seen by the dispatch core.
pub mod message;

/// The socket seam and the outbound/inbound frame hooks.
pub mod socket;

/// Per-connection stream state.
pub mod stream;

/// Binary frame codec.
pub mod wire;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use capability::{
    CAPABILITY_ENV_VAR, CapabilityMap, apply_capability_overlay, capability_names,
    default_capabilities, merge_capabilities,
};
pub use dispatch::{
    DirectDispatchRegistry, DispatchError, EndpointRegistry, MessageEndpoint,
    can_be_directly_dispatched,
};
pub use message::{Body, Message, MessageKind, message_flags, object_ids, service_ids};
pub use socket::{MessageSocket, SocketHandle, route_received};
pub use stream::{CacheError, StreamContext};
pub use wire::{
    HEADER_SIZE, MAX_BODY_SIZE, MESSAGE_MAGIC, WIRE_VERSION, WireError, decode_message,
    encode_message, try_decode_message,
};
