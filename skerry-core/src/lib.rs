//! # Skerry Core Types
//!
//! Foundation types shared by every layer of the skerry object-messaging
//! runtime:
//!
//! - [`ObjectUid`]: 20-byte identifier naming one live object on a connection
//! - [`DynValue`]: erased-typed value used for capability negotiation
//! - [`MetaObject`]: opaque schema blob cached per transport stream
//!
//! This crate carries no networking or locking; the messaging layer builds
//! on top of it.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

/// 20-byte object identifiers.
pub mod uid;

/// Dynamically-typed capability values.
pub mod value;

/// Opaque metaobject payloads.
pub mod meta;

pub use meta::MetaObject;
pub use uid::{OBJECT_UID_LEN, ObjectUid, ObjectUidError};
pub use value::{DynValue, FromDynValue};
