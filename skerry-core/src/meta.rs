//! Opaque metaobject payloads.

use std::hash::{Hash, Hasher};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The serialized schema of a remote object's method/signal/property table.
///
/// The dispatch layer never looks inside: a metaobject is an opaque blob
/// with content equality and a stable hash, expensive to put on the wire and
/// therefore cached per stream (see the messaging crate's stream context).
/// Clones share the underlying buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaObject {
    payload: Bytes,
}

impl MetaObject {
    /// Wrap an already-serialized schema payload.
    pub fn from_bytes(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The raw serialized schema.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Size of the serialized schema in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

// Content hash, consistent with the derived content equality.
impl Hash for MetaObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.as_ref().hash(state);
    }
}
