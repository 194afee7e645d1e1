//! Uid-keyed endpoint registry with weak-reference semantics.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Weak};

use skerry_core::ObjectUid;

/// Registry of the endpoints handling network traffic for exposed objects,
/// keyed by [`ObjectUid`].
///
/// Entries are weak references: endpoints keep their own lifetime, and
/// dropping one is enough for it to stop resolving here — no deregistration
/// is required for correctness, only for promptness. A lookup that observes
/// a dead reference erases it on the spot (lazy pruning), so the map does
/// not accumulate tombstones on hot uids.
///
/// The registry itself is not synchronized;
/// [`DirectDispatchRegistry`](super::DirectDispatchRegistry) wraps one per
/// endpoint kind in a mutex.
pub struct EndpointRegistry<E: ?Sized> {
    entries: HashMap<ObjectUid, Weak<E>>,
}

// Manual impl: the derive would demand `E: Debug`, which trait-object
// endpoints do not provide.
impl<E: ?Sized> std::fmt::Debug for EndpointRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("entries", &self.entries)
            .finish()
    }
}

impl<E: ?Sized> Default for EndpointRegistry<E> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<E: ?Sized> EndpointRegistry<E> {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a weak reference to `endpoint` under `uid`.
    ///
    /// At most one endpoint owns a uid at any instant. Registering a
    /// *different* live endpoint under an in-use uid is a programmer error:
    /// the first registration wins and the call degrades to a logged no-op.
    /// Registering the same endpoint again, or over a dead entry, is fine.
    pub fn add(&mut self, uid: ObjectUid, endpoint: &Arc<E>) {
        match self.entries.entry(uid) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(endpoint));
                tracing::debug!(uid = %uid, "registered endpoint");
            }
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                None => {
                    slot.insert(Arc::downgrade(endpoint));
                    tracing::debug!(uid = %uid, "registered endpoint over dead entry");
                }
                Some(existing) if Arc::ptr_eq(&existing, endpoint) => {
                    tracing::debug!(uid = %uid, "endpoint already registered, skipped");
                }
                Some(_) => {
                    debug_assert!(false, "one endpoint per uid: {uid} is taken");
                    tracing::warn!(
                        uid = %uid,
                        "registration skipped: a different live endpoint owns this uid"
                    );
                }
            },
        }
    }

    /// Erase any entry under `uid`.
    pub fn remove(&mut self, uid: &ObjectUid) {
        self.entries.remove(uid);
        tracing::debug!(uid = %uid, "unregistered endpoint");
    }

    /// A strong reference to the live endpoint under `uid`, if any.
    ///
    /// A dead entry is erased before returning `None`.
    pub fn find(&mut self, uid: &ObjectUid) -> Option<Arc<E>> {
        match self.entries.entry(*uid) {
            Entry::Occupied(slot) => match slot.get().upgrade() {
                Some(endpoint) => Some(endpoint),
                None => {
                    slot.remove();
                    None
                }
            },
            Entry::Vacant(_) => None,
        }
    }

    /// Number of entries, dead ones included until a lookup prunes them.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
