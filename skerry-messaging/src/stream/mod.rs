//! Per-connection stream state.
//!
//! A [`StreamContext`] stores the contextual data associated with one
//! point-to-point transport: the capability map we advertised, the one the
//! peer sent, the metaobject cache for both directions, and the memoized
//! "may we bypass the legacy router?" predicate derived from the shared
//! capabilities. It also owns the connection's
//! [`DirectDispatchRegistry`](crate::dispatch::DirectDispatchRegistry).
//!
//! Advertising here only mutates local state; pushing the local map across
//! the wire is a separate protocol step owned by the socket layer.

mod cache;

pub use cache::CacheError;

use std::sync::{Mutex, MutexGuard, PoisonError};

use skerry_core::{DynValue, FromDynValue, MetaObject};

use crate::capability::{self, CapabilityMap, capability_names, merge_capabilities};
use crate::dispatch::DirectDispatchRegistry;
use cache::MetaObjectCache;

/// Contextual data associated with one point-to-point transport stream.
///
/// All capability and cache state lives behind a single mutex; every public
/// operation locks once and never calls back out while holding the lock. The
/// dispatch registry has its own locking and sits outside the mutex.
pub struct StreamContext {
    inner: Mutex<State>,
    dispatch_registry: DirectDispatchRegistry,
}

struct State {
    /// What we advertised to the other end.
    local_capabilities: CapabilityMap,
    /// What the other end advertised to us; empty until its handshake is
    /// absorbed.
    remote_capabilities: CapabilityMap,
    meta_object_cache: MetaObjectCache,
    /// Memoized derived predicate; `None` after any capability mutation.
    direct_dispatch_allowed: Option<bool>,
}

impl State {
    fn invalidate_capability_cache(&mut self) {
        self.direct_dispatch_allowed = None;
    }

    fn capability_or<T: FromDynValue>(map: &CapabilityMap, name: &str, default: T) -> T {
        map.get(name).and_then(T::from_dyn).unwrap_or(default)
    }

    // One side of the shared-capability combinator: absent means "use the
    // default", present-but-unconvertible means the whole combination falls
    // back to the default (None here).
    fn side_capability<T: FromDynValue + Clone>(
        map: &CapabilityMap,
        name: &str,
        default: &T,
    ) -> Option<T> {
        match map.get(name) {
            None => Some(default.clone()),
            Some(value) => value.to::<T>(),
        }
    }

    fn shared_capability<T: FromDynValue + Ord + Clone>(&self, name: &str, default: T) -> T {
        let local = Self::side_capability(&self.local_capabilities, name, &default);
        let remote = Self::side_capability(&self.remote_capabilities, name, &default);
        match (local, remote) {
            (Some(ours), Some(theirs)) => ours.min(theirs),
            _ => default,
        }
    }

    fn direct_dispatch_allowed(&mut self) -> bool {
        if let Some(allowed) = self.direct_dispatch_allowed {
            return allowed;
        }
        let has_object_uid = self.shared_capability(capability_names::OBJECT_PTR_UID, false);
        let has_direct_dispatch =
            self.shared_capability(capability_names::DIRECT_MESSAGE_DISPATCH, false);
        let allowed = has_object_uid && has_direct_dispatch;
        self.direct_dispatch_allowed = Some(allowed);
        allowed
    }
}

impl StreamContext {
    /// A context initialized from the process-wide default capabilities
    /// (environment overlay included).
    pub fn new() -> Self {
        Self::with_local_capabilities(capability::default_capabilities().clone())
    }

    /// A context starting from an explicit local capability map.
    pub fn with_local_capabilities(local_capabilities: CapabilityMap) -> Self {
        Self {
            inner: Mutex::new(State {
                local_capabilities,
                remote_capabilities: CapabilityMap::new(),
                meta_object_cache: MetaObjectCache::default(),
                direct_dispatch_allowed: None,
            }),
            dispatch_registry: DirectDispatchRegistry::new(),
        }
    }

    // Every invariant behind the mutex is re-established before unlock, so a
    // panicking thread leaves consistent state and poisoning is absorbed.
    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set or update one local capability.
    ///
    /// Transmission of the updated map to the peer is a separate protocol
    /// step; this only records what will be (or was) advertised.
    pub fn advertise_capability(&self, name: &str, value: DynValue) {
        let mut state = self.state();
        tracing::debug!(capability = name, value = %value, "advertising local capability");
        state.local_capabilities.insert(name.to_owned(), value);
        state.invalidate_capability_cache();
    }

    /// Set or update a batch of local capabilities.
    pub fn advertise_capabilities(&self, map: &CapabilityMap) {
        let mut state = self.state();
        merge_capabilities(&mut state.local_capabilities, map);
        state.invalidate_capability_cache();
    }

    /// Merge a capability map received from the peer; existing keys are
    /// overwritten, absent keys retained.
    pub fn update_remote_capabilities(&self, map: &CapabilityMap) {
        let mut state = self.state();
        merge_capabilities(&mut state.remote_capabilities, map);
        state.invalidate_capability_cache();
    }

    /// Whether the peer's handshake has been absorbed yet.
    pub fn has_received_remote_capabilities(&self) -> bool {
        !self.state().remote_capabilities.is_empty()
    }

    /// Fetch back one capability we advertised.
    pub fn local_capability(&self, name: &str) -> Option<DynValue> {
        self.state().local_capabilities.get(name).cloned()
    }

    /// Fetch one capability the peer advertised.
    pub fn remote_capability(&self, name: &str) -> Option<DynValue> {
        self.state().remote_capabilities.get(name).cloned()
    }

    /// Typed read of a local capability; `default` on absence or on a value
    /// that does not convert to `T`.
    pub fn local_capability_or<T: FromDynValue>(&self, name: &str, default: T) -> T {
        State::capability_or(&self.state().local_capabilities, name, default)
    }

    /// Typed read of a remote capability; `default` on absence or on a value
    /// that does not convert to `T`.
    pub fn remote_capability_or<T: FromDynValue>(&self, name: &str, default: T) -> T {
        State::capability_or(&self.state().remote_capabilities, name, default)
    }

    /// Snapshot of the local capability map.
    pub fn local_capabilities(&self) -> CapabilityMap {
        self.state().local_capabilities.clone()
    }

    /// Snapshot of the remote capability map.
    pub fn remote_capabilities(&self) -> CapabilityMap {
        self.state().remote_capabilities.clone()
    }

    /// The value both sides can rely on for a capability.
    ///
    /// Each side falls back to `default` when the capability is absent; when
    /// both sides convert to `T` the lesser of the two values wins. A value
    /// that fails to convert on either side yields `default` — conversion
    /// failure is swallowed, never propagated, so an old peer with a
    /// malformed entry degrades instead of erroring.
    pub fn shared_capability<T: FromDynValue + Ord + Clone>(&self, name: &str, default: T) -> T {
        self.state().shared_capability(name, default)
    }

    /// Whether both sides can route call messages by recipient uid.
    ///
    /// `shared(ObjectPtrUID) && shared(DirectMessageDispatch)`, memoized
    /// until the next capability mutation. Recomputation happens under the
    /// same lock as the mutation, so no reader observes a fresh capability
    /// with a stale answer.
    pub fn is_direct_dispatch_allowed(&self) -> bool {
        self.state().direct_dispatch_allowed()
    }

    /// Cache a metaobject on the send side.
    ///
    /// Returns `(token, inserted)`: the token the peer will use to refer to
    /// `meta_object` on this stream, and whether this call inserted it.
    /// Tokens start at 1 and are never reused; 0 means "uncached".
    pub fn send_cache_set(&self, meta_object: &MetaObject) -> (u32, bool) {
        self.state().meta_object_cache.send_set(meta_object)
    }

    /// Store a metaobject the peer cached under `token`, overwriting any
    /// prior entry.
    pub fn receive_cache_set(&self, token: u32, meta_object: MetaObject) {
        self.state()
            .meta_object_cache
            .receive_set(token, meta_object);
    }

    /// Resolve a token the peer sent in place of a full metaobject.
    ///
    /// # Errors
    ///
    /// [`CacheError::TokenNotCached`] when nothing was stored under `token`;
    /// a bogus metaobject is never fabricated.
    pub fn receive_cache_get(&self, token: u32) -> Result<MetaObject, CacheError> {
        self.state().meta_object_cache.receive_get(token)
    }

    /// The registry routing direct-dispatch frames for this stream.
    pub fn direct_dispatch_registry(&self) -> &DirectDispatchRegistry {
        &self.dispatch_registry
    }
}

impl Default for StreamContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StreamContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamContext").finish_non_exhaustive()
    }
}
