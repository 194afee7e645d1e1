//! Per-stream metaobject cache.
//!
//! Serializing a metaobject is expensive, so under the `MetaObjectCache`
//! capability each stream sends any given metaobject in full only once and a
//! small integer token thereafter. The send half assigns tokens, the receive
//! half resolves them. The cache grows with the stream and is released with
//! it; tokens are never reused.

use std::collections::HashMap;

use skerry_core::MetaObject;

/// Token value meaning "not cached"; never assigned.
pub(crate) const UNCACHED_TOKEN: u32 = 0;

/// Error resolving a metaobject token.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The peer referenced a token this stream never stored.
    #[error("no metaobject cached under token {token}")]
    TokenNotCached {
        /// The unresolvable token.
        token: u32,
    },
}

#[derive(Debug, Default)]
pub(crate) struct MetaObjectCache {
    send: HashMap<MetaObject, u32>,
    receive: HashMap<u32, MetaObject>,
    next_token: u32,
}

impl MetaObjectCache {
    /// Returns `(token, inserted)`: the existing token for a known
    /// metaobject, or a freshly assigned one. Tokens start at 1.
    pub(crate) fn send_set(&mut self, meta_object: &MetaObject) -> (u32, bool) {
        if let Some(token) = self.send.get(meta_object) {
            return (*token, false);
        }
        self.next_token += 1;
        debug_assert!(self.next_token != UNCACHED_TOKEN);
        self.send.insert(meta_object.clone(), self.next_token);
        (self.next_token, true)
    }

    /// Store what the peer sent under `token`, overwriting any prior entry.
    pub(crate) fn receive_set(&mut self, token: u32, meta_object: MetaObject) {
        self.receive.insert(token, meta_object);
    }

    /// Resolve a token previously stored with [`Self::receive_set`].
    pub(crate) fn receive_get(&self, token: u32) -> Result<MetaObject, CacheError> {
        self.receive
            .get(&token)
            .cloned()
            .ok_or(CacheError::TokenNotCached { token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(tag: &str) -> MetaObject {
        MetaObject::from_bytes(tag.as_bytes().to_vec())
    }

    #[test]
    fn test_send_tokens_start_at_one_and_increase() {
        let mut cache = MetaObjectCache::default();
        assert_eq!(cache.send_set(&meta("a")), (1, true));
        assert_eq!(cache.send_set(&meta("b")), (2, true));
        assert_eq!(cache.send_set(&meta("c")), (3, true));
    }

    #[test]
    fn test_send_returns_same_token_for_equal_metaobjects() {
        let mut cache = MetaObjectCache::default();
        let (token, inserted) = cache.send_set(&meta("a"));
        assert!(inserted);
        assert_eq!(cache.send_set(&meta("a")), (token, false));
        // Interleaved inserts never disturb earlier tokens.
        assert_eq!(cache.send_set(&meta("b")), (2, true));
        assert_eq!(cache.send_set(&meta("a")), (token, false));
    }

    #[test]
    fn test_receive_roundtrip() {
        let mut cache = MetaObjectCache::default();
        cache.receive_set(5, meta("a"));
        assert_eq!(cache.receive_get(5), Ok(meta("a")));
    }

    #[test]
    fn test_receive_overwrites() {
        let mut cache = MetaObjectCache::default();
        cache.receive_set(5, meta("a"));
        cache.receive_set(5, meta("b"));
        assert_eq!(cache.receive_get(5), Ok(meta("b")));
    }

    #[test]
    fn test_receive_miss_is_distinct_error() {
        let cache = MetaObjectCache::default();
        assert_eq!(
            cache.receive_get(9),
            Err(CacheError::TokenNotCached { token: 9 })
        );
    }
}
