//! Capability negotiation primitives.
//!
//! Peers exchange capability maps early in a connection; every protocol
//! behavior gated on a capability consults the per-stream
//! [`StreamContext`](crate::stream::StreamContext). This module owns the
//! reserved names, the process-wide defaults, and the environment overlay
//! applied on top of them.
//!
//! Unrecognized capability names are preserved verbatim and flow through all
//! queries — the core never drops a key it does not understand.

use std::collections::HashMap;
use std::sync::OnceLock;

use skerry_core::DynValue;

/// Mapping from capability name to its negotiated value.
pub type CapabilityMap = HashMap<String, DynValue>;

/// Reserved capability names.
pub mod capability_names {
    /// A client socket accepts and dispatches call messages, so the stream
    /// used to register a service can be reused to communicate with it.
    pub const CLIENT_SERVER_SOCKET: &str = "ClientServerSocket";

    /// The object serialization protocol supports caching of metaobjects
    /// (binary protocol change).
    pub const META_OBJECT_CACHE: &str = "MetaObjectCache";

    /// The remote end understands flag bits in the message kind field.
    pub const MESSAGE_FLAGS: &str = "MessageFlags";

    /// The remote end supports call cancelation.
    pub const REMOTE_CANCELABLE_CALLS: &str = "RemoteCancelableCalls";

    /// Objects carry a unique 20-byte uid on the wire.
    pub const OBJECT_PTR_UID: &str = "ObjectPtrUID";

    /// Messages can be routed directly to the endpoint named by the
    /// recipient uid stored in the message, bypassing the legacy
    /// service/object-id router.
    ///
    /// Requires [`OBJECT_PTR_UID`] to augment outbound messages, so direct
    /// dispatch is only active when both capabilities hold on both sides.
    pub const DIRECT_MESSAGE_DISPATCH: &str = "DirectMessageDispatch";
}

/// Environment variable overlaying the default capabilities, applied once
/// per process.
///
/// Colon-separated tokens: `name` or `+name` sets the capability to `true`,
/// `-name` removes it, `name=value` sets the literal string value. Empty
/// tokens are ignored.
pub const CAPABILITY_ENV_VAR: &str = "QI_TRANSPORT_CAPABILITIES";

/// Add or update `map` with every entry of `new_values`.
///
/// Existing keys are overwritten, absent keys retained.
pub fn merge_capabilities(map: &mut CapabilityMap, new_values: &CapabilityMap) {
    for (name, value) in new_values {
        map.insert(name.clone(), value.clone());
    }
}

/// Apply one overlay specification (the [`CAPABILITY_ENV_VAR`] syntax) over
/// a capability map.
pub fn apply_capability_overlay(mut capabilities: CapabilityMap, overlay: &str) -> CapabilityMap {
    for token in overlay.split(':') {
        if token.is_empty() {
            continue;
        }
        match token.split_once('=') {
            Some((name, value)) => {
                // No coercion here; consumers convert when they read.
                capabilities.insert(name.to_owned(), DynValue::from(value));
            }
            None => {
                if let Some(name) = token.strip_prefix('-') {
                    capabilities.remove(name);
                } else {
                    let name = token.strip_prefix('+').unwrap_or(token);
                    capabilities.insert(name.to_owned(), DynValue::from(true));
                }
            }
        }
    }
    capabilities
}

/// Default capabilities injected on all transports upon connection, with the
/// [`CAPABILITY_ENV_VAR`] overlay already applied.
///
/// Computed on first access and memoized for the process lifetime.
pub fn default_capabilities() -> &'static CapabilityMap {
    static DEFAULTS: OnceLock<CapabilityMap> = OnceLock::new();
    DEFAULTS.get_or_init(|| {
        let base = CapabilityMap::from([
            (
                capability_names::CLIENT_SERVER_SOCKET.to_owned(),
                DynValue::from(true),
            ),
            (
                capability_names::MESSAGE_FLAGS.to_owned(),
                DynValue::from(true),
            ),
            (
                capability_names::META_OBJECT_CACHE.to_owned(),
                DynValue::from(false),
            ),
            (
                capability_names::REMOTE_CANCELABLE_CALLS.to_owned(),
                DynValue::from(true),
            ),
            (
                capability_names::OBJECT_PTR_UID.to_owned(),
                DynValue::from(true),
            ),
            (
                capability_names::DIRECT_MESSAGE_DISPATCH.to_owned(),
                DynValue::from(true),
            ),
        ]);
        let overlay = std::env::var(CAPABILITY_ENV_VAR).unwrap_or_default();
        apply_capability_overlay(base, &overlay)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_map() -> CapabilityMap {
        CapabilityMap::from([
            ("A".to_owned(), DynValue::from(true)),
            ("B".to_owned(), DynValue::from(false)),
        ])
    }

    #[test]
    fn test_merge_overwrites_and_retains() {
        let mut map = base_map();
        let update = CapabilityMap::from([
            ("B".to_owned(), DynValue::from(true)),
            ("C".to_owned(), DynValue::from("custom")),
        ]);
        merge_capabilities(&mut map, &update);

        assert_eq!(map.get("A"), Some(&DynValue::from(true)));
        assert_eq!(map.get("B"), Some(&DynValue::from(true)));
        assert_eq!(map.get("C"), Some(&DynValue::from("custom")));
    }

    #[test]
    fn test_overlay_bare_and_plus_set_true() {
        let map = apply_capability_overlay(CapabilityMap::new(), "Foo:+Bar");
        assert_eq!(map.get("Foo"), Some(&DynValue::from(true)));
        assert_eq!(map.get("Bar"), Some(&DynValue::from(true)));
    }

    #[test]
    fn test_overlay_minus_removes() {
        let map = apply_capability_overlay(base_map(), "-A");
        assert!(!map.contains_key("A"));
        assert!(map.contains_key("B"));
    }

    #[test]
    fn test_overlay_assignment_is_verbatim_string() {
        let map = apply_capability_overlay(CapabilityMap::new(), "Bar=42");
        assert_eq!(map.get("Bar"), Some(&DynValue::from("42")));
    }

    #[test]
    fn test_overlay_empty_tokens_ignored() {
        let map = apply_capability_overlay(base_map(), "::-A::");
        assert!(!map.contains_key("A"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_overlay_applies_in_order() {
        let map = apply_capability_overlay(CapabilityMap::new(), "Foo:-Foo:Foo=last");
        assert_eq!(map.get("Foo"), Some(&DynValue::from("last")));
    }

    // The scenario from the wire contract: defaults overlaid with
    // `-DirectMessageDispatch:+Foo:Bar=42`.
    #[test]
    fn test_overlay_over_default_table() {
        let defaults = apply_capability_overlay(
            CapabilityMap::from([
                (
                    capability_names::DIRECT_MESSAGE_DISPATCH.to_owned(),
                    DynValue::from(true),
                ),
                (
                    capability_names::OBJECT_PTR_UID.to_owned(),
                    DynValue::from(true),
                ),
            ]),
            "-DirectMessageDispatch:+Foo:Bar=42",
        );
        assert!(!defaults.contains_key(capability_names::DIRECT_MESSAGE_DISPATCH));
        assert_eq!(defaults.get("Foo"), Some(&DynValue::from(true)));
        assert_eq!(defaults.get("Bar"), Some(&DynValue::from("42")));
        assert_eq!(
            defaults.get(capability_names::OBJECT_PTR_UID),
            Some(&DynValue::from(true))
        );
    }

    #[test]
    fn test_default_capabilities_table() {
        let defaults = default_capabilities();
        // The overlay variable may be set in the environment running the
        // tests; only check the untouched entries' types are booleans.
        for name in [
            capability_names::CLIENT_SERVER_SOCKET,
            capability_names::MESSAGE_FLAGS,
            capability_names::REMOTE_CANCELABLE_CALLS,
        ] {
            if let Some(value) = defaults.get(name) {
                assert!(value.to::<bool>().is_some(), "{name} should be boolean");
            }
        }
    }
}
