//! Integration tests for capability negotiation and the per-stream caches.

use skerry_messaging::{
    CacheError, CapabilityMap, DynValue, MetaObject, StreamContext, apply_capability_overlay,
    capability_names, default_capabilities,
};

#[test]
fn test_advertised_capabilities_round_trip() {
    let context = StreamContext::with_local_capabilities(CapabilityMap::new());

    context.advertise_capability("Flag", DynValue::from(true));
    context.advertise_capability("Level", DynValue::from(3i64));
    context.advertise_capability("Codec", DynValue::from("cbor"));

    assert_eq!(context.local_capability("Flag"), Some(DynValue::from(true)));
    assert_eq!(context.local_capability("Level"), Some(DynValue::from(3i64)));
    assert_eq!(
        context.local_capability("Codec"),
        Some(DynValue::from("cbor"))
    );
    assert_eq!(context.local_capability("Missing"), None);
}

#[test]
fn test_remote_capabilities_round_trip() {
    let context = StreamContext::with_local_capabilities(CapabilityMap::new());
    let map = CapabilityMap::from([("Flag".to_owned(), DynValue::from(false))]);
    context.update_remote_capabilities(&map);
    assert_eq!(
        context.remote_capability("Flag"),
        Some(DynValue::from(false))
    );
}

#[test]
fn test_batch_advertise_overwrites_and_retains() {
    let context = StreamContext::with_local_capabilities(CapabilityMap::from([
        ("Keep".to_owned(), DynValue::from(true)),
        ("Replace".to_owned(), DynValue::from(false)),
    ]));

    context.advertise_capabilities(&CapabilityMap::from([
        ("Replace".to_owned(), DynValue::from(true)),
        ("Add".to_owned(), DynValue::from("x")),
    ]));

    assert_eq!(context.local_capability("Keep"), Some(DynValue::from(true)));
    assert_eq!(
        context.local_capability("Replace"),
        Some(DynValue::from(true))
    );
    assert_eq!(context.local_capability("Add"), Some(DynValue::from("x")));
}

#[test]
fn test_shared_capability_is_conjunction_for_booleans() {
    for (ours, theirs) in [(false, false), (false, true), (true, false), (true, true)] {
        let context = StreamContext::with_local_capabilities(CapabilityMap::new());
        context.advertise_capability("K", DynValue::from(ours));
        context.update_remote_capabilities(&CapabilityMap::from([(
            "K".to_owned(),
            DynValue::from(theirs),
        )]));

        assert_eq!(
            context.shared_capability("K", false),
            ours && theirs,
            "local={ours} remote={theirs}"
        );
    }
}

#[test]
fn test_predicate_equals_shared_conjunction_after_mutations() {
    let context = StreamContext::new();
    context.update_remote_capabilities(&default_capabilities().clone());

    let check = |context: &StreamContext| {
        let expected = context.shared_capability(capability_names::OBJECT_PTR_UID, false)
            && context.shared_capability(capability_names::DIRECT_MESSAGE_DISPATCH, false);
        assert_eq!(context.is_direct_dispatch_allowed(), expected);
    };

    check(&context);

    context.advertise_capability(capability_names::OBJECT_PTR_UID, DynValue::from(false));
    check(&context);

    context.advertise_capability(capability_names::OBJECT_PTR_UID, DynValue::from(true));
    check(&context);

    context.update_remote_capabilities(&CapabilityMap::from([(
        capability_names::DIRECT_MESSAGE_DISPATCH.to_owned(),
        DynValue::from(false),
    )]));
    check(&context);
}

// The documented overlay scenario: `-DirectMessageDispatch:+Foo:Bar=42`
// applied over the default table.
#[test]
fn test_environment_overlay_scenario() {
    let overlaid = apply_capability_overlay(
        default_capabilities().clone(),
        "-DirectMessageDispatch:+Foo:Bar=42",
    );

    assert!(!overlaid.contains_key(capability_names::DIRECT_MESSAGE_DISPATCH));
    assert_eq!(overlaid.get("Foo"), Some(&DynValue::from(true)));
    assert_eq!(overlaid.get("Bar"), Some(&DynValue::from("42")));

    // A stream starting from the overlaid map can never negotiate direct
    // dispatch: the removed capability reads as its false default.
    let context = StreamContext::with_local_capabilities(overlaid);
    context.update_remote_capabilities(&default_capabilities().clone());
    assert!(!context.is_direct_dispatch_allowed());
    assert_eq!(context.local_capability("Bar"), Some(DynValue::from("42")));
}

#[test]
fn test_send_cache_token_sequence() {
    let context = StreamContext::new();
    let schemas: Vec<MetaObject> = (0..4)
        .map(|index| MetaObject::from_bytes(format!("schema-{index}").into_bytes()))
        .collect();

    // Fresh metaobjects take tokens 1..=4 in insertion order.
    for (index, schema) in schemas.iter().enumerate() {
        let (token, inserted) = context.send_cache_set(schema);
        assert_eq!(token, index as u32 + 1);
        assert!(inserted);
    }

    // Equal metaobjects keep their tokens, in any order.
    for (index, schema) in schemas.iter().enumerate().rev() {
        let (token, inserted) = context.send_cache_set(schema);
        assert_eq!(token, index as u32 + 1);
        assert!(!inserted);
    }
}

#[test]
fn test_receive_cache_round_trip_and_miss() {
    let context = StreamContext::new();
    let schema = MetaObject::from_bytes(&b"schema"[..]);

    context.receive_cache_set(3, schema.clone());
    assert_eq!(context.receive_cache_get(3), Ok(schema.clone()));

    // Overwrite is unconditional.
    let replacement = MetaObject::from_bytes(&b"schema-v2"[..]);
    context.receive_cache_set(3, replacement.clone());
    assert_eq!(context.receive_cache_get(3), Ok(replacement));

    assert_eq!(
        context.receive_cache_get(4),
        Err(CacheError::TokenNotCached { token: 4 })
    );
}

// What one peer caches under a token is exactly what the other resolves:
// the send and receive halves of two contexts glued together.
#[test]
fn test_cache_agreement_between_peers() {
    let sender = StreamContext::new();
    let receiver = StreamContext::new();

    let schema = MetaObject::from_bytes(&b"service schema"[..]);
    let (token, inserted) = sender.send_cache_set(&schema);
    assert!(inserted);

    // The wire carries (token, schema) once, then the token alone.
    receiver.receive_cache_set(token, schema.clone());
    assert_eq!(receiver.receive_cache_get(token), Ok(schema.clone()));

    let (again, inserted) = sender.send_cache_set(&schema);
    assert_eq!(again, token);
    assert!(!inserted);
    assert_eq!(receiver.receive_cache_get(again), Ok(schema));
}

#[test]
fn test_concurrent_advertisement_and_reads() {
    let context = StreamContext::new();
    context.update_remote_capabilities(&default_capabilities().clone());

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for round in 0..200 {
                context.advertise_capability(
                    capability_names::DIRECT_MESSAGE_DISPATCH,
                    DynValue::from(round % 2 == 0),
                );
            }
        });
        scope.spawn(|| {
            for _ in 0..200 {
                // The predicate must always agree with the shared reads; it
                // may flip between iterations but never desynchronize into a
                // stale memo.
                let allowed = context.is_direct_dispatch_allowed();
                let _ = allowed;
            }
        });
    });

    // Final state: last advertisement was round 199 (odd, false).
    assert!(!context.is_direct_dispatch_allowed());
}
