// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `HashRing`.

use std::collections::HashMap;

use rstest::rstest;
use shardcache_ring::HashRing;

/// Treats the input as a decimal number so ring positions can be reasoned about by hand.
fn decimal_hash(data: &[u8]) -> u32 {
    std::str::from_utf8(data).ok().and_then(|text| text.parse().ok()).unwrap_or(0)
}

#[test]
fn locate_picks_next_position_and_wraps() {
    let mut ring = HashRing::with_hasher(3, decimal_hash);

    // Positions: 2, 4, 6, 12, 14, 16, 22, 24, 26.
    ring.register(["6", "4", "2"]);

    for (key, owner) in [("2", "2"), ("11", "2"), ("23", "4"), ("27", "2")] {
        assert_eq!(ring.locate(key), Some(owner), "key {key}");
    }

    // Adds 8, 18, 28.
    ring.register(["8"]);

    for (key, owner) in [("2", "2"), ("11", "2"), ("23", "4"), ("27", "8")] {
        assert_eq!(ring.locate(key), Some(owner), "key {key}");
    }
}

#[test]
fn empty_ring_has_no_owner() {
    let ring = HashRing::new(50);

    assert!(ring.is_empty());
    assert_eq!(ring.locate("Tom"), None);
}

#[test]
fn registration_order_does_not_change_routing() {
    let mut first = HashRing::new(50);
    first.register(["Bill", "Bob", "Bonny"]);

    let mut second = HashRing::new(50);
    second.register(["Bonny", "Bill"]);
    second.register(["Bob"]);

    for i in 0..500 {
        let key = format!("key-{i}");
        assert_eq!(first.locate(&key), second.locate(&key), "key {key}");
    }
}

#[test]
fn members_are_distinct_and_sorted() {
    let mut ring = HashRing::new(10);
    ring.register(["c", "a", "b"]);

    assert_eq!(ring.members(), ["a", "b", "c"]);
}

#[test]
fn repeated_registration_duplicates_virtual_nodes() {
    let mut ring = HashRing::new(5);
    ring.register(["a"]);
    ring.register(["a"]);

    assert_eq!(ring.len(), 10);
    assert_eq!(ring.members(), ["a"]);
    assert_eq!(ring.locate("anything"), Some("a"));
}

#[test]
fn colliding_positions_go_to_latest_member() {
    fn constant_hash(_: &[u8]) -> u32 {
        7
    }

    let mut ring = HashRing::with_hasher(1, constant_hash);
    ring.register(["first", "second"]);

    assert_eq!(ring.locate("key"), Some("second"));
    assert_eq!(ring.members(), ["second"]);
}

#[test]
fn adding_member_only_moves_keys_to_it() {
    let mut ring = HashRing::new(50);
    ring.register(["a:1", "b:1", "c:1"]);

    let before: Vec<String> = (0..1_000)
        .map(|i| ring.locate(&format!("key-{i}")).unwrap_or_default().to_string())
        .collect();

    ring.register(["d:1"]);

    let mut moved = 0;
    for (i, old) in before.iter().enumerate() {
        let now = ring.locate(&format!("key-{i}")).unwrap_or_default();
        if now != old.as_str() {
            assert_eq!(now, "d:1", "key-{i} moved between existing members");
            moved += 1;
        }
    }
    assert!(moved > 0, "new member received no keys");
}

#[rstest]
#[case(2)]
#[case(3)]
#[case(5)]
fn every_member_receives_keys(#[case] members: usize) {
    let mut ring = HashRing::new(50);
    ring.register((0..members).map(|i| format!("10.0.0.{i}:8001")));

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for i in 0..2_000 {
        if let Some(owner) = ring.locate(&format!("key-{i}")) {
            *counts.entry(owner).or_default() += 1;
        }
    }

    assert_eq!(counts.len(), members);
    assert_eq!(counts.values().sum::<usize>(), 2_000);
}
