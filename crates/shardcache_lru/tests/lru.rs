// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Integration tests for `Lru`.

use std::sync::Arc;

use parking_lot::Mutex;
use rstest::rstest;
use shardcache_lru::Lru;

type Evicted = Arc<Mutex<Vec<(String, String)>>>;

fn recording_lru(capacity: u64) -> (Lru<String>, Evicted) {
    let evicted = Evicted::default();
    let sink = Arc::clone(&evicted);
    let lru = Lru::with_eviction(capacity, move |key: &str, value: &String| {
        sink.lock().push((key.to_string(), value.clone()));
    });
    (lru, evicted)
}

#[test]
fn get_hit_and_miss() {
    let mut lru = Lru::new(0);
    lru.add("key1", "1234".to_string());

    assert_eq!(lru.get("key1").map(String::as_str), Some("1234"));
    assert!(lru.get("key2").is_none());
}

#[test]
fn entry_cost_is_key_plus_value() {
    let mut lru = Lru::new(1024);
    lru.add("Tom", "560".to_string());

    assert_eq!(lru.used_bytes(), 6);
    assert_eq!(lru.len(), 1);
}

#[test]
fn recently_read_entry_survives_eviction() {
    let (mut lru, evicted) = recording_lru(2);
    lru.add("A", String::new());
    lru.add("B", String::new());
    assert!(lru.get("A").is_some());

    lru.add("C", String::new());

    assert!(lru.contains("A"));
    assert!(!lru.contains("B"));
    assert!(lru.contains("C"));
    assert_eq!(*evicted.lock(), [("B".to_string(), String::new())]);
}

#[test]
fn peek_does_not_promote() {
    let mut lru = Lru::new(2);
    lru.add("A", String::new());
    lru.add("B", String::new());
    assert!(lru.peek("A").is_some());

    lru.add("C", String::new());

    assert!(!lru.contains("A"));
    assert!(lru.contains("B"));
}

#[test]
fn removes_oldest_when_over_capacity() {
    let (k1, k2, k3) = ("key1", "key2", "k3");
    let (v1, v2, v3) = ("value1", "value2", "v3");
    let capacity = (k1.len() + k2.len() + v1.len() + v2.len()) as u64;

    let mut lru = Lru::new(capacity);
    lru.add(k1, v1.to_string());
    lru.add(k2, v2.to_string());
    lru.add(k3, v3.to_string());

    assert!(lru.get(k1).is_none());
    assert_eq!(lru.len(), 2);
    assert_eq!(lru.keys().collect::<Vec<_>>(), [k3, k2]);
}

#[test]
fn callback_fires_once_per_evicted_key() {
    let (mut lru, evicted) = recording_lru(10);
    lru.add("key1", "123456".to_string());
    lru.add("k2", "k2".to_string());
    lru.add("k3", "k3".to_string());
    lru.add("k4", "k4".to_string());

    assert_eq!(
        *evicted.lock(),
        [("key1".to_string(), "123456".to_string()), ("k2".to_string(), "k2".to_string())]
    );
}

#[test]
fn explicit_removal_fires_callback() {
    let (mut lru, evicted) = recording_lru(0);
    lru.add("a", "1".to_string());
    lru.add("b", "22".to_string());

    assert_eq!(lru.remove("a").as_deref(), Some("1"));
    assert!(lru.remove("a").is_none());
    assert_eq!(lru.remove_oldest(), Some(("b".to_string(), "22".to_string())));
    assert!(lru.remove_oldest().is_none());

    assert_eq!(lru.used_bytes(), 0);
    assert_eq!(
        *evicted.lock(),
        [("a".to_string(), "1".to_string()), ("b".to_string(), "22".to_string())]
    );
}

#[test]
fn clear_evicts_oldest_first() {
    let (mut lru, evicted) = recording_lru(0);
    lru.add("a", "1".to_string());
    lru.add("b", "2".to_string());
    lru.add("c", "3".to_string());

    lru.clear();

    assert!(lru.is_empty());
    let keys: Vec<_> = evicted.lock().iter().map(|(key, _)| key.clone()).collect();
    assert_eq!(keys, ["a", "b", "c"]);
}

#[test]
fn update_applies_size_delta_and_promotes() {
    let (mut lru, evicted) = recording_lru(0);
    lru.add("a", "1".to_string());
    lru.add("b", "2".to_string());
    assert_eq!(lru.used_bytes(), 4);

    lru.add("a", "12345".to_string());
    assert_eq!(lru.used_bytes(), 8);
    assert_eq!(lru.keys().collect::<Vec<_>>(), ["a", "b"]);

    lru.add("a", String::new());
    assert_eq!(lru.used_bytes(), 3);
    assert_eq!(lru.len(), 2);
    assert!(evicted.lock().is_empty(), "replacing a value is not an eviction");
}

#[test]
fn growing_update_evicts_others() {
    let (mut lru, evicted) = recording_lru(6);
    lru.add("a", "1".to_string());
    lru.add("b", "2".to_string());
    lru.add("c", "3".to_string());

    lru.add("c", "333".to_string());

    assert_eq!(lru.used_bytes(), 6);
    assert_eq!(lru.keys().collect::<Vec<_>>(), ["c", "b"]);
    assert_eq!(*evicted.lock(), [("a".to_string(), "1".to_string())]);
}

#[test]
fn oversized_entry_evicts_everything() {
    let (mut lru, evicted) = recording_lru(8);
    lru.add("a", "1".to_string());
    lru.add("b", "2".to_string());

    lru.add("huge", "0123456789".to_string());

    assert!(lru.is_empty());
    assert_eq!(lru.used_bytes(), 0);
    assert_eq!(evicted.lock().len(), 3);
}

#[test]
fn zero_capacity_is_unbounded() {
    let (mut lru, evicted) = recording_lru(0);
    for i in 0..1_000 {
        lru.add(format!("key{i}"), "x".repeat(100));
    }

    assert_eq!(lru.len(), 1_000);
    assert!(evicted.lock().is_empty());
}

#[rstest]
#[case(1)]
#[case(7)]
#[case(64)]
#[case(500)]
fn capacity_invariant_holds_after_every_add(#[case] capacity: u64) {
    let mut lru = Lru::new(capacity);
    let mut rng = fastrand::Rng::with_seed(capacity);

    for step in 0..2_000 {
        let key = format!("k{}", rng.u32(..97));
        if step % 3 == 0 {
            let _ = lru.get(&key);
        } else {
            lru.add(key, "v".repeat(rng.usize(..23)));
            assert!(lru.used_bytes() <= capacity, "step {step}: {} > {capacity}", lru.used_bytes());
        }

        let charged: u64 = lru
            .keys()
            .map(|key| (key.len() + lru.peek(key).map_or(0, String::len)) as u64)
            .sum();
        assert_eq!(charged, lru.used_bytes(), "step {step}: tracked size drifted");
    }
}
