// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A byte-bounded least-recently-used cache with eviction callbacks.
//!
//! [`Lru`] stores values under string keys and keeps them ordered from most- to
//! least-recently used. Every entry is charged `key.len() + value.byte_size()` bytes against
//! the configured capacity; when an insertion pushes the total over capacity the oldest
//! entries are evicted until it fits again. A capacity of zero disables eviction entirely.
//!
//! The cache is a plain single-owner structure: every operation takes `&mut self`
//! (lookups promote entries) and callers that share it across threads put it behind a lock.
//!
//! # Example
//!
//! ```
//! use shardcache_lru::Lru;
//!
//! let mut lru = Lru::with_eviction(8, |key: &str, _value: &String| println!("evicted {key}"));
//! lru.add("a", "123".to_string());
//! lru.add("b", "456".to_string());
//! assert_eq!(lru.get("a").map(String::as_str), Some("123"));
//!
//! // "b" is now the least recently used entry and makes room for "c".
//! lru.add("c", "789".to_string());
//! assert!(lru.peek("b").is_none());
//! assert_eq!(lru.used_bytes(), 8);
//! ```
//!
//! # Layout
//!
//! Entries live in a slab of nodes linked through `u32` indices, with unused slots chained
//! into a free list and recycled by later insertions. A `HashMap` from key to slot index
//! gives O(1) lookup; promotion and eviction only rewrite links.

mod list;
mod size;

use std::collections::HashMap;
use std::fmt;

use list::{NodeIndex, NodeList};
pub use size::ByteSize;

/// Callback invoked with the key and value of every entry leaving the cache through
/// eviction or explicit removal.
pub type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send>;

/// A byte-bounded least-recently-used cache.
pub struct Lru<V> {
    list: NodeList<V>,
    index: HashMap<String, NodeIndex>,
    capacity: u64,
    used: u64,
    on_evict: Option<EvictionCallback<V>>,
}

impl<V> Lru<V>
where
    V: ByteSize,
{
    /// Creates a cache holding at most `capacity` bytes. Zero means unbounded.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            list: NodeList::new(),
            index: HashMap::new(),
            capacity,
            used: 0,
            on_evict: None,
        }
    }

    /// Creates a cache that calls `on_evict` for every entry it drops.
    ///
    /// The callback runs synchronously on the evicting call and must not reach back into
    /// the same cache.
    #[must_use]
    pub fn with_eviction(capacity: u64, on_evict: impl FnMut(&str, &V) + Send + 'static) -> Self {
        let mut lru = Self::new(capacity);
        lru.on_evict = Some(Box::new(on_evict));
        lru
    }

    /// Looks up `key` and marks it as the most recently used entry.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.list.move_to_front(idx);
        self.list.value(idx)
    }

    /// Looks up `key` without touching its recency.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.list.value(idx)
    }

    /// Returns `true` if `key` is cached. Does not touch recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts or replaces the value stored under `key`, then evicts least-recently-used
    /// entries until the cache fits its capacity again.
    ///
    /// Replacing a value adjusts the tracked size by the difference between the new and
    /// the old value and does not invoke the eviction callback. An entry that alone is
    /// larger than the capacity ends up evicted together with everything else.
    pub fn add(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();

        if let Some(&idx) = self.index.get(&key) {
            let new_size = size_of_value(&value);
            if let Some(old) = self.list.replace(idx, value) {
                self.used = self.used - size_of_value(&old) + new_size;
            }
            self.list.move_to_front(idx);
        } else {
            let cost = entry_cost(&key, &value);
            let idx = self.list.push_front(key.clone(), value);
            self.index.insert(key, idx);
            self.used += cost;
        }

        while self.capacity != 0 && self.used > self.capacity {
            if self.remove_oldest().is_none() {
                break;
            }
        }
    }

    /// Removes `key`, invoking the eviction callback if it was present.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.index.remove(key)?;
        let (key, value) = self.list.unlink(idx)?;
        Some(self.retire(key, value).1)
    }

    /// Removes the least recently used entry, invoking the eviction callback.
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let idx = self.list.tail()?;
        let (key, value) = self.list.unlink(idx)?;
        self.index.remove(&key);
        Some(self.retire(key, value))
    }

    /// Evicts every entry, oldest first.
    pub fn clear(&mut self) {
        while self.remove_oldest().is_some() {}
        self.list = NodeList::new();
    }

    /// Returns the number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the number of bytes charged for the cached entries.
    #[must_use]
    pub fn used_bytes(&self) -> u64 {
        self.used
    }

    /// Returns the configured capacity in bytes. Zero means unbounded.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Iterates over the cached keys from most to least recently used.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.list.iter().map(|(key, _)| key)
    }

    fn retire(&mut self, key: String, value: V) -> (String, V) {
        self.used -= entry_cost(&key, &value);
        if let Some(on_evict) = self.on_evict.as_mut() {
            on_evict(&key, &value);
        }
        (key, value)
    }
}

impl<V> fmt::Debug for Lru<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lru")
            .field("len", &self.index.len())
            .field("used", &self.used)
            .field("capacity", &self.capacity)
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

fn size_of_value<V: ByteSize>(value: &V) -> u64 {
    value.byte_size() as u64
}

fn entry_cost<V: ByteSize>(key: &str, value: &V) -> u64 {
    key.len() as u64 + size_of_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_reports_accounting() {
        let mut lru = Lru::new(100);
        lru.add("key", "value".to_string());

        let debug = format!("{lru:?}");
        assert!(debug.contains("len: 1"), "{debug}");
        assert!(debug.contains("used: 8"), "{debug}");
        assert!(debug.contains("on_evict: false"), "{debug}");
    }

    #[test]
    fn slots_are_recycled_after_removal() {
        let mut lru = Lru::new(0);
        lru.add("a", "1".to_string());
        lru.add("b", "2".to_string());
        assert_eq!(lru.remove("a").as_deref(), Some("1"));

        lru.add("c", "3".to_string());
        assert_eq!(lru.list.slots(), 2);
        assert_eq!(lru.keys().collect::<Vec<_>>(), ["c", "b"]);
    }

    #[test]
    fn clear_resets_slab() {
        let mut lru = Lru::new(0);
        for i in 0..10 {
            lru.add(format!("k{i}"), String::new());
        }
        lru.clear();

        assert!(lru.is_empty());
        assert_eq!(lru.used_bytes(), 0);
        assert_eq!(lru.list.slots(), 0);
    }
}
