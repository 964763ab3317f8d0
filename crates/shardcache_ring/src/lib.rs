// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Consistent hashing with virtual nodes for routing keys to cluster members.
//!
//! A [`HashRing`] places every registered member on a 32-bit ring `replicas` times. Replica
//! `i` of member `m` sits at `hash(format!("{i}{m}"))`. A key is owned by the member of the
//! first ring position at or after `hash(key)`, wrapping around to the smallest position
//! when the key hashes past the last one.
//!
//! Routing is a pure function of the hash function, the replica count and the registered
//! members: two rings built from the same inputs route every key identically. Adding a
//! member only moves keys onto the new member.
//!
//! # Example
//!
//! ```
//! use shardcache_ring::HashRing;
//!
//! let mut ring = HashRing::new(50);
//! ring.register(["10.0.0.1:8001", "10.0.0.2:8001", "10.0.0.3:8001"]);
//!
//! let owner = ring.locate("Tom").expect("ring has members");
//! assert_eq!(ring.locate("Tom"), Some(owner));
//! ```
//!
//! # Concurrency
//!
//! `HashRing` is a plain value. It is rebuilt wholesale when membership changes, and
//! owners that share it between threads guard it with a reader/writer lock.

use std::collections::HashMap;

/// Signature of a ring hash function.
pub type HashFn = fn(&[u8]) -> u32;

/// Number of virtual nodes per member used by callers that have no better figure.
pub const DEFAULT_REPLICAS: usize = 50;

/// The default ring hash: xxHash32 with a zero seed.
#[must_use]
pub fn default_hash(data: &[u8]) -> u32 {
    xxhash_rust::xxh32::xxh32(data, 0)
}

/// A consistent-hash ring mapping keys to member identifiers.
#[derive(Clone, Debug)]
pub struct HashRing {
    hash: HashFn,
    replicas: usize,
    /// Sorted virtual node positions.
    ring: Vec<u32>,
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring with `replicas` virtual nodes per member, using [`default_hash`].
    #[must_use]
    pub fn new(replicas: usize) -> Self {
        Self::with_hasher(replicas, default_hash)
    }

    /// Creates an empty ring with a custom hash function.
    #[must_use]
    pub fn with_hasher(replicas: usize, hash: HashFn) -> Self {
        Self {
            hash,
            replicas,
            ring: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Adds members to the ring.
    ///
    /// Registration is not idempotent: registering a member twice places its virtual nodes on
    /// the ring twice. Membership changes are expected to rebuild the ring from scratch.
    /// When two virtual nodes collide, the one registered last owns the position.
    pub fn register<I>(&mut self, members: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let before = self.ring.len();

        for member in members {
            let member = member.into();
            for replica in 0..self.replicas {
                let point = (self.hash)(format!("{replica}{member}").as_bytes());
                self.ring.push(point);
                self.owners.insert(point, member.clone());
            }
        }

        if self.ring.len() != before {
            self.ring.sort_unstable();
        }
    }

    /// Returns the member owning `key`, or `None` if the ring is empty.
    #[must_use]
    pub fn locate(&self, key: &str) -> Option<&str> {
        let hash = (self.hash)(key.as_bytes());
        let idx = self.ring.partition_point(|&point| point < hash);
        let point = self.ring.get(idx).or_else(|| self.ring.first())?;
        self.owners.get(point).map(String::as_str)
    }

    /// Returns the distinct members that own at least one ring position, sorted.
    #[must_use]
    pub fn members(&self) -> Vec<&str> {
        let mut members: Vec<&str> = self.owners.values().map(String::as_str).collect();
        members.sort_unstable();
        members.dedup();
        members
    }

    /// Returns the number of virtual nodes per member.
    #[must_use]
    pub fn replicas(&self) -> usize {
        self.replicas
    }

    /// Returns the number of virtual nodes on the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` if no member is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new(DEFAULT_REPLICAS)
    }
}
