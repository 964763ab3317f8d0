// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Collapses concurrent lookups of the same key into a single execution.
//!
//! This crate provides [`Flight`], the request coalescer used by `shardcache` groups on a
//! cache miss. When several tasks ask for the same key at the same time, only the first
//! task (the "leader") runs the supplied closure; every other task (a "follower") waits
//! and receives a clone of the leader's output.
//!
//! # Example
//!
//! ```
//! use shardcache_flight::Flight;
//!
//! # async fn example() {
//! let flight: Flight<String, Result<String, String>> = Flight::new();
//!
//! let value = flight
//!     .work("user:123".to_string(), || async { Ok("loaded".to_string()) })
//!     .await;
//! assert_eq!(value.as_deref(), Ok("loaded"));
//! # }
//! ```
//!
//! # Generations
//!
//! The leader removes its entry from the in-flight table as soon as its result is stored,
//! before any follower is released. A call that arrives after that point starts a new
//! generation and runs its own closure: results are shared, never cached. Errors are just
//! another output and reach every follower of the generation unchanged.
//!
//! # Cancellation
//!
//! The leader holds the result slot locked for the whole execution. If the leader's future
//! is dropped before it stores a result, the lock is released empty and the first follower
//! to acquire it is promoted: it runs its own closure and publishes that result to the
//! remaining followers.
//!
//! A generation whose callers are all dropped before it publishes is removed from the
//! table, so abandoned keys do not accumulate.
//!
//! There is no timeout. Callers that need one wrap the returned future themselves.

use std::{collections::HashMap, fmt, hash::Hash, sync::Arc};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Result slot shared by the leader and the followers of one generation.
type Slot<T> = AsyncMutex<Option<T>>;

type SharedMapping<K, T> = Arc<Mutex<HashMap<K, Entry<T>>>>;

/// Table entry of a generation that has not published its result yet.
struct Entry<T> {
    slot: Arc<Slot<T>>,
    members: usize,
}

/// A space in which units of work keyed by `K` run with duplicate suppression.
///
/// `Flight` is `Send` and `Sync` whenever `K` and `T` are, and is normally shared behind
/// an [`Arc`] or embedded in a longer-lived owner.
pub struct Flight<K, T> {
    mapping: SharedMapping<K, T>,
}

impl<K, T> Default for Flight<K, T> {
    fn default() -> Self {
        Self {
            mapping: Arc::default(),
        }
    }
}

impl<K, T> fmt::Debug for Flight<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flight").finish_non_exhaustive()
    }
}

/// Membership of one caller in a generation.
///
/// Dropping the last ticket of a generation that never published removes its entry.
struct Ticket<K: Hash + Eq, T> {
    key: K,
    mapping: SharedMapping<K, T>,
    slot: Arc<Slot<T>>,
}

impl<K: Hash + Eq, T> Ticket<K, T> {
    /// Removes the table entry if it still belongs to this ticket's generation.
    fn forget(&self) {
        let mut mapping = self.mapping.lock();
        if mapping.get(&self.key).is_some_and(|entry| Arc::ptr_eq(&entry.slot, &self.slot)) {
            mapping.remove(&self.key);
        }
    }
}

impl<K: Hash + Eq, T> Drop for Ticket<K, T> {
    fn drop(&mut self) {
        let mut mapping = self.mapping.lock();
        let Some(entry) = mapping.get_mut(&self.key) else {
            return;
        };
        if !Arc::ptr_eq(&entry.slot, &self.slot) {
            return;
        }

        entry.members -= 1;
        if entry.members == 0 {
            mapping.remove(&self.key);
        }
    }
}

/// Role of a caller within a generation.
enum Role<K: Hash + Eq, T> {
    /// Owns the locked slot and executes the closure.
    Leader(Ticket<K, T>, OwnedMutexGuard<Option<T>>),
    /// Waits for the slot to be released.
    Follower(Ticket<K, T>),
}

impl<K, T> Flight<K, T>
where
    K: Hash + Eq + Clone,
    T: Clone,
{
    /// Creates an empty `Flight`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys that currently have a generation in flight.
    ///
    /// A generation leaves the table once its result is published or once every caller
    /// that joined it has been dropped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.mapping.lock().len()
    }

    /// Runs `func` for `key` unless a generation for `key` is already in flight, in which
    /// case the returned future resolves to that generation's output instead.
    ///
    /// The caller's role is decided when `work` is called, not when the future is first
    /// polled: a leader has already claimed the slot by the time this method returns.
    pub fn work<F, Fut>(&self, key: K, func: F) -> impl Future<Output = T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let role = self.join(key);

        async move {
            match role {
                Role::Leader(ticket, guard) => lead(ticket, guard, func).await,
                Role::Follower(ticket) => follow(ticket, func).await,
            }
        }
    }

    fn join(&self, key: K) -> Role<K, T> {
        let mut mapping = self.mapping.lock();

        if let Some(entry) = mapping.get_mut(&key) {
            entry.members += 1;
            let slot = Arc::clone(&entry.slot);
            return Role::Follower(Ticket {
                key,
                mapping: Arc::clone(&self.mapping),
                slot,
            });
        }

        let slot: Arc<Slot<T>> = Arc::new(AsyncMutex::new(None));
        mapping.insert(
            key.clone(),
            Entry {
                slot: Arc::clone(&slot),
                members: 1,
            },
        );

        // Nobody else can see the slot yet, so the lock is always free.
        let claimed = Arc::clone(&slot).try_lock_owned();
        let ticket = Ticket {
            key,
            mapping: Arc::clone(&self.mapping),
            slot,
        };
        match claimed {
            Ok(guard) => Role::Leader(ticket, guard),
            Err(_) => Role::Follower(ticket),
        }
    }
}

async fn lead<K, T, F, Fut>(ticket: Ticket<K, T>, mut guard: OwnedMutexGuard<Option<T>>, func: F) -> T
where
    K: Hash + Eq,
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let value = func().await;
    *guard = Some(value.clone());

    // Later callers start a new generation; the followers of this one still get `value`.
    ticket.forget();
    drop(guard);

    value
}

async fn follow<K, T, F, Fut>(ticket: Ticket<K, T>, func: F) -> T
where
    K: Hash + Eq,
    T: Clone,
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let guard = Arc::clone(&ticket.slot).lock_owned().await;
    if let Some(value) = guard.as_ref() {
        return value.clone();
    }

    // The leader was dropped before publishing anything.
    lead(ticket, guard, func).await
}
