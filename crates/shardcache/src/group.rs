// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use shardcache_flight::Flight;
use shardcache_lru::Lru;
#[cfg(any(feature = "metrics", test))]
use opentelemetry::metrics::{Meter, MeterProvider};
use tracing::{Level, event};

use crate::{ByteView, Error, Fetcher, GroupStats, GroupStatsSnapshot, Loader, PeerPicker, Result};

/// Default deadline for fetching a value from a peer.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(10);

/// A named cache namespace with its own loader, local cache and peer routing.
///
/// A lookup first consults the local cache. On a miss, concurrent lookups of the same key
/// are coalesced into one load, which asks the owning peer (when peer routing is attached
/// and the key belongs elsewhere) and otherwise falls back to the origin loader. Values
/// obtained from the origin are cached locally; values obtained from peers are not.
///
/// # Example
///
/// ```
/// use shardcache::Group;
///
/// # async fn example() -> Result<(), shardcache::Error> {
/// let scores = Group::builder("scores")
///     .cache_bytes(1024)
///     .loader(|key: String| async move {
///         match key.as_str() {
///             "Tom" => Ok("630"),
///             _ => Err(format!("{key} not exist")),
///         }
///     })
///     .build()?;
///
/// assert_eq!(scores.get("Tom").await?, "630");
/// assert!(scores.get("Kate").await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct Group {
    name: String,
    loader: Box<dyn Loader>,
    cache: Mutex<Lru<ByteView>>,
    flight: Flight<String, Result<ByteView>>,
    peers: OnceLock<Arc<dyn PeerPicker>>,
    detached: AtomicBool,
    peer_timeout: Duration,
    stats: GroupStats,
}

impl Group {
    /// Starts building a group called `name`.
    pub fn builder(name: impl Into<String>) -> GroupBuilder {
        GroupBuilder {
            name: name.into(),
            cache_bytes: 0,
            loader: None,
            peer_timeout: DEFAULT_PEER_TIMEOUT,
            #[cfg(any(feature = "metrics", test))]
            meter: None,
        }
    }

    /// Returns the group's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the value stored under `key`, loading it on a miss.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyKey`] for an empty key and [`Error::OriginLoad`] when the value
    /// is neither cached, nor served by a peer, nor loadable from the origin. Peer failures
    /// are never returned; they only trigger the fallback to the origin.
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        self.stats.record_get();

        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        if let Some(value) = self.lookup_cache(key) {
            event!(Level::TRACE, message = "cache hit", group = %self.name, key);
            self.stats.record_cache_hit();
            return Ok(value);
        }

        event!(Level::TRACE, message = "cache miss", group = %self.name, key);
        self.stats.record_load();

        self.flight.work(key.to_owned(), || self.load(key)).await
    }

    /// Attaches peer routing to the group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PeersAlreadyRegistered`] if peer routing is already attached.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) -> Result<()> {
        if self.peers.set(Arc::clone(&picker)).is_err() {
            event!(Level::ERROR, message = "peers registered more than once", group = %self.name);
            return Err(Error::PeersAlreadyRegistered { group: self.name.clone() });
        }

        picker.attach();

        event!(Level::DEBUG, message = "peers registered", group = %self.name);
        Ok(())
    }

    /// Detaches the group from its peer routing, if any.
    ///
    /// The picker is told once, however often the group is stopped. A picker shared by
    /// several groups keeps serving the others.
    pub fn stop(&self) {
        let Some(picker) = self.peers.get() else {
            return;
        };
        if self.detached.swap(true, Ordering::AcqRel) {
            return;
        }

        event!(Level::DEBUG, message = "stopping peers", group = %self.name);
        picker.stop();
    }

    /// Returns a copy of the group's counters.
    #[must_use]
    pub fn stats(&self) -> GroupStatsSnapshot {
        self.stats.snapshot()
    }

    /// Counts a request served to a peer on behalf of this group.
    ///
    /// Called by transports answering remote lookups.
    pub fn record_server_request(&self) {
        self.stats.record_server_request();
    }

    /// Returns the number of bytes charged for locally cached entries.
    #[must_use]
    pub fn cache_bytes(&self) -> u64 {
        self.cache.lock().used_bytes()
    }

    /// Returns the local cache capacity in bytes. Zero means unbounded.
    #[must_use]
    pub fn cache_capacity(&self) -> u64 {
        self.cache.lock().capacity()
    }

    /// Returns the number of locally cached entries.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Returns `true` if `key` is cached locally, without affecting its recency.
    #[must_use]
    pub fn contains_cached(&self, key: &str) -> bool {
        self.cache.lock().contains(key)
    }

    fn lookup_cache(&self, key: &str) -> Option<ByteView> {
        self.cache.lock().get(key).cloned()
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        // A previous generation may have populated the cache after our miss.
        if let Some(value) = self.lookup_cache(key) {
            self.stats.record_cache_hit();
            return Ok(value);
        }

        self.stats.record_load_deduped();

        if let Some(fetcher) = self.peers.get().and_then(|picker| picker.pick(key)) {
            event!(Level::DEBUG, message = "picked peer", group = %self.name, key, peer = fetcher.peer());

            match self.fetch_remote(fetcher.as_ref(), key).await {
                Ok(value) => {
                    self.stats.record_peer_load();
                    return Ok(value);
                }
                Err(error) => {
                    self.stats.record_peer_error();
                    event!(
                        Level::WARN,
                        message = "peer fetch failed, loading locally",
                        group = %self.name,
                        key,
                        peer = fetcher.peer(),
                        %error
                    );
                }
            }
        }

        self.load_locally(key).await
    }

    async fn fetch_remote(&self, fetcher: &dyn Fetcher, key: &str) -> Result<ByteView> {
        match tokio::time::timeout(self.peer_timeout, fetcher.fetch(&self.name, key)).await {
            Ok(fetched) => fetched.map(ByteView::from),
            Err(_elapsed) => Err(Error::RemoteTimeout {
                peer: fetcher.peer().to_owned(),
                timeout: self.peer_timeout,
            }),
        }
    }

    async fn load_locally(&self, key: &str) -> Result<ByteView> {
        let bytes = match self.loader.load(key).await {
            Ok(bytes) => bytes,
            Err(source) => {
                self.stats.record_local_load_err();
                event!(Level::DEBUG, message = "origin load failed", group = %self.name, key, error = %source);
                return Err(Error::origin_load(key, source));
            }
        };

        // The loader may keep using its buffer.
        let value = ByteView::copy_from_slice(&bytes);
        self.stats.record_local_load();
        event!(Level::DEBUG, message = "loaded from origin", group = %self.name, key, bytes = value.len());

        self.populate_cache(key, value.clone());
        Ok(value)
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.cache.lock().add(key, value);
    }
}

impl fmt::Debug for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &*self.cache.lock())
            .field("peers", &self.peers.get().is_some())
            .field("peer_timeout", &self.peer_timeout)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Configures and creates a [`Group`].
///
/// | Setting | Default |
/// | :--- | :--- |
/// | [`cache_bytes`](Self::cache_bytes) | `0` (unbounded) |
/// | [`loader`](Self::loader) | none, required |
/// | [`peer_timeout`](Self::peer_timeout) | [`DEFAULT_PEER_TIMEOUT`] |
/// | `metrics` (feature `metrics`) | not exported |
#[must_use]
pub struct GroupBuilder {
    name: String,
    cache_bytes: u64,
    loader: Option<Box<dyn Loader>>,
    peer_timeout: Duration,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<Meter>,
}

impl GroupBuilder {
    /// Sets the local cache capacity in bytes. Zero means unbounded.
    pub const fn cache_bytes(mut self, bytes: u64) -> Self {
        self.cache_bytes = bytes;
        self
    }

    /// Sets the origin loader.
    pub fn loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Sets how long a peer may take to answer before the group loads locally.
    pub const fn peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    /// Publishes the group's counters through a meter from `provider`.
    ///
    /// Every increment of [`GroupStats`] is also added to the `shardcache.group.event.count`
    /// counter, with the group name and the event as attributes.
    #[cfg(any(feature = "metrics", test))]
    pub fn metrics(mut self, provider: &dyn MeterProvider) -> Self {
        self.meter = Some(crate::metrics::create_meter(provider));
        self
    }

    /// Creates the group.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingLoader`] if no loader was configured.
    pub fn build(self) -> Result<Group> {
        let Some(loader) = self.loader else {
            event!(Level::ERROR, message = "group has no loader", group = %self.name);
            return Err(Error::MissingLoader { group: self.name });
        };

        #[cfg(any(feature = "metrics", test))]
        let stats = match &self.meter {
            Some(meter) => GroupStats::exported(&self.name, meter),
            None => GroupStats::default(),
        };
        #[cfg(not(any(feature = "metrics", test)))]
        let stats = GroupStats::default();

        let evicting_group = self.name.clone();
        let cache = Lru::with_eviction(self.cache_bytes, move |key: &str, value: &ByteView| {
            event!(Level::TRACE, message = "evicted", group = %evicting_group, key, bytes = value.len());
        });

        Ok(Group {
            name: self.name,
            loader,
            cache: Mutex::new(cache),
            flight: Flight::new(),
            peers: OnceLock::new(),
            detached: AtomicBool::new(false),
            peer_timeout: self.peer_timeout,
            stats,
        })
    }
}

impl fmt::Debug for GroupBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupBuilder")
            .field("name", &self.name)
            .field("cache_bytes", &self.cache_bytes)
            .field("loader", &self.loader.is_some())
            .field("peer_timeout", &self.peer_timeout)
            .finish()
    }
}
