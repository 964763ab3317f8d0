// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use shardcache::{Fetcher, PeerPicker};
use shardcache_ring::{DEFAULT_REPLICAS, HashFn, HashRing, default_hash};
use tokio::sync::watch;
use tracing::{Level, event};

use crate::fetcher::{HttpClient, new_client};
use crate::{HttpFetcher, Result, validate_peer_addr};

/// Default URL prefix under which peers answer cache lookups.
pub const DEFAULT_BASE_PATH: &str = "/_shardcache/";

/// Default deadline for one request to a peer.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings of an [`HttpPool`].
///
/// | Setting | Default |
/// | :--- | :--- |
/// | [`base_path`](Self::base_path) | [`DEFAULT_BASE_PATH`] |
/// | [`replicas`](Self::replicas) | [`DEFAULT_REPLICAS`] |
/// | [`hash`](Self::hash) | xxHash32 |
/// | [`request_timeout`](Self::request_timeout) | [`DEFAULT_REQUEST_TIMEOUT`] |
///
/// Every node of a cluster must use the same base path, replica count and hash function,
/// or they will disagree about key ownership.
#[derive(Clone, Debug)]
#[must_use]
pub struct HttpPoolOptions {
    base_path: String,
    replicas: usize,
    hash: HashFn,
    request_timeout: Duration,
}

impl Default for HttpPoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_owned(),
            replicas: DEFAULT_REPLICAS,
            hash: default_hash,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HttpPoolOptions {
    /// Sets the URL prefix. It is normalized to start and end with `/`.
    pub fn base_path(mut self, base_path: impl AsRef<str>) -> Self {
        let trimmed = base_path.as_ref().trim_matches('/');
        self.base_path = if trimmed.is_empty() { "/".to_owned() } else { format!("/{trimmed}/") };
        self
    }

    /// Sets the number of virtual nodes per peer.
    pub const fn replicas(mut self, replicas: usize) -> Self {
        self.replicas = replicas;
        self
    }

    /// Sets the ring hash function.
    pub const fn hash(mut self, hash: HashFn) -> Self {
        self.hash = hash;
        self
    }

    /// Sets the deadline for one request to a peer.
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

struct Peers {
    ring: HashRing,
    fetchers: HashMap<String, Arc<HttpFetcher>>,
}

/// Routes keys to peers over HTTP.
///
/// The pool knows its own address and the full cluster membership. Keys that hash to this
/// node are handled locally; keys owned by another node are fetched from it with an
/// [`HttpFetcher`]. The same pool is handed to [`serve`](crate::serve) to answer the
/// requests other nodes send here.
///
/// ```
/// use std::sync::Arc;
///
/// use shardcache::Group;
/// use shardcache_http::{HttpPool, HttpPoolOptions};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = Arc::new(HttpPool::new("127.0.0.1:8001".parse()?, HttpPoolOptions::default()));
/// pool.set_peers(["127.0.0.1:8001", "127.0.0.1:8002", "127.0.0.1:8003"])?;
///
/// let group = Group::builder("scores")
///     .loader(|key: String| async move { Ok::<_, std::io::Error>(key) })
///     .build()?;
/// group.register_peers(pool)?;
/// # Ok(())
/// # }
/// ```
pub struct HttpPool {
    self_addr: SocketAddr,
    self_id: String,
    options: HttpPoolOptions,
    client: HttpClient,
    peers: RwLock<Peers>,
    pub(crate) shutdown: watch::Sender<bool>,
    pub(crate) serving: AtomicBool,
    groups: AtomicUsize,
}

impl HttpPool {
    /// Creates a pool for the node listening on `self_addr`, with no peers yet.
    #[must_use]
    pub fn new(self_addr: SocketAddr, options: HttpPoolOptions) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            self_addr,
            self_id: self_addr.to_string(),
            peers: RwLock::new(Peers {
                ring: HashRing::with_hasher(options.replicas, options.hash),
                fetchers: HashMap::new(),
            }),
            options,
            client: new_client(),
            shutdown,
            serving: AtomicBool::new(false),
            groups: AtomicUsize::new(0),
        }
    }

    /// Returns this node's address.
    #[must_use]
    pub fn self_addr(&self) -> SocketAddr {
        self.self_addr
    }

    /// Returns the URL prefix under which this node answers peers.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.options.base_path
    }

    /// Replaces the cluster membership.
    ///
    /// `peers` lists every node, normally including this one. Duplicate addresses are
    /// registered once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPeerAddr`](crate::Error::InvalidPeerAddr) if any address is
    /// malformed; the previous membership is then kept.
    pub fn set_peers<I>(&self, peers: I) -> Result<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut addrs = peers
            .into_iter()
            .map(|peer| validate_peer_addr(peer.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        addrs.sort_unstable();
        addrs.dedup();

        let mut ring = HashRing::with_hasher(self.options.replicas, self.options.hash);
        ring.register(addrs.iter().map(ToString::to_string));

        let fetchers = addrs
            .iter()
            .filter(|addr| **addr != self.self_addr)
            .map(|addr| {
                let fetcher = HttpFetcher::with_client(*addr, &self.options.base_path, self.options.request_timeout, self.client.clone());
                (addr.to_string(), Arc::new(fetcher))
            })
            .collect();

        *self.peers.write() = Peers { ring, fetchers };

        event!(Level::INFO, message = "peers updated", node = %self.self_addr, peers = addrs.len());
        Ok(())
    }

    /// Returns the address of the node owning `key`, or `None` when no peers are set.
    #[must_use]
    pub fn owner(&self, key: &str) -> Option<String> {
        self.peers.read().ring.locate(key).map(str::to_owned)
    }
}

impl PeerPicker for HttpPool {
    fn pick(&self, key: &str) -> Option<Arc<dyn Fetcher>> {
        let peers = self.peers.read();
        let owner = peers.ring.locate(key)?;
        if owner == self.self_id {
            return None;
        }

        event!(Level::TRACE, message = "key owned by peer", node = %self.self_addr, key, peer = owner);
        let fetcher = Arc::clone(peers.fetchers.get(owner)?);
        Some(fetcher)
    }

    fn attach(&self) {
        self.groups.fetch_add(1, Ordering::AcqRel);
    }

    /// Detaches one group; the server shuts down once no attached group remains.
    fn stop(&self) {
        let (Ok(attached) | Err(attached)) = self
            .groups
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |groups| Some(groups.saturating_sub(1)));

        if attached > 1 {
            event!(Level::DEBUG, message = "group detached", node = %self.self_addr, remaining = attached - 1);
            return;
        }

        event!(Level::INFO, message = "stopping peer server", node = %self.self_addr);
        self.shutdown.send_replace(true);
    }
}

impl fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peers = self.peers.read();
        f.debug_struct("HttpPool")
            .field("self_addr", &self.self_addr)
            .field("options", &self.options)
            .field("ring", &peers.ring.members())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> SocketAddr {
        text.parse().expect("literal address")
    }

    #[test]
    fn base_path_is_normalized() {
        assert_eq!(HttpPoolOptions::default().base_path, "/_shardcache/");
        assert_eq!(HttpPoolOptions::default().base_path("cache").base_path, "/cache/");
        assert_eq!(HttpPoolOptions::default().base_path("/a/b/").base_path, "/a/b/");
        assert_eq!(HttpPoolOptions::default().base_path("").base_path, "/");
    }

    #[tokio::test]
    async fn empty_pool_picks_nobody() {
        let pool = HttpPool::new(addr("127.0.0.1:8001"), HttpPoolOptions::default());

        assert!(pool.pick("Tom").is_none());
        assert!(pool.owner("Tom").is_none());
    }

    #[tokio::test]
    async fn single_node_keeps_everything() {
        let pool = HttpPool::new(addr("127.0.0.1:8001"), HttpPoolOptions::default());
        pool.set_peers(["127.0.0.1:8001"]).expect("valid peers");

        for i in 0..100 {
            assert!(pool.pick(&format!("key-{i}")).is_none());
        }
    }

    #[tokio::test]
    async fn picks_follow_the_ring() {
        let members = ["127.0.0.1:8001", "127.0.0.1:8002", "127.0.0.1:8003"];
        let pool = HttpPool::new(addr(members[0]), HttpPoolOptions::default().replicas(20));
        pool.set_peers(members).expect("valid peers");

        let mut ring = HashRing::new(20);
        ring.register(members);

        let mut remote = 0;
        for i in 0..300 {
            let key = format!("key-{i}");
            let expected = ring.locate(&key).filter(|owner| *owner != members[0]);
            let picked = pool.pick(&key);

            assert_eq!(picked.as_ref().map(|fetcher| fetcher.peer()), expected, "{key}");
            remote += usize::from(picked.is_some());
        }
        assert!(remote > 0);
        assert!(remote < 300);
    }

    #[tokio::test]
    async fn invalid_membership_keeps_previous_ring() {
        let pool = HttpPool::new(addr("127.0.0.1:8001"), HttpPoolOptions::default());
        pool.set_peers(["127.0.0.1:8001", "127.0.0.1:8002"]).expect("valid peers");

        let error = pool.set_peers(["127.0.0.1:8001", "not-an-addr"]).expect_err("invalid peer");

        assert!(matches!(error, crate::Error::InvalidPeerAddr { .. }));
        assert_eq!(format!("{pool:?}").matches("127.0.0.1:800").count(), 3);
    }

    #[tokio::test]
    async fn duplicate_peers_register_once() {
        let pool = HttpPool::new(addr("127.0.0.1:8001"), HttpPoolOptions::default().replicas(10));
        pool.set_peers(["127.0.0.1:8002", "127.0.0.1:8002", "127.0.0.1:8001"]).expect("valid peers");

        assert_eq!(pool.peers.read().ring.len(), 20);
    }

    #[tokio::test]
    async fn server_outlives_all_but_last_group() {
        let pool = HttpPool::new(addr("127.0.0.1:8001"), HttpPoolOptions::default());
        pool.attach();
        pool.attach();

        pool.stop();
        assert!(!*pool.shutdown.borrow(), "one group is still attached");

        pool.stop();
        assert!(*pool.shutdown.borrow());
    }

    #[tokio::test]
    async fn unattached_pool_stops_at_once() {
        let pool = HttpPool::new(addr("127.0.0.1:8001"), HttpPoolOptions::default());

        pool.stop();

        assert!(*pool.shutdown.borrow());
    }
}
