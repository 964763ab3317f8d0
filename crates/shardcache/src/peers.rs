// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryFutureExt;
use futures::future::{self, BoxFuture};

use crate::{Error, GroupRegistry};

/// Type-erased error returned by loaders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fetches values from the authoritative source on a cache miss.
///
/// Async closures taking the key as a `String` implement `Loader` directly:
///
/// ```
/// use shardcache::Group;
///
/// let group = Group::builder("scores")
///     .loader(|key: String| async move { Ok::<_, std::io::Error>(format!("score of {key}")) })
///     .build()?;
/// # Ok::<(), shardcache::Error>(())
/// ```
///
/// Synchronous functions can be adapted with [`LoaderFn`].
pub trait Loader: Send + Sync {
    /// Loads the value stored under `key`.
    fn load(&self, key: &str) -> BoxFuture<'static, Result<Bytes, BoxError>>;
}

impl<F, Fut, T, E> Loader for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Into<Bytes> + 'static,
    E: Into<BoxError> + 'static,
{
    fn load(&self, key: &str) -> BoxFuture<'static, Result<Bytes, BoxError>> {
        Box::pin(
            self(key.to_owned())
                .map_ok(Into::<Bytes>::into)
                .map_err(Into::<BoxError>::into),
        )
    }
}

/// Adapts a synchronous function into a [`Loader`].
///
/// ```
/// use shardcache::{Group, LoaderFn};
///
/// let group = Group::builder("scores")
///     .loader(LoaderFn::new(|key: &str| match key {
///         "Tom" => Ok("630"),
///         _ => Err(format!("{key} not exist")),
///     }))
///     .build()?;
/// # Ok::<(), shardcache::Error>(())
/// ```
pub struct LoaderFn<F>(F);

impl<F> LoaderFn<F> {
    /// Wraps `func`.
    pub const fn new(func: F) -> Self {
        Self(func)
    }
}

impl<F, T, E> Loader for LoaderFn<F>
where
    F: Fn(&str) -> Result<T, E> + Send + Sync,
    T: Into<Bytes>,
    E: Into<BoxError>,
{
    fn load(&self, key: &str) -> BoxFuture<'static, Result<Bytes, BoxError>> {
        let result: Result<Bytes, BoxError> = (self.0)(key).map(Into::into).map_err(Into::into);
        Box::pin(future::ready(result))
    }
}

impl<F> fmt::Debug for LoaderFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderFn").finish_non_exhaustive()
    }
}

/// Routes keys to the peer that owns them.
pub trait PeerPicker: Send + Sync {
    /// Returns a fetcher for the peer owning `key`, or `None` when the key belongs to this
    /// process or no peers are known.
    fn pick(&self, key: &str) -> Option<Arc<dyn Fetcher>>;

    /// Called once when a group starts routing through this picker.
    ///
    /// One picker may serve several groups; each attached group is matched by exactly one
    /// later call to [`stop`](Self::stop).
    fn attach(&self) {}

    /// Releases resources held on behalf of one attached group, such as a listening server
    /// once no attached group remains.
    fn stop(&self) {}
}

/// Fetches a value from one specific peer.
pub trait Fetcher: Send + Sync {
    /// Identity of the peer, used in errors and logs.
    fn peer(&self) -> &str;

    /// Asks the peer for `key` in `group`.
    fn fetch<'a>(&'a self, group: &'a str, key: &'a str) -> BoxFuture<'a, Result<Bytes, Error>>;
}

/// A [`Fetcher`] that reaches a peer living in the same process through its registry.
///
/// Useful for embedding several cache nodes in one process and for exercising peer
/// routing without a network.
#[derive(Clone, Debug)]
pub struct LocalFetcher {
    peer: String,
    registry: Arc<GroupRegistry>,
}

impl LocalFetcher {
    /// Creates a fetcher that serves requests from `registry` under the identity `peer`.
    pub fn new(peer: impl Into<String>, registry: Arc<GroupRegistry>) -> Self {
        Self {
            peer: peer.into(),
            registry,
        }
    }
}

impl Fetcher for LocalFetcher {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn fetch<'a>(&'a self, group: &'a str, key: &'a str) -> BoxFuture<'a, Result<Bytes, Error>> {
        Box::pin(async move {
            let group = self.registry.lookup(group).ok_or_else(|| Error::GroupNotFound { name: group.to_owned() })?;
            group.record_server_request();
            let value = group.get(key).await?;
            Ok(value.into_bytes())
        })
    }
}
