// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! A sharded, read-through distributed cache.
//!
//! Each process holds a bounded in-memory cache per named [`Group`]. On a miss the group
//! either asks the peer that owns the key, chosen by a [`PeerPicker`], or invokes its
//! [`Loader`] to fetch the value from the authoritative source, and then caches it.
//!
//! # Lookup path
//!
//! 1. The local cache is checked; a hit returns immediately.
//! 2. Concurrent misses for one key are coalesced: only one of them loads, the others
//!    receive its result, value or error alike.
//! 3. If peer routing is attached and the key belongs to another peer, the value is fetched
//!    from that peer. A peer value is returned as is and never cached locally.
//! 4. If no peer owns the key, or the peer fails or times out, the loader runs. Its value is
//!    copied, cached locally and returned; its error is returned and nothing is cached.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use shardcache::{GroupRegistry, LoaderFn};
//!
//! # async fn example() -> Result<(), shardcache::Error> {
//! let registry = Arc::new(GroupRegistry::new());
//! let scores = registry.new_group(
//!     "scores",
//!     2 << 10,
//!     LoaderFn::new(|key: &str| match key {
//!         "Tom" => Ok("630"),
//!         "Jack" => Ok("589"),
//!         _ => Err(format!("{key} not exist")),
//!     }),
//! )?;
//!
//! assert_eq!(scores.get("Tom").await?.to_string(), "630");
//! assert!(scores.contains_cached("Tom"));
//!
//! let same = registry.lookup("scores").expect("registered above");
//! assert_eq!(same.get("Tom").await?, "630");
//! assert_eq!(same.stats().local_loads, 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Transports
//!
//! The core never talks to the network itself. A [`PeerPicker`] hands out [`Fetcher`]s and
//! the group calls them without knowing how they reach the peer. [`LocalFetcher`] reaches a
//! registry in the same process; the `shardcache_http` crate provides an HTTP transport.
//!
//! # Features
//!
//! - `metrics`: [`GroupBuilder::metrics`] publishes the [`GroupStats`] counters through
//!   OpenTelemetry.

mod byteview;
mod error;
mod group;
#[cfg(any(feature = "metrics", test))]
mod metrics;
mod peers;
mod registry;
mod stats;
#[cfg(test)]
mod testing;

pub use byteview::ByteView;
pub use error::{Error, Result};
pub use group::{DEFAULT_PEER_TIMEOUT, Group, GroupBuilder};
pub use peers::{BoxError, Fetcher, LocalFetcher, Loader, LoaderFn, PeerPicker};
pub use registry::GroupRegistry;
pub use stats::{GroupStats, GroupStatsSnapshot};
