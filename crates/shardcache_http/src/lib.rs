// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! HTTP transport for `shardcache`.
//!
//! Every node of a cluster runs the same three pieces:
//!
//! - an [`HttpPool`], the [`PeerPicker`](shardcache::PeerPicker) that places the cluster's
//!   addresses on a consistent-hash ring and hands out an [`HttpFetcher`] for keys owned by
//!   another node;
//! - the [`serve`] loop, answering `GET {base_path}{group}/{key}` for keys this node owns;
//! - a [`GroupRegistry`](shardcache::GroupRegistry) resolving the group named in a request.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use shardcache::{GroupRegistry, LoaderFn};
//! use shardcache_http::{HttpPool, HttpPoolOptions, serve};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(GroupRegistry::new());
//! let scores = registry.new_group(
//!     "scores",
//!     2 << 10,
//!     LoaderFn::new(|key: &str| Err::<Vec<u8>, _>(format!("{key} not exist"))),
//! )?;
//!
//! let pool = Arc::new(HttpPool::new("127.0.0.1:8001".parse()?, HttpPoolOptions::default()));
//! pool.set_peers(["127.0.0.1:8001", "127.0.0.1:8002", "127.0.0.1:8003"])?;
//! scores.register_peers(pool.clone())?;
//!
//! // Runs until the group is destroyed.
//! serve(registry, pool).await?;
//! # Ok(())
//! # }
//! ```

mod addr;
mod error;
mod fetcher;
mod pool;
mod server;

pub use addr::validate_peer_addr;
pub use error::{Error, Result};
pub use fetcher::HttpFetcher;
pub use pool::{DEFAULT_BASE_PATH, DEFAULT_REQUEST_TIMEOUT, HttpPool, HttpPoolOptions};
pub use server::{serve, serve_on};
