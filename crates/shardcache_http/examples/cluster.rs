// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Runs a small cache cluster inside one process and queries it.
//!
//! Every node listens on its own local port, serves the `scores` group to its peers and
//! loads missing scores from a slow in-memory "database". Lookups are sent to the first
//! node; watch the logs to see which node loads each key.
//!
//! ```text
//! RUST_LOG=info,shardcache=debug cargo run -p shardcache_http --example cluster -- --nodes 3 --keys Tom,Jack,Sam,Kate
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use shardcache::{Group, GroupRegistry, PeerPicker};
use shardcache_http::{HttpPool, HttpPoolOptions, serve};
use tracing::{Level, event};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(about = "Runs a local shardcache cluster and looks up a few keys")]
struct Args {
    /// Number of nodes to start.
    #[arg(long, default_value_t = 3)]
    nodes: u16,

    /// Port of the first node; the others use the following ports.
    #[arg(long, default_value_t = 8001)]
    base_port: u16,

    /// Keys to look up through the first node.
    #[arg(long, value_delimiter = ',', default_value = "Tom,Jack,Sam,Kate")]
    keys: Vec<String>,

    /// Local cache capacity of every node, in bytes.
    #[arg(long, default_value_t = 2 << 10)]
    cache_bytes: u64,
}

fn database() -> HashMap<&'static str, &'static str> {
    HashMap::from([("Tom", "630"), ("Jack", "589"), ("Sam", "567")])
}

fn scores_group(node: &str, cache_bytes: u64) -> Result<Group, shardcache::Error> {
    let db = Arc::new(database());
    let node = node.to_owned();

    Group::builder("scores")
        .cache_bytes(cache_bytes)
        .loader(move |key: String| {
            let db = Arc::clone(&db);
            let node = node.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                event!(Level::INFO, message = "slow database lookup", %node, %key);
                db.get(key.as_str()).copied().ok_or_else(|| format!("{key} not exist"))
            }
        })
        .build()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let addrs: Vec<String> = (0..args.nodes)
        .map(|i| format!("127.0.0.1:{}", args.base_port + i))
        .collect();

    let mut registries = Vec::new();
    let mut groups = Vec::new();
    let mut servers = Vec::new();

    for addr in &addrs {
        let registry = Arc::new(GroupRegistry::new());
        let group = registry.insert(scores_group(addr, args.cache_bytes)?)?;

        let pool = Arc::new(HttpPool::new(addr.parse()?, HttpPoolOptions::default()));
        pool.set_peers(&addrs)?;
        group.register_peers(Arc::clone(&pool) as Arc<dyn PeerPicker>)?;

        servers.push(tokio::spawn(serve(Arc::clone(&registry), pool)));
        registries.push(registry);
        groups.push(group);
    }

    // Let the servers bind before the first lookup.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let front = &groups[0];
    for round in 1..=2 {
        for key in &args.keys {
            match front.get(key).await {
                Ok(value) => println!("round {round}: {key} = {value}"),
                Err(error) => println!("round {round}: {key} failed: {error}"),
            }
        }
    }

    for (addr, group) in addrs.iter().zip(&groups) {
        println!("{addr}: {} cached entries, {:?}", group.cached_entries(), group.stats());
    }

    for registry in &registries {
        registry.clear();
    }
    for server in servers {
        server.await??;
    }

    Ok(())
}
