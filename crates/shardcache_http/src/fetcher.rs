// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use shardcache::Fetcher;
use tracing::{Level, event};

use crate::{Error, Result};

pub(crate) type HttpClient = Client<HttpConnector, Empty<Bytes>>;

pub(crate) fn new_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Fetches values from one peer over HTTP.
///
/// A lookup of `key` in `group` becomes `GET {base_url}{group}/{key}` with both segments
/// percent-encoded. Anything but `200 OK` is a failure.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    peer: String,
    base_url: String,
    timeout: Duration,
    client: HttpClient,
}

impl HttpFetcher {
    /// Creates a fetcher for the peer listening on `addr` under `base_path`.
    #[must_use]
    pub fn new(addr: SocketAddr, base_path: &str, timeout: Duration) -> Self {
        Self::with_client(addr, base_path, timeout, new_client())
    }

    pub(crate) fn with_client(addr: SocketAddr, base_path: &str, timeout: Duration, client: HttpClient) -> Self {
        Self {
            peer: addr.to_string(),
            base_url: format!("http://{addr}{base_path}"),
            timeout,
            client,
        }
    }

    /// Returns the URL prefix requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get(&self, group: &str, key: &str) -> Result<Bytes> {
        let uri = format!("{}{}/{}", self.base_url, urlencoding::encode(group), urlencoding::encode(key));
        event!(Level::TRACE, message = "fetching from peer", peer = %self.peer, %uri);

        let request = Request::get(uri).body(Empty::new())?;
        let response = self.client.request(request).await.map_err(|source| Error::Request {
            peer: self.peer.clone(),
            source,
        })?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|source| Error::Body {
                peer: self.peer.clone(),
                source,
            })?
            .to_bytes();

        if status != StatusCode::OK {
            return Err(Error::Status {
                peer: self.peer.clone(),
                status,
                message: String::from_utf8_lossy(&body).trim().to_owned(),
            });
        }

        Ok(body)
    }
}

impl Fetcher for HttpFetcher {
    fn peer(&self) -> &str {
        &self.peer
    }

    fn fetch<'a>(&'a self, group: &'a str, key: &'a str) -> BoxFuture<'a, shardcache::Result<Bytes>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.get(group, key)).await {
                Ok(fetched) => fetched.map_err(shardcache::Error::from),
                Err(_elapsed) => Err(shardcache::Error::RemoteTimeout {
                    peer: self.peer.clone(),
                    timeout: self.timeout,
                }),
            }
        })
    }
}
