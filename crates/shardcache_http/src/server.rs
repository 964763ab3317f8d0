// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Request, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use shardcache::GroupRegistry;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{Level, event};

use crate::{Error, HttpPool, Result};

/// Answers peer lookups on the pool's own address until the pool is stopped.
///
/// Requests have the form `GET {base_path}{group}/{key}` with percent-encoded segments and
/// are resolved against `registry`:
///
/// | Outcome | Status |
/// | :--- | :--- |
/// | path outside the base path, or without both segments | `400 Bad Request` |
/// | unknown group | `404 Not Found` |
/// | lookup failed | `500 Internal Server Error` |
/// | value found | `200 OK`, `application/octet-stream` |
///
/// One pool usually serves every group of `registry`. The server stops accepting
/// connections once each group attached to the pool has been stopped or destroyed, or at
/// the first [`PeerPicker::stop`](shardcache::PeerPicker::stop) on a pool no group is
/// attached to.
///
/// # Errors
///
/// Returns [`Error::Bind`] if the address cannot be bound and [`Error::AlreadyServing`] if
/// the pool is already being served.
pub async fn serve(registry: Arc<GroupRegistry>, pool: Arc<HttpPool>) -> Result<()> {
    let addr = pool.self_addr();
    let listener = TcpListener::bind(addr).await.map_err(|source| Error::Bind { addr, source })?;
    serve_on(listener, registry, pool).await
}

/// Like [`serve`], on a listener bound by the caller.
///
/// # Errors
///
/// Returns [`Error::AlreadyServing`] if the pool is already being served.
pub async fn serve_on(listener: TcpListener, registry: Arc<GroupRegistry>, pool: Arc<HttpPool>) -> Result<()> {
    if pool.serving.swap(true, Ordering::AcqRel) {
        return Err(Error::AlreadyServing { addr: pool.self_addr() });
    }

    let base_path: Arc<str> = Arc::from(pool.base_path());
    let stopped = stopped(pool.shutdown.subscribe());
    tokio::pin!(stopped);

    event!(Level::INFO, message = "serving peers", node = %pool.self_addr(), base_path = &*base_path);

    loop {
        tokio::select! {
            () = &mut stopped => break,
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(accepted) => accepted,
                    Err(error) => {
                        event!(Level::WARN, message = "accept failed", node = %pool.self_addr(), %error);
                        continue;
                    }
                };

                let registry = Arc::clone(&registry);
                let base_path = Arc::clone(&base_path);
                tokio::spawn(async move {
                    let service = service_fn(move |request| handle(request, Arc::clone(&registry), Arc::clone(&base_path)));
                    if let Err(error) = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await {
                        event!(Level::DEBUG, message = "connection closed with error", %remote, %error);
                    }
                });
            }
        }
    }

    pool.serving.store(false, Ordering::Release);
    event!(Level::INFO, message = "stopped serving peers", node = %pool.self_addr());
    Ok(())
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    // A dropped sender means the pool is gone, which is as final as a stop.
    let _ = shutdown.wait_for(|stopped| *stopped).await;
}

async fn handle(request: Request<Incoming>, registry: Arc<GroupRegistry>, base_path: Arc<str>) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let path = request.uri().path();
    event!(Level::DEBUG, message = "peer request", method = %request.method(), path);

    let Some((group_name, key)) = parse_path(path, &base_path) else {
        return Ok(reply(StatusCode::BAD_REQUEST, format!("malformed request path: {path}")));
    };

    let Some(group) = registry.lookup(&group_name) else {
        return Ok(reply(StatusCode::NOT_FOUND, format!("no such group: {group_name}")));
    };

    group.record_server_request();

    match group.get(&key).await {
        Ok(value) => {
            let mut response = reply(StatusCode::OK, value.into_bytes());
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
            Ok(response)
        }
        Err(error) => Ok(reply(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())),
    }
}

/// Splits `{base_path}{group}/{key}` into decoded group and key.
fn parse_path(path: &str, base_path: &str) -> Option<(String, String)> {
    let (group, key) = path.strip_prefix(base_path)?.split_once('/')?;
    let group = urlencoding::decode(group).ok()?;
    let key = urlencoding::decode(key).ok()?;

    if group.is_empty() || key.is_empty() {
        return None;
    }

    Some((group.into_owned(), key.into_owned()))
}

fn reply(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/_shardcache/scores/Tom", Some(("scores", "Tom")))]
    #[case("/_shardcache/scores/a%2Fb%20c", Some(("scores", "a/b c")))]
    #[case("/_shardcache/my%20group/key/with/slashes", Some(("my group", "key/with/slashes")))]
    #[case("/_shardcache/scores", None)]
    #[case("/_shardcache/scores/", None)]
    #[case("/_shardcache//Tom", None)]
    #[case("/other/scores/Tom", None)]
    #[case("/_shardcache/scores/%FF", None)]
    fn parses_request_paths(#[case] path: &str, #[case] expected: Option<(&str, &str)>) {
        let parsed = parse_path(path, "/_shardcache/");
        let parsed = parsed.as_ref().map(|(group, key)| (group.as_str(), key.as_str()));
        assert_eq!(parsed, expected);
    }
}
