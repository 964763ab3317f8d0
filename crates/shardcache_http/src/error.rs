// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::net::SocketAddr;

use http::StatusCode;
use thiserror::Error;

/// A specialized `Result` type for the HTTP transport.
pub type Result<T> = std::result::Result<T, Error>;

/// An error raised by the HTTP transport.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A peer address is not an `ip:port` pair.
    #[error("invalid peer address '{addr}': {reason}")]
    InvalidPeerAddr {
        /// The rejected address.
        addr: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The server could not listen on its address.
    #[error("cannot listen on {addr}")]
    Bind {
        /// The address.
        addr: SocketAddr,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A request could not be assembled.
    #[error(transparent)]
    Http(#[from] http::Error),

    /// A request could not be delivered to a peer.
    #[error("request to peer {peer} failed")]
    Request {
        /// The peer.
        peer: String,
        /// The client error.
        #[source]
        source: hyper_util::client::legacy::Error,
    },

    /// A peer answered with something other than `200 OK`.
    #[error("peer {peer} answered {status}: {message}")]
    Status {
        /// The peer.
        peer: String,
        /// The status it answered with.
        status: StatusCode,
        /// The response body, as text.
        message: String,
    },

    /// A peer's response body could not be read.
    #[error("reading response from peer {peer} failed")]
    Body {
        /// The peer.
        peer: String,
        /// The body error.
        #[source]
        source: hyper::Error,
    },

    /// The pool is already being served.
    #[error("a server is already running for {addr}")]
    AlreadyServing {
        /// The pool's address.
        addr: SocketAddr,
    },
}

impl From<Error> for shardcache::Error {
    fn from(error: Error) -> Self {
        match error {
            Error::Status { peer, status, message } => Self::remote(peer, format!("{status}: {message}")),
            other => Self::transport(other),
        }
    }
}
