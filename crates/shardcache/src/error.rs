// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::BoxError;

/// A specialized `Result` type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Shared form of a boxed error, so a single failure can be handed to every coalesced caller.
type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// An error raised by a cache group or its registry.
///
/// Errors are cheap to clone: one load may finish many concurrent lookups, and each of
/// them receives the same error value.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A lookup was issued with an empty key.
    #[error("key must not be empty")]
    EmptyKey,

    /// A group was built without an origin loader.
    #[error("group '{group}' has no loader")]
    MissingLoader {
        /// Name of the group being built.
        group: String,
    },

    /// A group with the same name is already registered.
    #[error("group '{name}' is already registered")]
    DuplicateGroup {
        /// The conflicting name.
        name: String,
    },

    /// Peer routing was attached to a group twice.
    #[error("peers for group '{group}' are already registered")]
    PeersAlreadyRegistered {
        /// Name of the group.
        group: String,
    },

    /// No group with the requested name exists.
    #[error("group '{name}' not found")]
    GroupNotFound {
        /// The requested name.
        name: String,
    },

    /// The origin loader failed.
    #[error("loading '{key}' from origin failed: {source}")]
    OriginLoad {
        /// The key being loaded.
        key: String,
        /// The loader's error.
        #[source]
        source: SharedError,
    },

    /// A peer answered, but not with a value.
    #[error("peer {peer} failed: {message}")]
    RemoteFetch {
        /// Identity of the peer.
        peer: String,
        /// What the peer reported.
        message: String,
    },

    /// A peer did not answer in time.
    #[error("peer {peer} did not answer within {timeout:?}")]
    RemoteTimeout {
        /// Identity of the peer.
        peer: String,
        /// The deadline that expired.
        timeout: Duration,
    },

    /// The transport to a peer failed.
    #[error(transparent)]
    Transport(SharedError),
}

impl Error {
    /// Wraps a loader failure for `key`.
    pub fn origin_load(key: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::OriginLoad {
            key: key.into(),
            source: Arc::from(source.into()),
        }
    }

    /// Creates an error describing a failed answer from `peer`.
    pub fn remote(peer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteFetch {
            peer: peer.into(),
            message: message.into(),
        }
    }

    /// Wraps a transport failure.
    pub fn transport(source: impl Into<BoxError>) -> Self {
        Self::Transport(Arc::from(source.into()))
    }

    /// Returns `true` for errors caused by the arguments of the failing call.
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::EmptyKey | Self::MissingLoader { .. })
    }

    /// Returns `true` for failures talking to a peer.
    #[must_use]
    pub const fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteFetch { .. } | Self::RemoteTimeout { .. } | Self::Transport(_))
    }

    /// Returns `true` for configuration mistakes, such as registering something twice.
    #[must_use]
    pub const fn is_misuse(&self) -> bool {
        matches!(self, Self::DuplicateGroup { .. } | Self::PeersAlreadyRegistered { .. })
    }
}
