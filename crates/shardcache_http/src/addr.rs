// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::net::SocketAddr;

use crate::{Error, Result};

/// Parses a peer address of the form `ip:port`.
///
/// The host must be an IP literal (IPv6 in brackets) and the port must not be zero. Host
/// names are not resolved.
///
/// # Errors
///
/// Returns [`Error::InvalidPeerAddr`] when `addr` does not meet these rules.
pub fn validate_peer_addr(addr: &str) -> Result<SocketAddr> {
    let parsed: SocketAddr = addr.trim().parse().map_err(|error: std::net::AddrParseError| Error::InvalidPeerAddr {
        addr: addr.to_owned(),
        reason: error.to_string(),
    })?;

    if parsed.port() == 0 {
        return Err(Error::InvalidPeerAddr {
            addr: addr.to_owned(),
            reason: "port must not be zero".to_owned(),
        });
    }

    Ok(parsed)
}
