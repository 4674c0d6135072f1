//! TCP listener binding.
//!
//! # Responsibilities
//! - Resolve the configured host
//! - Bind exactly once; a failed bind is reported, never retried
//! - Classify failures (address in use, permission denied)

use std::io::ErrorKind;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::launch::LaunchSpec;

/// Error type for listener binding.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("port {port} is outside 1..=65535")]
    InvalidPort { port: u16 },

    #[error("cannot resolve {host}:{port}: {reason}")]
    InvalidAddress {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("address {addr} already in use")]
    AddressInUse { addr: SocketAddr },

    #[error("permission denied binding {addr}")]
    PermissionDenied { addr: SocketAddr },

    #[error("failed to bind {addr}: {source}")]
    Io {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Bind the listening socket for `spec`.
///
/// On error nothing is left listening: the socket is dropped before returning.
pub async fn bind(spec: &LaunchSpec) -> Result<TcpListener, BindError> {
    let addr = resolve(spec).await?;

    let listener = TcpListener::bind(addr).await.map_err(|source| match source.kind() {
        ErrorKind::AddrInUse => BindError::AddressInUse { addr },
        ErrorKind::PermissionDenied => BindError::PermissionDenied { addr },
        _ => BindError::Io { addr, source },
    })?;

    let local_addr = listener
        .local_addr()
        .map_err(|source| BindError::Io { addr, source })?;

    tracing::info!(address = %local_addr, "Listener bound");
    Ok(listener)
}

async fn resolve(spec: &LaunchSpec) -> Result<SocketAddr, BindError> {
    let invalid = |reason: String| BindError::InvalidAddress {
        host: spec.host().to_string(),
        port: spec.port(),
        reason,
    };

    let mut addrs = tokio::net::lookup_host((spec.host(), spec.port()))
        .await
        .map_err(|e| invalid(e.to_string()))?;

    addrs
        .next()
        .ok_or_else(|| invalid("no addresses found".to_string()))
}
