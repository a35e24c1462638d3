//! TCP tunnel establishment and relay.
//!
//! A tunnel session pairs the taken-over client connection with a freshly
//! dialed destination connection and copies bytes both ways until either
//! side closes.
//!
//! # Lifecycle
//!
//! 1. [`dial`] connects to the destination, bounded by a timeout.
//! 2. The dispatcher answers 200 and hyper hands over the raw connection.
//! 3. [`relay`] runs one task per direction. The first direction to finish
//!    shuts down its write side and cancels the other, so a close on either
//!    leg ends the session. The session is over once both tasks returned.
//!
//! There is no idle timeout on an established tunnel.

use crate::observability::metrics;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

/// Default timeout for connecting to the destination.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-direction copy buffer size.
const RELAY_BUFFER_SIZE: usize = 16 * 1024;

/// Errors establishing the destination leg of a tunnel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TunnelError {
    /// The destination did not accept the connection in time.
    #[error("dial timed out")]
    DialTimeout,

    /// Resolution or connection failed.
    #[error("dial failed: {0}")]
    DialError(String),
}

/// Bytes copied in each direction over a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Client to destination.
    pub upstream_bytes: u64,

    /// Destination to client.
    pub downstream_bytes: u64,
}

/// Connect to `host:port`, failing with `DialTimeout` after `timeout`.
///
/// # Errors
///
/// - `TunnelError::DialTimeout` if the connect does not finish in time
/// - `TunnelError::DialError` on resolution or connection failure
pub async fn dial(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, TunnelError> {
    let stream = connect_with_timeout(TcpStream::connect((host, port)), timeout)
        .await
        .map_err(|e| {
            tracing::warn!(target: "proxy.tunnel", host = %host, port, error = %e, "Destination dial failed");
            e
        })?;

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(target: "proxy.tunnel", error = %e, "Failed to set TCP_NODELAY");
    }
    Ok(stream)
}

async fn connect_with_timeout<F>(connect: F, timeout: Duration) -> Result<TcpStream, TunnelError>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(TunnelError::DialError(e.to_string())),
        Err(_) => Err(TunnelError::DialTimeout),
    }
}

/// Copy bytes between `client` and `upstream` until either side closes.
///
/// Both directions run as separate tasks joined by a cancellation token.
/// Returns once both have finished.
pub async fn relay<C, U>(client: C, upstream: U) -> RelayStats
where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    U: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (client_read, client_write) = tokio::io::split(client);
    let (upstream_read, upstream_write) = tokio::io::split(upstream);
    let cancel = CancellationToken::new();

    let upstream_task = tokio::spawn(copy_direction(
        client_read,
        upstream_write,
        cancel.clone(),
        "upstream",
    ));
    let downstream_task = tokio::spawn(copy_direction(
        upstream_read,
        client_write,
        cancel.clone(),
        "downstream",
    ));

    let (upstream_bytes, downstream_bytes) = tokio::join!(upstream_task, downstream_task);

    RelayStats {
        upstream_bytes: upstream_bytes.unwrap_or_else(|e| {
            tracing::error!(target: "proxy.tunnel", error = %e, "Upstream relay task failed");
            0
        }),
        downstream_bytes: downstream_bytes.unwrap_or_else(|e| {
            tracing::error!(target: "proxy.tunnel", error = %e, "Downstream relay task failed");
            0
        }),
    }
}

/// Copy one direction until EOF, error, or cancellation by the other
/// direction. Shuts down the writer and cancels the peer on exit.
async fn copy_direction<R, W>(
    mut reader: R,
    mut writer: W,
    cancel: CancellationToken,
    direction: &'static str,
) -> u64
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut copied: u64 = 0;

    loop {
        let read = tokio::select! {
            () = cancel.cancelled() => break,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(target: "proxy.tunnel", direction, error = %e, "Relay read failed");
                break;
            }
        };

        let Some(chunk) = buf.get(..n) else {
            break;
        };

        let written = tokio::select! {
            () = cancel.cancelled() => break,
            written = writer.write_all(chunk) => written,
        };

        if let Err(e) = written {
            tracing::debug!(target: "proxy.tunnel", direction, error = %e, "Relay write failed");
            break;
        }
        copied += n as u64;
    }

    if let Err(e) = writer.shutdown().await {
        tracing::trace!(target: "proxy.tunnel", direction, error = %e, "Relay shutdown failed");
    }
    cancel.cancel();
    copied
}

/// Wait for hyper to release the client connection, then relay it to
/// `upstream` until the session ends.
///
/// Intended to be spawned after the 200 response has been returned; hyper
/// resolves the upgrade only once that response is written.
pub async fn run_session(on_upgrade: OnUpgrade, upstream: TcpStream, host: String) {
    let upgraded = match on_upgrade.await {
        Ok(upgraded) => upgraded,
        Err(e) => {
            tracing::warn!(target: "proxy.tunnel", host = %host, error = %e, "Client connection upgrade failed");
            return;
        }
    };

    metrics::tunnel_opened();
    tracing::debug!(target: "proxy.tunnel", host = %host, "Tunnel established");

    let stats = relay(TokioIo::new(upgraded), upstream).await;

    metrics::tunnel_closed(stats.upstream_bytes, stats.downstream_bytes);
    tracing::debug!(
        target: "proxy.tunnel",
        host = %host,
        upstream_bytes = stats.upstream_bytes,
        downstream_bytes = stats.downstream_bytes,
        "Tunnel closed"
    );
}
