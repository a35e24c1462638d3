//! HTTP/1.1 listener for the proxy.
//!
//! Each accepted connection is served on its own task with upgrades enabled,
//! so that a CONNECT request answered with 200 hands the raw connection to
//! the tunnel relay. Request line and headers must arrive within
//! [`HEADER_READ_TIMEOUT`].

use crate::routes::{build_service, GatewayState};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Time allowed for a client to send the request line and headers.
pub const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Accept connections until `shutdown` is cancelled.
///
/// Connections already accepted, and tunnels running on them, are not
/// interrupted when the loop stops.
pub async fn serve(listener: TcpListener, state: Arc<GatewayState>, shutdown: CancellationToken) {
    let service = build_service(state);

    loop {
        let accepted = tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!(target: "proxy.server", "Listener stopped accepting connections");
                break;
            }
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(target: "proxy.server", error = %e, "Failed to accept connection");
                continue;
            }
        };

        let hyper_service = TowerToHyperService::new(service.clone());
        tokio::spawn(async move {
            let connection = http1::Builder::new()
                .timer(TokioTimer::new())
                .header_read_timeout(HEADER_READ_TIMEOUT)
                .serve_connection(TokioIo::new(stream), hyper_service)
                .with_upgrades();

            if let Err(e) = connection.await {
                tracing::debug!(target: "proxy.server", peer = %peer, error = %e, "Connection ended with error");
            }
        });
    }
}
