//! Test server harness for E2E testing
//!
//! Provides `TestProxyServer` for spawning real proxy instances in tests and
//! a raw CONNECT client for driving them.

use base64::{engine::general_purpose::STANDARD, Engine};
use oidc_proxy::config::Config;
use oidc_proxy::routes::GatewayState;
use oidc_proxy::server;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// `Proxy-Authorization` header value carrying `token`.
pub fn proxy_authorization(token: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("x:{token}")))
}

/// Response to a raw CONNECT request.
pub struct ConnectResponse {
    /// HTTP status code.
    pub status: u16,

    /// Response body (the reason phrase for rejections, empty on success).
    pub body: String,

    /// The client connection; a tunnel to the destination after a 200.
    pub stream: TcpStream,
}

/// Test harness for spawning the proxy in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_ping() -> anyhow::Result<()> {
///     let server = TestProxyServer::spawn("http://127.0.0.1:1/jwks").await?;
///     let response = server
///         .send_raw("GET /ping HTTP/1.1\r\nHost: proxy\r\n\r\n")
///         .await?;
///     assert_eq!(response.status, 200);
///     Ok(())
/// }
/// ```
pub struct TestProxyServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestProxyServer {
    /// Spawn a proxy with wildcard allow-lists fetching keys from `jwks_url`.
    pub async fn spawn(jwks_url: &str) -> Result<Self, anyhow::Error> {
        Self::spawn_with(jwks_url, &[], None).await
    }

    /// Spawn a proxy with extra `ACTIONS_OIDC_PROXY_*` variables and an
    /// optional destination dial timeout.
    ///
    /// The server will:
    /// - Bind to a random available port (127.0.0.1:0)
    /// - Serve in the background until dropped
    pub async fn spawn_with(
        jwks_url: &str,
        vars: &[(&str, &str)],
        dial_timeout: Option<Duration>,
    ) -> Result<Self, anyhow::Error> {
        let mut env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        env.insert(
            "ACTIONS_OIDC_PROXY_JWKS_URL".to_string(),
            jwks_url.to_string(),
        );
        env.insert(
            "ACTIONS_OIDC_PROXY_BIND_HOST".to_string(),
            "127.0.0.1".to_string(),
        );
        env.insert("ACTIONS_OIDC_PROXY_PORT".to_string(), "0".to_string());

        let config = Config::from_vars(&env)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let mut state = GatewayState::from_config(&config);
        if let Some(timeout) = dial_timeout {
            state = state.with_dial_timeout(timeout);
        }

        let listener = TcpListener::bind(config.bind_address())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(server::serve(listener, Arc::new(state), shutdown.clone()));

        Ok(Self {
            addr,
            shutdown,
            _handle: handle,
        })
    }

    /// Send `CONNECT target` with an optional token and read the response
    /// head (and body, if any).
    pub async fn connect(
        &self,
        target: &str,
        token: Option<&str>,
    ) -> Result<ConnectResponse, anyhow::Error> {
        let auth = token
            .map(|t| format!("Proxy-Authorization: {}\r\n", proxy_authorization(t)))
            .unwrap_or_default();
        let request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n{auth}\r\n");
        self.send_raw(&request).await
    }

    /// Send a raw HTTP/1.1 request and read the response head and body.
    pub async fn send_raw(&self, request: &str) -> Result<ConnectResponse, anyhow::Error> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(request.as_bytes()).await?;

        let head = read_head(&mut stream).await?;
        let status = parse_status(&head)?;

        let content_length = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = vec![0u8; content_length];
        stream.read_exact(&mut body).await?;

        Ok(ConnectResponse {
            status,
            body: String::from_utf8(body)?,
            stream,
        })
    }
}

/// Read up to and including the blank line ending the response head,
/// without consuming any tunneled bytes after it.
async fn read_head(stream: &mut TcpStream) -> Result<String, anyhow::Error> {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() > 16 * 1024 {
            anyhow::bail!("response head too large");
        }
        let byte = stream.read_u8().await?;
        head.push(byte);
    }
    Ok(String::from_utf8(head)?)
}

fn parse_status(head: &str) -> Result<u16, anyhow::Error> {
    head.split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("invalid status line: {head}"))
}

impl Drop for TestProxyServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
