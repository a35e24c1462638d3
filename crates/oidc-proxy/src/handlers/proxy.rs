//! Request dispatcher.
//!
//! Every inbound request passes through [`dispatch`], which walks a fixed
//! sequence of checks and stops at the first failure:
//!
//! 1. `GET /ping` (any case) answers `200 PONG`
//! 2. Method must be CONNECT (405)
//! 3. `Proxy-Authorization: Basic` credentials carry the token (401)
//! 4. Token validates against the key set (401)
//! 5. `repository_owner`, `repository`, `aud` are allowed (401)
//! 6. Destination host is allowed (403)
//! 7. Destination dials (408) and the connection can be taken over (417)
//!
//! On success the client gets `200` and the relay runs in the background.

use crate::auth::claims::{AUDIENCE, REPOSITORY};
use crate::auth::{authorize_claims, authorize_host};
use crate::errors::ProxyError;
use crate::handlers::health;
use crate::observability::metrics;
use crate::routes::GatewayState;
use crate::services::{self, TunnelError};
use axum::{
    body::Body,
    http::{header::PROXY_AUTHORIZATION, HeaderMap, Method, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use common::secret::SecretString;
use hyper::upgrade::OnUpgrade;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Handle one request. Never fails: every rejection becomes a response.
#[instrument(skip_all, name = "proxy.dispatch", fields(method = %req.method(), uri = %req.uri()))]
pub async fn dispatch<B>(state: Arc<GatewayState>, req: Request<B>) -> Result<Response, Infallible> {
    let start = Instant::now();

    if health::is_ping(&req) {
        metrics::record_request("ping", start.elapsed());
        return Ok(health::ping());
    }

    let (outcome, response) = match handle_connect(&state, req).await {
        Ok(response) => ("tunnel", response),
        Err(e) => {
            tracing::info!(
                target: "proxy.dispatch",
                status = e.status_code().as_u16(),
                reason = %e,
                "Request rejected"
            );
            (e.outcome(), e.into_response())
        }
    };

    metrics::record_request(outcome, start.elapsed());
    Ok(response)
}

/// Authorize a CONNECT request and start its tunnel.
async fn handle_connect<B>(state: &GatewayState, mut req: Request<B>) -> Result<Response, ProxyError> {
    if req.method() != Method::CONNECT {
        return Err(ProxyError::MethodNotAllowed(req.method().to_string()));
    }

    let token = extract_token(req.headers())?;

    let claims = state.key_set.validate(&token).await?;

    authorize_claims(
        &claims,
        &state.allowed_owners,
        &state.allowed_repos,
        &state.allowed_auds,
        state.log_claim_values,
    )?;

    let (host, port) = connect_target(req.uri());
    if !authorize_host(&host, &state.allowed_hosts) {
        return Err(ProxyError::HostForbidden(host));
    }

    let Some(port) = port else {
        return Err(ProxyError::DialFailed(TunnelError::DialError(
            "missing port".to_string(),
        )));
    };
    let upstream = services::dial(&host, port, state.dial_timeout)
        .await
        .map_err(ProxyError::DialFailed)?;

    // hyper only attaches this on connections served with upgrades enabled
    let Some(on_upgrade) = req.extensions_mut().remove::<OnUpgrade>() else {
        tracing::error!(target: "proxy.dispatch", "Connection does not support takeover");
        return Err(ProxyError::HijackUnsupported);
    };

    tracing::info!(
        target: "proxy.dispatch",
        host = %host,
        repository = claims.string_claim(REPOSITORY).unwrap_or_default(),
        aud = claims.string_claim(AUDIENCE).unwrap_or_default(),
        "Tunnel authorized"
    );

    tokio::spawn(services::run_session(on_upgrade, upstream, host));

    Ok((StatusCode::OK, Body::empty()).into_response())
}

/// Extract the token from `Proxy-Authorization: Basic base64(<user>:<token>)`.
///
/// The decoded credentials must split on `:` into exactly two parts; the
/// user part is ignored.
///
/// # Errors
///
/// - `ProxyError::MissingCredentials` if the header is absent
/// - `ProxyError::MalformedCredentials` for any other shape
pub fn extract_token(headers: &HeaderMap) -> Result<SecretString, ProxyError> {
    let value = headers
        .get(PROXY_AUTHORIZATION)
        .ok_or(ProxyError::MissingCredentials)?;

    let value = value
        .to_str()
        .map_err(|_| ProxyError::MalformedCredentials("header is not visible ASCII"))?;

    let encoded = value
        .strip_prefix("Basic ")
        .ok_or(ProxyError::MalformedCredentials("scheme is not Basic"))?;

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| ProxyError::MalformedCredentials("credentials are not base64"))?;

    let credentials = String::from_utf8(decoded)
        .map_err(|_| ProxyError::MalformedCredentials("credentials are not UTF-8"))?;

    let mut parts = credentials.split(':');
    let (Some(_user), Some(token), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ProxyError::MalformedCredentials(
            "credentials are not user:token",
        ));
    };

    Ok(SecretString::from(token))
}

/// Destination host (port and IPv6 brackets stripped) and port of a
/// CONNECT target.
fn connect_target(uri: &Uri) -> (String, Option<u16>) {
    match uri.authority() {
        Some(authority) => {
            let host = authority
                .host()
                .trim_start_matches('[')
                .trim_end_matches(']');
            (host.to_string(), authority.port_u16())
        }
        None => (String::new(), None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::jwks::mock::MockKeySetSource;
    use crate::auth::{AllowList, KeySetCache, KeySetSource};
    use crate::config::Config;
    use axum::http::HeaderValue;
    use common::secret::ExposeSecret;
    use http_body_util::BodyExt;
    use std::collections::HashMap;
    use std::time::Duration;

    fn basic(credentials: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("Basic {}", STANDARD.encode(credentials));
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_str(&value).unwrap());
        headers
    }

    fn state_with(source: Arc<MockKeySetSource>) -> Arc<GatewayState> {
        let mut config = Config::from_vars(&HashMap::new()).unwrap();
        config.allowed_hosts = AllowList::from_values(["good-host", "127.0.0.1"]);
        let cache = KeySetCache::new(source as Arc<dyn KeySetSource>);
        Arc::new(GatewayState::with_key_set(&config, cache).with_dial_timeout(Duration::from_millis(500)))
    }

    fn request(method: Method, uri: &str, headers: HeaderMap) -> Request<Body> {
        let mut req = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        *req.headers_mut() = headers;
        req
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    // -------------------------------------------------------------------------
    // Credential extraction
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_token_valid() {
        let token = extract_token(&basic("x:the-token")).unwrap();
        assert_eq!(token.expose_secret(), "the-token");
    }

    #[test]
    fn test_extract_token_empty_user_allowed() {
        let token = extract_token(&basic(":the-token")).unwrap();
        assert_eq!(token.expose_secret(), "the-token");
    }

    #[test]
    fn test_extract_token_missing_header() {
        assert!(matches!(
            extract_token(&HeaderMap::new()),
            Err(ProxyError::MissingCredentials)
        ));
    }

    #[test]
    fn test_extract_token_wrong_part_count() {
        assert!(matches!(
            extract_token(&basic("only-one-part")),
            Err(ProxyError::MalformedCredentials(_))
        ));
        assert!(matches!(
            extract_token(&basic("a:b:c")),
            Err(ProxyError::MalformedCredentials(_))
        ));
    }

    #[test]
    fn test_extract_token_wrong_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            PROXY_AUTHORIZATION,
            HeaderValue::from_static("Bearer eyJhbGciOiJSUzI1NiJ9.e30.sig"),
        );
        assert!(matches!(
            extract_token(&headers),
            Err(ProxyError::MalformedCredentials(_))
        ));
    }

    #[test]
    fn test_extract_token_not_base64() {
        let mut headers = HeaderMap::new();
        headers.insert(PROXY_AUTHORIZATION, HeaderValue::from_static("Basic %%%"));
        assert!(matches!(
            extract_token(&headers),
            Err(ProxyError::MalformedCredentials(_))
        ));
    }

    #[test]
    fn test_connect_target() {
        let uri: Uri = "good-host:443".parse().unwrap();
        assert_eq!(connect_target(&uri), ("good-host".to_string(), Some(443)));

        let uri: Uri = "good-host".parse().unwrap();
        assert_eq!(connect_target(&uri), ("good-host".to_string(), None));

        let uri: Uri = "[::1]:8443".parse().unwrap();
        assert_eq!(connect_target(&uri), ("::1".to_string(), Some(8443)));

        let uri: Uri = "/ping".parse().unwrap();
        assert_eq!(connect_target(&uri), (String::new(), None));
    }

    // -------------------------------------------------------------------------
    // Dispatch ordering
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_ping_needs_no_credentials() {
        let source = Arc::new(MockKeySetSource::returning(r#"{"keys":[]}"#));
        let state = state_with(Arc::clone(&source));

        let response = dispatch(state, request(Method::GET, "/PiNg", HeaderMap::new()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "PONG\n");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_other_methods_rejected() {
        let source = Arc::new(MockKeySetSource::returning(r#"{"keys":[]}"#));
        let state = state_with(Arc::clone(&source));

        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            let response = dispatch(
                Arc::clone(&state),
                request(method, "http://good-host/", basic("x:token")),
            )
            .await
            .unwrap();

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
            assert_eq!(body_string(response).await, "Method Not Allowed\n");
        }
        assert_eq!(source.calls(), 0, "key set must not be touched");
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected_before_key_set() {
        let source = Arc::new(MockKeySetSource::returning(r#"{"keys":[]}"#));
        let state = state_with(Arc::clone(&source));

        let response = dispatch(
            state,
            request(Method::CONNECT, "good-host:443", HeaderMap::new()),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_string(response).await, "Unauthorized\n");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_key_rejected() {
        let source = Arc::new(MockKeySetSource::returning(r#"{"keys":[]}"#));
        let state = state_with(Arc::clone(&source));
        let header = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .encode(r#"{"alg":"RS256","kid":"k1"}"#);

        let response = dispatch(
            state,
            request(
                Method::CONNECT,
                "good-host:443",
                basic(&format!("x:{header}.e30.c2ln")),
            ),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_key_set_failure_is_unauthorized() {
        let source = Arc::new(MockKeySetSource::sequence(vec![Err(
            crate::auth::FetchError::Status(500),
        )]));
        let state = state_with(Arc::clone(&source));

        let response = dispatch(
            state,
            request(Method::CONNECT, "good-host:443", basic("x:a.b.c")),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // -------------------------------------------------------------------------
    // Signed tokens
    // -------------------------------------------------------------------------

    const PRIMARY_PEM: &str =
        include_str!("../../../oidc-proxy-test-utils/fixtures/signing_key_primary.pem");
    const PRIMARY_N: &str =
        include_str!("../../../oidc-proxy-test-utils/fixtures/signing_key_primary.n");

    fn signed_source() -> Arc<MockKeySetSource> {
        let key_set = serde_json::json!({
            "keys": [{"kty": "RSA", "kid": "k1", "n": PRIMARY_N.trim(), "e": "AQAB"}]
        });
        Arc::new(MockKeySetSource::returning(&key_set.to_string()))
    }

    fn signed_token() -> String {
        let header = jsonwebtoken::Header {
            kid: Some("k1".to_string()),
            ..jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256)
        };
        let claims = serde_json::json!({
            "repository_owner": "orgX",
            "repository": "orgX/app",
            "aud": "my-service",
            "exp": chrono::Utc::now().timestamp() + 3600,
        });
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(PRIMARY_PEM.as_bytes()).unwrap();
        jsonwebtoken::encode(&header, &claims, &key).unwrap()
    }

    async fn connect_with_token(state: Arc<GatewayState>, target: &str) -> Response {
        let credentials = basic(&format!("x:{}", signed_token()));
        dispatch(state, request(Method::CONNECT, target, credentials))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_disallowed_host_forbidden() {
        let state = state_with(signed_source());
        let response = connect_with_token(state, "evil-host:443").await;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_string(response).await, "Forbidden\n");
    }

    #[tokio::test]
    async fn test_target_without_port_is_request_timeout() {
        let state = state_with(signed_source());
        let response = connect_with_token(state, "good-host").await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_ipv6_literal_matches_unbracketed_allow_list_entry() {
        let mut config = Config::from_vars(&HashMap::new()).unwrap();
        config.allowed_hosts = AllowList::from_values(["::1"]);
        let cache = KeySetCache::new(signed_source() as Arc<dyn KeySetSource>);
        let state = Arc::new(
            GatewayState::with_key_set(&config, cache).with_dial_timeout(Duration::from_millis(500)),
        );

        // Port 1 is closed; the host check passes and the dial is what fails
        let response = connect_with_token(state, "[::1]:1").await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_refused_dial_is_request_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let state = state_with(signed_source());
        let response = connect_with_token(state, &format!("127.0.0.1:{port}")).await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body_string(response).await, "Request Timeout\n");
    }

    #[tokio::test]
    async fn test_connection_without_takeover_is_expectation_failed() {
        // Built requests carry no OnUpgrade, like a connection served
        // without upgrades
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let state = state_with(signed_source());
        let response = connect_with_token(state, &format!("127.0.0.1:{port}")).await;

        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);
        assert_eq!(body_string(response).await, "Expectation Failed\n");
    }
}
