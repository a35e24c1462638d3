//! OIDC proxy error types.
//!
//! All errors map to a single HTTP status code via the `IntoResponse` impl.
//! The response body is only the standard reason phrase: claim values, key
//! material and upstream failures are logged server-side and never returned
//! to the client.

use crate::auth::{ClaimError, TokenError};
use crate::services::TunnelError;
use axum::{
    body::Body,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Request-level rejection reasons.
///
/// Maps to HTTP status codes:
/// - MethodNotAllowed: 405 Method Not Allowed
/// - MissingCredentials, MalformedCredentials, InvalidToken,
///   ClaimUnauthorized: 401 Unauthorized
/// - HostForbidden: 403 Forbidden
/// - DialFailed: 408 Request Timeout
/// - HijackUnsupported: 417 Expectation Failed
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Missing Proxy-Authorization header")]
    MissingCredentials,

    #[error("Malformed credentials: {0}")]
    MalformedCredentials(&'static str),

    #[error("Token rejected: {0}")]
    InvalidToken(#[from] TokenError),

    #[error("Claim not authorized: {0}")]
    ClaimUnauthorized(#[from] ClaimError),

    #[error("Destination host not allowed: {0}")]
    HostForbidden(String),

    #[error("Destination unreachable: {0}")]
    DialFailed(TunnelError),

    #[error("Connection takeover unsupported")]
    HijackUnsupported,
}

impl ProxyError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::MissingCredentials
            | ProxyError::MalformedCredentials(_)
            | ProxyError::InvalidToken(_)
            | ProxyError::ClaimUnauthorized(_) => StatusCode::UNAUTHORIZED,
            ProxyError::HostForbidden(_) => StatusCode::FORBIDDEN,
            ProxyError::DialFailed(_) => StatusCode::REQUEST_TIMEOUT,
            ProxyError::HijackUnsupported => StatusCode::EXPECTATION_FAILED,
        }
    }

    /// Low-cardinality label for the request outcome metric.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed(_) => "method_not_allowed",
            ProxyError::MissingCredentials | ProxyError::MalformedCredentials(_) => {
                "bad_credentials"
            }
            ProxyError::InvalidToken(TokenError::Fetch(_)) => "jwks_unavailable",
            ProxyError::InvalidToken(_) => "invalid_token",
            ProxyError::ClaimUnauthorized(_) => "claim_unauthorized",
            ProxyError::HostForbidden(_) => "host_forbidden",
            ProxyError::DialFailed(_) => "dial_failed",
            ProxyError::HijackUnsupported => "hijack_unsupported",
        }
    }
}

/// Plain-text response whose body is the reason phrase of `status`.
pub(crate) fn status_response(status: StatusCode) -> Response {
    let body = format!("{}\n", status.canonical_reason().unwrap_or_default());
    let mut response = (status, Body::from(body)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        status_response(self.status_code())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::FetchError;
    use http_body_util::BodyExt;

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ProxyError::MethodNotAllowed("GET".to_string()).status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ProxyError::MissingCredentials.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::MalformedCredentials("not basic").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::InvalidToken(TokenError::UnknownKeyId).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::ClaimUnauthorized(ClaimError::Missing("aud")).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ProxyError::HostForbidden("evil-host".to_string()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ProxyError::DialFailed(TunnelError::DialTimeout).status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            ProxyError::HijackUnsupported.status_code(),
            StatusCode::EXPECTATION_FAILED
        );
    }

    #[test]
    fn test_fetch_failure_has_own_outcome() {
        let err = ProxyError::InvalidToken(TokenError::Fetch(FetchError::Status(500)));
        assert_eq!(err.outcome(), "jwks_unavailable");
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_response_body_is_reason_phrase_only() {
        let response = ProxyError::HostForbidden("secret-host.internal".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_string(response).await;
        assert_eq!(body, "Forbidden\n");
    }

    #[tokio::test]
    async fn test_claim_value_never_in_body() {
        let err = ProxyError::ClaimUnauthorized(ClaimError::NotAllowed("repository"));
        let response = err.into_response();

        let body = body_string(response).await;
        assert_eq!(body, "Unauthorized\n");
        assert!(!body.contains("repository"));
    }

    #[tokio::test]
    async fn test_hijack_unsupported_body() {
        let response = ProxyError::HijackUnsupported.into_response();

        assert_eq!(response.status(), StatusCode::EXPECTATION_FAILED);
        assert_eq!(body_string(response).await, "Expectation Failed\n");
    }
}
