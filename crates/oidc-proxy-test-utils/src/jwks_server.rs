//! Mocked identity provider key-set endpoint.
//!
//! Wraps a wiremock `MockServer` serving a key-set document at
//! [`JWKS_PATH`]. Expectations set with [`MockJwksServer::start_expecting`]
//! are verified when the server is dropped.

use crate::crypto_fixtures::{jwks_document, TestSigningKey};
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the key set is served on.
pub const JWKS_PATH: &str = "/.well-known/jwks";

/// Mock key-set endpoint.
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    /// Start a server publishing `keys`.
    pub async fn start(keys: &[&TestSigningKey]) -> Self {
        Self::start_with_document(jwks_document(keys), None).await
    }

    /// Start a server publishing `keys` that must be fetched exactly
    /// `fetches` times before it is dropped.
    pub async fn start_expecting(keys: &[&TestSigningKey], fetches: u64) -> Self {
        Self::start_with_document(jwks_document(keys), Some(fetches)).await
    }

    /// Start a server publishing an arbitrary document.
    pub async fn start_with_document(document: Value, fetches: Option<u64>) -> Self {
        let server = MockServer::start().await;
        let mock = Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(document));
        match fetches {
            Some(n) => mock.expect(n).mount(&server).await,
            None => mock.mount(&server).await,
        }
        Self { server }
    }

    /// Start a server that fails every fetch with `status`.
    pub async fn start_failing(status: u16) -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        Self { server }
    }

    /// Replace the published key set.
    pub async fn publish(&self, keys: &[&TestSigningKey]) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_document(keys)))
            .mount(&self.server)
            .await;
    }

    /// Full URL of the key-set document.
    pub fn url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Number of requests received so far.
    pub async fn fetch_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }
}
