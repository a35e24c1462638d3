//! # OIDC Proxy Test Utilities
//!
//! Shared test utilities for the OIDC proxy.
//!
//! This crate provides:
//! - Fixed RSA signing keys and their JWKs (reproducible tests)
//! - A claim builder for workflow identity tokens
//! - A mocked key-set endpoint (wiremock)
//! - Server test harness (TestProxyServer for E2E tests)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oidc_proxy_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() -> anyhow::Result<()> {
//!     let key = TestSigningKey::primary();
//!     let jwks = MockJwksServer::start(&[&key]).await;
//!     let proxy = TestProxyServer::spawn(&jwks.url()).await?;
//!
//!     let token = key.sign(&TestTokenBuilder::new().for_repository("orgX/app").build());
//!     let response = proxy.connect("good-host:443", Some(&token)).await?;
//!     assert_eq!(response.status, 200);
//!     Ok(())
//! }
//! ```

pub mod crypto_fixtures;
pub mod jwks_server;
pub mod server_harness;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::{jwks_document, TestSigningKey};
pub use jwks_server::{MockJwksServer, JWKS_PATH};
pub use server_harness::{proxy_authorization, ConnectResponse, TestProxyServer};
pub use token_builders::TestTokenBuilder;
