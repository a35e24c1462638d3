//! Key-set cache for the identity provider's public keys.
//!
//! The cache holds the raw bytes of the last successfully fetched key-set
//! document together with the time of that fetch. It is refreshed lazily by
//! traffic: a request that finds the cache empty or older than
//! [`REFRESH_INTERVAL`] fetches a new document before validating.
//!
//! # Concurrency
//!
//! One `tokio::sync::Mutex` covers the freshness check, the fetch and the
//! validation that follows. Concurrent requests arriving while the cache is
//! stale therefore trigger exactly one fetch; the others wait for it and
//! then validate against the fresh bytes.
//!
//! # Failure
//!
//! A failed fetch leaves both the cached bytes and the timestamp untouched,
//! so the next request retries. The failing request itself is rejected.

use crate::auth::claims::Claims;
use crate::auth::jwt::{validate_token, TokenError};
use crate::observability::metrics;
use async_trait::async_trait;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;

/// How long a fetched key set is considered fresh.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Errors from fetching the key-set document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, TLS or timeout failure.
    #[error("key set request failed: {0}")]
    Request(String),

    /// The endpoint answered with a non-success status.
    #[error("key set endpoint returned status {0}")]
    Status(u16),

    /// The body is not a key-set document.
    #[error("key set document is invalid: {0}")]
    Parse(String),
}

/// JSON Web Key as published by the identity provider.
///
/// Only the fields needed to rebuild an RSA verification key are kept;
/// certificate chains (`x5c`, `x5t`) are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for the provider's signing keys).
    pub kty: String,

    /// Key ID, matched against the token header's `kid`. Keys published
    /// without one are never matched.
    #[serde(default)]
    pub kid: Option<String>,

    /// RSA modulus, base64url without padding.
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent, base64url without padding.
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm hint.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// Key-set document: `{"keys": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeySet {
    pub keys: Vec<Jwk>,
}

impl KeySet {
    /// Parse a key-set document.
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// The key whose `kid` equals `kid`, if any.
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}

/// Source of key-set documents.
///
/// Implemented over HTTP in production and by an in-memory source in tests.
#[async_trait]
pub trait KeySetSource: Send + Sync {
    /// Fetch the raw key-set document.
    async fn fetch(&self) -> Result<Vec<u8>, FetchError>;
}

/// Fetches the key set with an unauthenticated HTTP GET.
pub struct HttpKeySetSource {
    url: String,
    http_client: reqwest::Client,
}

impl HttpKeySetSource {
    /// Create a source for `url` whose requests are bounded by `timeout`.
    pub fn new(url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "proxy.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self { url, http_client }
    }
}

#[async_trait]
impl KeySetSource for HttpKeySetSource {
    async fn fetch(&self) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(target: "proxy.jwks", url = %self.url, "Fetching key set");

        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        Ok(body.to_vec())
    }
}

/// Cached document plus the time it was fetched.
#[derive(Default)]
struct CachedKeySet {
    /// Last successfully fetched document; empty until the first success.
    raw: Vec<u8>,

    /// When `raw` was fetched.
    fetched_at: Option<Instant>,
}

impl CachedKeySet {
    fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        if self.raw.is_empty() {
            return true;
        }
        match self.fetched_at {
            None => true,
            Some(at) => now.saturating_duration_since(at) > interval,
        }
    }
}

/// Lazily refreshed key-set cache.
///
/// Shared by all requests through the gateway state.
pub struct KeySetCache {
    source: Arc<dyn KeySetSource>,
    state: Mutex<CachedKeySet>,
    refresh_interval: Duration,
}

impl KeySetCache {
    /// Create an empty cache over `source`.
    pub fn new(source: Arc<dyn KeySetSource>) -> Self {
        Self::with_interval(source, REFRESH_INTERVAL)
    }

    /// Create an empty cache with a custom refresh interval.
    pub fn with_interval(source: Arc<dyn KeySetSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            state: Mutex::new(CachedKeySet::default()),
            refresh_interval,
        }
    }

    /// Create a cache that fetches over HTTP from `url`.
    pub fn from_url(url: String, fetch_timeout: Duration) -> Self {
        Self::new(Arc::new(HttpKeySetSource::new(url, fetch_timeout)))
    }

    /// Refresh if stale and return a copy of the current document.
    ///
    /// # Errors
    ///
    /// Returns `FetchError` if a refresh was needed and failed. The previous
    /// document and timestamp are kept in that case.
    pub async fn ensure_fresh(&self) -> Result<Vec<u8>, FetchError> {
        self.ensure_fresh_at(Instant::now()).await
    }

    /// [`ensure_fresh`](Self::ensure_fresh) with an explicit clock reading.
    pub async fn ensure_fresh_at(&self, now: Instant) -> Result<Vec<u8>, FetchError> {
        let mut cached = self.state.lock().await;
        self.refresh_locked(&mut cached, now).await?;
        Ok(cached.raw.clone())
    }

    /// Refresh if stale, then validate `token` against the cached key set.
    ///
    /// The lock is held across refresh and validation.
    ///
    /// # Errors
    ///
    /// - `TokenError::Fetch` if a needed refresh failed
    /// - Any validation error from [`validate_token`]
    #[instrument(skip_all)]
    pub async fn validate(&self, token: &SecretString) -> Result<Claims, TokenError> {
        self.validate_at(token, Instant::now()).await
    }

    /// [`validate`](Self::validate) with an explicit clock reading.
    pub async fn validate_at(
        &self,
        token: &SecretString,
        now: Instant,
    ) -> Result<Claims, TokenError> {
        let mut cached = self.state.lock().await;
        self.refresh_locked(&mut cached, now).await?;
        validate_token(token.expose_secret(), &cached.raw)
    }

    async fn refresh_locked(
        &self,
        cached: &mut CachedKeySet,
        now: Instant,
    ) -> Result<(), FetchError> {
        if !cached.is_stale(now, self.refresh_interval) {
            tracing::trace!(target: "proxy.jwks", "Key set cache is fresh");
            return Ok(());
        }

        let fetched = self.source.fetch().await.and_then(|raw| {
            let key_set = KeySet::parse(&raw).map_err(|e| FetchError::Parse(e.to_string()))?;
            Ok((raw, key_set.keys.len()))
        });

        match fetched {
            Ok((raw, key_count)) => {
                tracing::info!(target: "proxy.jwks", key_count, "Key set refreshed");
                metrics::record_jwks_fetch(true);
                cached.raw = raw;
                cached.fetched_at = Some(now);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    target: "proxy.jwks",
                    error = %e,
                    has_cached = !cached.raw.is_empty(),
                    "Key set fetch failed"
                );
                metrics::record_jwks_fetch(false);
                Err(e)
            }
        }
    }
}
