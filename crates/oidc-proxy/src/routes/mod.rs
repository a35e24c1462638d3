//! Request routing for the OIDC proxy.
//!
//! CONNECT requests carry an authority-form target with no path, so instead
//! of a path router every request goes to a single dispatcher wrapped in the
//! tower layers.

use crate::auth::{AllowList, KeySetCache};
use crate::config::Config;
use crate::handlers;
use axum::response::Response;
use hyper::body::Incoming;
use hyper::Request;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower::util::BoxCloneService;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::trace::TraceLayer;

/// Gateway state shared by every request.
///
/// Constructed once at startup and passed to the dispatcher behind an `Arc`.
/// Only the key-set cache is mutable, behind its own lock.
pub struct GatewayState {
    /// Identity provider key-set cache.
    pub key_set: KeySetCache,

    /// Allowed `repository_owner` values.
    pub allowed_owners: AllowList,

    /// Allowed `repository` values.
    pub allowed_repos: AllowList,

    /// Allowed `aud` values.
    pub allowed_auds: AllowList,

    /// Allowed destination hosts.
    pub allowed_hosts: AllowList,

    /// Timeout for dialing the destination.
    pub dial_timeout: Duration,

    /// Whether rejected claim values are logged in clear.
    pub log_claim_values: bool,
}

impl GatewayState {
    /// Build state from configuration with an HTTP key-set source.
    pub fn from_config(config: &Config) -> Self {
        let key_set = KeySetCache::from_url(
            config.jwks_url.clone(),
            Duration::from_secs(config.jwks_timeout_seconds),
        );
        Self::with_key_set(config, key_set)
    }

    /// Build state from configuration with a caller-supplied cache.
    pub fn with_key_set(config: &Config, key_set: KeySetCache) -> Self {
        Self {
            key_set,
            allowed_owners: config.allowed_owners.clone(),
            allowed_repos: config.allowed_repos.clone(),
            allowed_auds: config.allowed_auds.clone(),
            allowed_hosts: config.allowed_hosts.clone(),
            dial_timeout: crate::services::DIAL_TIMEOUT,
            log_claim_values: config.log_claim_values,
        }
    }

    /// Override the destination dial timeout.
    pub fn with_dial_timeout(mut self, dial_timeout: Duration) -> Self {
        self.dial_timeout = dial_timeout;
        self
    }
}

/// Service handling one HTTP connection's requests.
pub type ProxyService = BoxCloneService<Request<Incoming>, Response, Infallible>;

/// Build the request service.
///
/// - TraceLayer for request logging
/// - [`handlers::dispatch`] for every method and path
pub fn build_service(state: Arc<GatewayState>) -> ProxyService {
    ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .service_fn(move |req: Request<Incoming>| {
            let state = Arc::clone(&state);
            async move { handlers::dispatch(state, req).await }
        })
        .map_response(|response| response.map(axum::body::Body::new))
        .boxed_clone()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_state_from_config() {
        let vars = HashMap::from([
            ("ACTIONS_OIDC_PROXY_OWNERS".to_string(), "orgX".to_string()),
            (
                "ACTIONS_OIDC_PROXY_LOG_CLAIM_VALUES".to_string(),
                "false".to_string(),
            ),
        ]);
        let config = Config::from_vars(&vars).unwrap();

        let state = GatewayState::from_config(&config);

        assert!(state.allowed_owners.permits("orgX"));
        assert!(!state.allowed_owners.permits("orgY"));
        assert!(state.allowed_hosts.is_wildcard());
        assert!(!state.log_claim_values);
        assert_eq!(state.dial_timeout, crate::services::DIAL_TIMEOUT);
    }

    #[test]
    fn test_dial_timeout_override() {
        let config = Config::from_vars(&HashMap::new()).unwrap();
        let state =
            GatewayState::from_config(&config).with_dial_timeout(Duration::from_millis(250));
        assert_eq!(state.dial_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_proxy_service_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<ProxyService>();
    }
}
