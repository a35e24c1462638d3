//! OIDC proxy configuration.
//!
//! Configuration is loaded from `ACTIONS_OIDC_PROXY_*` environment
//! variables. Every allow-list defaults to the wildcard, which accepts any
//! workflow from any repository: operators are expected to narrow at least
//! the owner or repository list.

use crate::auth::AllowList;
use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default listen interface.
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// GitHub Actions identity provider key-set endpoint.
pub const DEFAULT_JWKS_URL: &str = "https://token.actions.githubusercontent.com/.well-known/jwks";

/// Default key-set fetch timeout in seconds.
pub const DEFAULT_JWKS_TIMEOUT_SECONDS: u64 = 5;

/// Upper bound for the key-set fetch timeout. The fetch runs under the
/// cache lock, so every concurrent CONNECT waits at most this long.
pub const MAX_JWKS_TIMEOUT_SECONDS: u64 = 60;

/// Upper bound for the shutdown drain period.
pub const MAX_DRAIN_SECONDS: u64 = 300;

/// OIDC proxy configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen interface (default: "0.0.0.0").
    pub bind_host: String,

    /// Listen port (default: 8000).
    pub port: u16,

    /// Allowed `repository_owner` claim values.
    pub allowed_owners: AllowList,

    /// Allowed `repository` claim values.
    pub allowed_repos: AllowList,

    /// Allowed `aud` claim values.
    pub allowed_auds: AllowList,

    /// Allowed CONNECT destination hosts (port excluded).
    pub allowed_hosts: AllowList,

    /// URL of the identity provider's key-set document.
    pub jwks_url: String,

    /// Timeout for one key-set fetch, in seconds.
    pub jwks_timeout_seconds: u64,

    /// Whether rejected claim values are written to the log in clear.
    pub log_claim_values: bool,

    /// Optional bind address for the Prometheus scrape listener.
    pub metrics_address: Option<String>,

    /// Seconds to wait after a shutdown signal before exiting.
    pub drain_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid port configuration: {0}")]
    InvalidPort(String),

    #[error("Invalid allow-list configuration: {0}")]
    InvalidAllowList(String),

    #[error("Invalid JWKS configuration: {0}")]
    InvalidJwks(String),

    #[error("Invalid claim logging configuration: {0}")]
    InvalidClaimLogging(String),

    #[error("Invalid drain period configuration: {0}")]
    InvalidDrainPeriod(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_host = vars
            .get("ACTIONS_OIDC_PROXY_BIND_HOST")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_HOST.to_string());

        let port = if let Some(value_str) = vars.get("ACTIONS_OIDC_PROXY_PORT") {
            value_str.trim().parse::<u16>().map_err(|e| {
                ConfigError::InvalidPort(format!(
                    "ACTIONS_OIDC_PROXY_PORT must be a valid port number, got '{}': {}",
                    value_str, e
                ))
            })?
        } else {
            DEFAULT_PORT
        };

        let allowed_owners = allow_list(vars, "ACTIONS_OIDC_PROXY_OWNERS")?;
        let allowed_repos = allow_list(vars, "ACTIONS_OIDC_PROXY_REPOS")?;
        let allowed_auds = allow_list(vars, "ACTIONS_OIDC_PROXY_AUDS")?;
        let allowed_hosts = allow_list(vars, "ACTIONS_OIDC_PROXY_HOSTS")?;

        let jwks_url = vars
            .get("ACTIONS_OIDC_PROXY_JWKS_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());

        if !jwks_url.starts_with("https://") && !jwks_url.starts_with("http://") {
            return Err(ConfigError::InvalidJwks(format!(
                "ACTIONS_OIDC_PROXY_JWKS_URL must be an http(s) URL, got '{}'",
                jwks_url
            )));
        }

        // Parse key-set fetch timeout with validation
        let jwks_timeout_seconds =
            if let Some(value_str) = vars.get("ACTIONS_OIDC_PROXY_JWKS_TIMEOUT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidJwks(format!(
                        "ACTIONS_OIDC_PROXY_JWKS_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                        value_str, e
                    ))
                })?;

                if value == 0 {
                    return Err(ConfigError::InvalidJwks(
                        "ACTIONS_OIDC_PROXY_JWKS_TIMEOUT_SECONDS must be greater than 0"
                            .to_string(),
                    ));
                }

                if value > MAX_JWKS_TIMEOUT_SECONDS {
                    return Err(ConfigError::InvalidJwks(format!(
                        "ACTIONS_OIDC_PROXY_JWKS_TIMEOUT_SECONDS must not exceed {} seconds, got {}",
                        MAX_JWKS_TIMEOUT_SECONDS, value
                    )));
                }

                value
            } else {
                DEFAULT_JWKS_TIMEOUT_SECONDS
            };

        let log_claim_values = match vars.get("ACTIONS_OIDC_PROXY_LOG_CLAIM_VALUES") {
            None => true,
            Some(value_str) => parse_bool(value_str).ok_or_else(|| {
                ConfigError::InvalidClaimLogging(format!(
                    "ACTIONS_OIDC_PROXY_LOG_CLAIM_VALUES must be true or false, got '{}'",
                    value_str
                ))
            })?,
        };

        let metrics_address = vars
            .get("ACTIONS_OIDC_PROXY_METRICS_ADDRESS")
            .filter(|s| !s.trim().is_empty())
            .cloned();

        let drain_seconds = if let Some(value_str) = vars.get("ACTIONS_OIDC_PROXY_DRAIN_SECONDS")
        {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidDrainPeriod(format!(
                    "ACTIONS_OIDC_PROXY_DRAIN_SECONDS must be a valid integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value > MAX_DRAIN_SECONDS {
                return Err(ConfigError::InvalidDrainPeriod(format!(
                    "ACTIONS_OIDC_PROXY_DRAIN_SECONDS must not exceed {} seconds, got {}",
                    MAX_DRAIN_SECONDS, value
                )));
            }

            value
        } else {
            0
        };

        Ok(Config {
            bind_host,
            port,
            allowed_owners,
            allowed_repos,
            allowed_auds,
            allowed_hosts,
            jwks_url,
            jwks_timeout_seconds,
            log_claim_values,
            metrics_address,
            drain_seconds,
        })
    }

    /// The `host:port` string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// Names of the allow-lists that still accept any value.
    pub fn wildcard_dimensions(&self) -> Vec<&'static str> {
        [
            ("owners", &self.allowed_owners),
            ("repos", &self.allowed_repos),
            ("auds", &self.allowed_auds),
            ("hosts", &self.allowed_hosts),
        ]
        .into_iter()
        .filter(|(_, list)| list.is_wildcard())
        .map(|(name, _)| name)
        .collect()
    }
}

/// Parse a comma-separated allow-list variable, defaulting to the wildcard.
fn allow_list(vars: &HashMap<String, String>, name: &str) -> Result<AllowList, ConfigError> {
    match vars.get(name) {
        None => Ok(AllowList::wildcard()),
        Some(value) => AllowList::from_csv(value).ok_or_else(|| {
            ConfigError::InvalidAllowList(format!(
                "{} must contain at least one non-empty value",
                name
            ))
        }),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
