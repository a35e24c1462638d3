//! Builder patterns for test data construction
//!
//! Provides a fluent API for workflow identity token claims.

use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};

/// Builder for workflow identity token claims
///
/// Defaults describe a workflow in `orgX/app` requesting audience
/// `my-service`, valid for one hour.
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .for_repository("orgX/infra")
///     .with_audience("registry")
///     .expires_in(300)
///     .build();
/// let token = TestSigningKey::primary().sign(&claims);
/// ```
pub struct TestTokenBuilder {
    claims: Map<String, Value>,
}

impl TestTokenBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        let now = Utc::now();
        let mut claims = Map::new();
        claims.insert("iss".to_string(), json!("https://token.actions.githubusercontent.com"));
        claims.insert("sub".to_string(), json!("repo:orgX/app:ref:refs/heads/main"));
        claims.insert("repository_owner".to_string(), json!("orgX"));
        claims.insert("repository".to_string(), json!("orgX/app"));
        claims.insert("aud".to_string(), json!("my-service"));
        claims.insert("iat".to_string(), json!(now.timestamp()));
        claims.insert(
            "exp".to_string(),
            json!((now + Duration::seconds(3600)).timestamp()),
        );
        Self { claims }
    }

    /// Set `repository_owner`
    pub fn for_owner(self, owner: &str) -> Self {
        self.with_claim("repository_owner", json!(owner))
    }

    /// Set `repository`
    pub fn for_repository(self, repository: &str) -> Self {
        self.with_claim("repository", json!(repository))
    }

    /// Set `aud`
    pub fn with_audience(self, aud: &str) -> Self {
        self.with_claim("aud", json!(aud))
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(self, seconds: i64) -> Self {
        let exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("exp", json!(exp))
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(self, seconds: i64) -> Self {
        let nbf = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self.with_claim("nbf", json!(nbf))
    }

    /// Set an arbitrary claim
    pub fn with_claim(mut self, name: &str, value: Value) -> Self {
        self.claims.insert(name.to_string(), value);
        self
    }

    /// Remove a claim
    pub fn without_claim(mut self, name: &str) -> Self {
        self.claims.remove(name);
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        Value::Object(self.claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let claims = TestTokenBuilder::default().build();
        assert_eq!(claims["repository_owner"], "orgX");
        assert_eq!(claims["repository"], "orgX/app");
        assert_eq!(claims["aud"], "my-service");
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_builder_overrides() {
        let claims = TestTokenBuilder::new()
            .for_owner("orgY")
            .for_repository("orgY/tool")
            .with_audience("other")
            .expires_in(-60)
            .without_claim("sub")
            .build();

        assert_eq!(claims["repository_owner"], "orgY");
        assert_eq!(claims["repository"], "orgY/tool");
        assert_eq!(claims["aud"], "other");
        assert!(claims["exp"].as_i64().unwrap() < Utc::now().timestamp());
        assert!(claims.get("sub").is_none());
    }
}
