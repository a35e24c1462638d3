//! Claims decoded from a verified identity token.
//!
//! Identity tokens carry many provider-specific claims; only a handful are
//! consumed here, so the full mapping is kept and values are extracted by
//! name with a typed error. Claim values identify repositories and
//! workflows and are redacted in Debug output.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// `repository_owner` claim: the organization or user owning the repository.
pub const REPOSITORY_OWNER: &str = "repository_owner";

/// `repository` claim: `owner/name` of the repository running the workflow.
pub const REPOSITORY: &str = "repository";

/// `aud` claim: the audience the workflow requested the token for.
pub const AUDIENCE: &str = "aud";

/// Failure to extract or authorize a single claim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClaimError {
    /// The claim is absent from the token.
    #[error("claim '{0}' is missing")]
    Missing(&'static str),

    /// The claim is present but not a JSON string.
    #[error("claim '{0}' is not a string")]
    NotAString(&'static str),

    /// The claim value is not on the allow-list.
    #[error("claim '{0}' is not allowed")]
    NotAllowed(&'static str),
}

/// Verified claim mapping, created per request.
#[derive(Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Extract a string-valued claim.
    ///
    /// # Errors
    ///
    /// - `ClaimError::Missing` if the claim is absent
    /// - `ClaimError::NotAString` if it holds any other JSON type, including
    ///   an array-valued `aud`
    pub fn string_claim(&self, name: &'static str) -> Result<&str, ClaimError> {
        match self.0.get(name) {
            None => Err(ClaimError::Missing(name)),
            Some(Value::String(value)) => Ok(value),
            Some(_) => Err(ClaimError::NotAString(name)),
        }
    }
}

/// Lists claim names only; values are redacted.
impl fmt::Debug for Claims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.keys().map(|k| (k, "[REDACTED]")))
            .finish()
    }
}
