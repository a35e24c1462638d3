//! Allow-list authorization for claims and destination hosts.
//!
//! Each dimension (owners, repositories, audiences, hosts) has its own
//! [`AllowList`]. A list either enumerates permitted values, compared
//! exactly and case-sensitively, or contains the wildcard `*`, which
//! permits anything.

use crate::auth::claims::{ClaimError, Claims, AUDIENCE, REPOSITORY, REPOSITORY_OWNER};
use std::collections::HashSet;

/// Entry that permits every value.
pub const WILDCARD: &str = "*";

/// Claims checked for every tunnel request, in order.
pub const AUTHORIZED_CLAIMS: [&str; 3] = [REPOSITORY_OWNER, REPOSITORY, AUDIENCE];

/// Set of permitted values for one dimension. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    values: HashSet<String>,
    wildcard: bool,
}

impl AllowList {
    /// A list that permits every value.
    pub fn wildcard() -> Self {
        Self {
            values: HashSet::new(),
            wildcard: true,
        }
    }

    /// Build a list from explicit entries.
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: HashSet<String> = values.into_iter().map(Into::into).collect();
        let wildcard = values.contains(WILDCARD);
        Self { values, wildcard }
    }

    /// Parse a comma-separated list. Entries are trimmed and empty entries
    /// dropped; returns `None` if nothing remains.
    pub fn from_csv(csv: &str) -> Option<Self> {
        let entries: Vec<&str> = csv
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if entries.is_empty() {
            return None;
        }
        Some(Self::from_values(entries))
    }

    /// Whether the list contains the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// Whether `value` is permitted.
    pub fn permits(&self, value: &str) -> bool {
        self.wildcard || self.values.contains(value)
    }
}

/// Check one string claim against its allow-list.
///
/// Rejections are logged with the claim name and, when `log_values` is set,
/// the offending value; otherwise the value is written as `[REDACTED]`.
///
/// # Errors
///
/// - `ClaimError::Missing` / `ClaimError::NotAString` if the claim cannot be
///   extracted as a string
/// - `ClaimError::NotAllowed` if the value is not permitted
pub fn authorize_claim(
    claim: &'static str,
    claims: &Claims,
    allow_list: &AllowList,
    log_values: bool,
) -> Result<(), ClaimError> {
    let value = claims.string_claim(claim).map_err(|e| {
        tracing::warn!(target: "proxy.authz", claim, error = %e, "Claim extraction failed");
        e
    })?;

    if allow_list.permits(value) {
        return Ok(());
    }

    let logged = if log_values { value } else { "[REDACTED]" };
    tracing::warn!(target: "proxy.authz", claim, value = %logged, "Claim value not allowed");
    Err(ClaimError::NotAllowed(claim))
}

/// Check `repository_owner`, `repository` and `aud`, stopping at the first
/// failure.
///
/// # Errors
///
/// The first [`ClaimError`] encountered.
pub fn authorize_claims(
    claims: &Claims,
    owners: &AllowList,
    repos: &AllowList,
    auds: &AllowList,
    log_values: bool,
) -> Result<(), ClaimError> {
    for (claim, allow_list) in AUTHORIZED_CLAIMS.into_iter().zip([owners, repos, auds]) {
        authorize_claim(claim, claims, allow_list, log_values)?;
    }
    Ok(())
}

/// Check a CONNECT destination host (port already stripped).
pub fn authorize_host(host: &str, allow_list: &AllowList) -> bool {
    if allow_list.permits(host) {
        return true;
    }
    tracing::warn!(target: "proxy.authz", host = %host, "Destination host not allowed");
    false
}
