//! Identity token validation.
//!
//! Verifies a workflow identity token against the identity provider's key
//! set and returns its claims.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only RSA PKCS#1 v1.5 signatures (RS256/RS384/RS512) are accepted, and
//!   the algorithm is checked before any key lookup
//! - The verification key is selected by `kid` from the trusted key set and
//!   never from the token itself
//! - `exp` is required; `exp` and `nbf` are checked with the library's
//!   default leeway
//! - `aud` is not checked here; it is authorized against the allow-list

use crate::auth::claims::Claims;
use crate::auth::jwks::{FetchError, Jwk, KeySet};
use common::jwt::{decode_rsa_component, extract_header, is_rsa_algorithm, JwtValidationError};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use thiserror::Error;

/// Reasons a token is rejected.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// The token could not be parsed as a JWT.
    #[error("malformed token: {0}")]
    Malformed(#[from] JwtValidationError),

    /// The declared algorithm is not an accepted RSA algorithm.
    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// No key in the key set matches the token's `kid`, or the token has none.
    #[error("unknown key id")]
    UnknownKeyId,

    /// Key reconstruction, signature, or time-based claim check failed.
    #[error("token verification failed")]
    Invalid,

    /// The key set could not be refreshed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Map an accepted algorithm name to the verification algorithm.
fn rsa_algorithm(alg: &str) -> Option<Algorithm> {
    if !is_rsa_algorithm(alg) {
        return None;
    }
    match alg {
        "RS256" => Some(Algorithm::RS256),
        "RS384" => Some(Algorithm::RS384),
        "RS512" => Some(Algorithm::RS512),
        _ => None,
    }
}

/// Validate `token` against the key-set document in `key_set_raw`.
///
/// # Security Checks
///
/// 1. Size and structure check of the untrusted header
/// 2. Reject non-RSA algorithms before any key lookup
/// 3. Find the key with the token's `kid` in the freshly parsed key set
/// 4. Rebuild the RSA public key from `n` and `e`
/// 5. Verify signature, `exp` and `nbf`
///
/// Validation is a pure function of its inputs: the same token against the
/// same bytes gives the same result.
///
/// # Errors
///
/// - `Malformed` - header cannot be parsed
/// - `UnsupportedAlgorithm` - `alg` outside RS256/RS384/RS512
/// - `UnknownKeyId` - no matching key, or no `kid` in the token
/// - `Invalid` - key cannot be rebuilt, or verification failed
pub fn validate_token(token: &str, key_set_raw: &[u8]) -> Result<Claims, TokenError> {
    // 1. Untrusted header (includes size check via common::jwt)
    let header = extract_header(token).map_err(|e| {
        tracing::debug!(target: "proxy.jwt", error = ?e, "Token header extraction failed");
        TokenError::Malformed(e)
    })?;

    // 2. Algorithm allow-list
    let Some(algorithm) = rsa_algorithm(&header.alg) else {
        tracing::debug!(target: "proxy.jwt", alg = %header.alg, "Token rejected: unsupported algorithm");
        return Err(TokenError::UnsupportedAlgorithm(header.alg));
    };

    // 3. Key lookup
    let key_set = KeySet::parse(key_set_raw).map_err(|e| {
        tracing::error!(target: "proxy.jwt", error = %e, "Cached key set does not parse");
        TokenError::Invalid
    })?;

    let Some(kid) = header.kid.as_deref() else {
        tracing::debug!(target: "proxy.jwt", "Token rejected: no key id in header");
        return Err(TokenError::UnknownKeyId);
    };

    let Some(jwk) = key_set.find(kid) else {
        tracing::debug!(target: "proxy.jwt", kid = %kid, "Token rejected: key id not in key set");
        return Err(TokenError::UnknownKeyId);
    };

    // 4-5. Rebuild key and verify
    let decoding_key = rsa_decoding_key(jwk)?;
    let claims = verify_token(token, &decoding_key, algorithm)?;

    tracing::debug!(target: "proxy.jwt", kid = %kid, "Token validated successfully");
    Ok(claims)
}

/// Rebuild an RSA verification key from a JWK.
fn rsa_decoding_key(jwk: &Jwk) -> Result<DecodingKey, TokenError> {
    if jwk.kty != "RSA" {
        tracing::warn!(target: "proxy.jwt", kid = ?jwk.kid, kty = %jwk.kty, "Unexpected JWK key type");
        return Err(TokenError::Invalid);
    }

    let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
        tracing::error!(target: "proxy.jwt", kid = ?jwk.kid, "JWK missing n or e");
        return Err(TokenError::Invalid);
    };

    let modulus = decode_rsa_component(n).map_err(|err| {
        tracing::error!(target: "proxy.jwt", kid = ?jwk.kid, error = %err, "Invalid JWK modulus encoding");
        TokenError::Invalid
    })?;
    let exponent = decode_rsa_component(e).map_err(|err| {
        tracing::error!(target: "proxy.jwt", kid = ?jwk.kid, error = %err, "Invalid JWK exponent encoding");
        TokenError::Invalid
    })?;

    Ok(DecodingKey::from_rsa_raw_components(&modulus, &exponent))
}

/// Verify signature and time-based claims.
fn verify_token(
    token: &str,
    decoding_key: &DecodingKey,
    algorithm: Algorithm,
) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    // Audience is authorized against the allow-list instead
    validation.validate_aud = false;

    let token_data = decode::<Claims>(token, decoding_key, &validation).map_err(|e| {
        tracing::debug!(target: "proxy.jwt", error = %e, "Token verification failed");
        TokenError::Invalid
    })?;

    Ok(token_data.claims)
}
