//! JWT utilities shared across the proxy crates.
//!
//! This module provides the untrusted, pre-verification view of a token:
//! - Size limits for DoS prevention
//! - Header extraction (`alg`, `kid`) without signature verification
//! - Decoding of base64url RSA key components from a JWK
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned by [`extract_header`] is trusted; it only selects the
//!   algorithm check and the key lookup that precede real verification
//! - Error messages are intentionally generic to prevent information leakage
//!
//! # Usage
//!
//! ```rust,ignore
//! use common::jwt::{extract_header, decode_rsa_component};
//!
//! let header = extract_header(token)?;
//! if !is_rsa_algorithm(&header.alg) {
//!     return Err(...);
//! }
//! let modulus = decode_rsa_component(&jwk.n)?;
//! ```

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// CI identity tokens are around 1-2KB. Anything larger is rejected BEFORE
/// base64 decoding or signature verification.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// RSA PKCS#1 v1.5 signature algorithms accepted for identity tokens.
pub const RSA_ALGORITHMS: [&str; 3] = ["RS256", "RS384", "RS512"];

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting an unverified JWT.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Token size exceeds maximum allowed.
    #[error("The token is invalid")]
    TokenTooLarge,

    /// Token format is invalid (not a valid JWT structure).
    #[error("The token is invalid")]
    MalformedToken,

    /// Token header has no string `alg` field.
    #[error("The token is invalid")]
    MissingAlgorithm,
}

// =============================================================================
// Header Types
// =============================================================================

/// The fields of a JWT header needed before verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JwtHeader {
    /// Declared signing algorithm, verbatim.
    pub alg: String,

    /// Declared key ID, if any. Empty strings are treated as absent.
    pub kid: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Extract `alg` and `kid` from a JWT header without verifying the signature.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing (denial-of-service prevention)
/// - This function does NOT validate the token signature
/// - The returned values may only be used to reject the token early or to
///   select a key from a trusted key set
///
/// # Errors
///
/// - `TokenTooLarge` - Token exceeds `MAX_JWT_SIZE_BYTES`
/// - `MalformedToken` - Wrong number of segments, bad base64 or invalid JSON
/// - `MissingAlgorithm` - Header has no string `alg`
pub fn extract_header(token: &str) -> Result<JwtHeader, JwtValidationError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(JwtValidationError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (Some(header_part), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
        return Err(JwtValidationError::MalformedToken);
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        JwtValidationError::MalformedToken
    })?;

    let header: serde_json::Value = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        JwtValidationError::MalformedToken
    })?;

    let alg = header
        .get("alg")
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or(JwtValidationError::MissingAlgorithm)?;

    let kid = header
        .get("kid")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    Ok(JwtHeader { alg, kid })
}

/// Whether `alg` names one of the accepted RSA signature algorithms.
///
/// Comparison is exact; `rs256` or `PS256` are not accepted.
#[must_use]
pub fn is_rsa_algorithm(alg: &str) -> bool {
    RSA_ALGORITHMS.contains(&alg)
}

/// Decode an RSA key component (`n` or `e`) from its JWK base64url form.
///
/// JWK integers are unpadded base64url big-endian byte strings. An empty
/// component is rejected.
///
/// # Errors
///
/// Returns `base64::DecodeError` if the value is not valid base64url, or
/// `DecodeError::InvalidLength` if it decodes to zero bytes.
pub fn decode_rsa_component(value_b64url: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let bytes = URL_SAFE_NO_PAD.decode(value_b64url)?;
    if bytes.is_empty() {
        return Err(base64::DecodeError::InvalidLength(0));
    }
    Ok(bytes)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token_with_header(header: &str) -> String {
        let header_b64 = URL_SAFE_NO_PAD.encode(header);
        format!("{header_b64}.payload.signature")
    }

    #[test]
    fn test_max_jwt_size_is_8kb() {
        assert_eq!(MAX_JWT_SIZE_BYTES, 8192);
    }

    // -------------------------------------------------------------------------
    // extract_header Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_extract_header_valid_token() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT","kid":"key-01"}"#);

        let header = extract_header(&token).unwrap();
        assert_eq!(header.alg, "RS256");
        assert_eq!(header.kid.as_deref(), Some("key-01"));
    }

    #[test]
    fn test_extract_header_without_kid() {
        let token = token_with_header(r#"{"alg":"RS256","typ":"JWT"}"#);

        let header = extract_header(&token).unwrap();
        assert!(header.kid.is_none());
    }

    #[test]
    fn test_extract_header_empty_kid_is_absent() {
        let token = token_with_header(r#"{"alg":"RS256","kid":""}"#);

        let header = extract_header(&token).unwrap();
        assert!(header.kid.is_none(), "Empty kid should be treated as absent");
    }

    #[test]
    fn test_extract_header_numeric_kid_is_absent() {
        let token = token_with_header(r#"{"alg":"RS256","kid":12345}"#);

        let header = extract_header(&token).unwrap();
        assert!(header.kid.is_none());
    }

    #[test]
    fn test_extract_header_missing_alg() {
        let token = token_with_header(r#"{"typ":"JWT","kid":"key-01"}"#);

        let result = extract_header(&token);
        assert!(matches!(result, Err(JwtValidationError::MissingAlgorithm)));
    }

    #[test]
    fn test_extract_header_keeps_unknown_alg_verbatim() {
        // "none" must reach the caller so it can be rejected as unsupported
        let token = token_with_header(r#"{"alg":"none"}"#);

        let header = extract_header(&token).unwrap();
        assert_eq!(header.alg, "none");
    }

    #[test]
    fn test_extract_header_malformed_token() {
        assert!(matches!(
            extract_header("not-a-jwt"),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            extract_header(""),
            Err(JwtValidationError::MalformedToken)
        ));
        assert!(matches!(
            extract_header("a.b.c.d"),
            Err(JwtValidationError::MalformedToken)
        ));
    }

    #[test]
    fn test_extract_header_invalid_base64() {
        let result = extract_header("!!!invalid!!!.payload.signature");
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_extract_header_invalid_json() {
        let token = token_with_header("not-json");

        let result = extract_header(&token);
        assert!(matches!(result, Err(JwtValidationError::MalformedToken)));
    }

    #[test]
    fn test_extract_header_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        let result = extract_header(&oversized);
        assert!(matches!(result, Err(JwtValidationError::TokenTooLarge)));
    }

    #[test]
    fn test_extract_header_at_size_limit() {
        let header_b64 = URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","kid":"key"}"#);
        let remaining = MAX_JWT_SIZE_BYTES - header_b64.len() - 2; // -2 for two dots
        let payload_len = remaining / 2;
        let sig_len = remaining - payload_len;
        let token = format!(
            "{}.{}.{}",
            header_b64,
            "a".repeat(payload_len),
            "b".repeat(sig_len)
        );
        assert_eq!(token.len(), MAX_JWT_SIZE_BYTES);

        let header = extract_header(&token).expect("Token at size limit should be accepted");
        assert_eq!(header.kid.as_deref(), Some("key"));
    }

    // -------------------------------------------------------------------------
    // Algorithm Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_is_rsa_algorithm() {
        assert!(is_rsa_algorithm("RS256"));
        assert!(is_rsa_algorithm("RS384"));
        assert!(is_rsa_algorithm("RS512"));

        assert!(!is_rsa_algorithm("HS256"));
        assert!(!is_rsa_algorithm("ES256"));
        assert!(!is_rsa_algorithm("PS256"));
        assert!(!is_rsa_algorithm("EdDSA"));
        assert!(!is_rsa_algorithm("none"));
        assert!(!is_rsa_algorithm("rs256"));
    }

    // -------------------------------------------------------------------------
    // Key Decoding Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_decode_rsa_component_exponent() {
        // "AQAB" is the standard encoding of 65537
        let e = decode_rsa_component("AQAB").unwrap();
        assert_eq!(e, vec![0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_decode_rsa_component_rejects_padding() {
        assert!(decode_rsa_component("AQAB==").is_err());
    }

    #[test]
    fn test_decode_rsa_component_rejects_invalid() {
        assert!(decode_rsa_component("not-valid-base64url!!!").is_err());
    }

    #[test]
    fn test_decode_rsa_component_rejects_empty() {
        assert!(decode_rsa_component("").is_err());
    }
}
