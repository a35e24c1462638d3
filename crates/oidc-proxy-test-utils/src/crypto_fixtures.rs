//! Fixed RSA signing keys for testing.
//!
//! Two 2048-bit keys are checked in under `fixtures/`: a primary key and a
//! rotated key. Each is stored as a PKCS#8 PEM private key plus its
//! base64url modulus, so tests can both sign tokens and publish the matching
//! JWK without generating keys at runtime. Both use the exponent 65537.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

const PRIMARY_PEM: &str = include_str!("../fixtures/signing_key_primary.pem");
const PRIMARY_N: &str = include_str!("../fixtures/signing_key_primary.n");
const ROTATED_PEM: &str = include_str!("../fixtures/signing_key_rotated.pem");
const ROTATED_N: &str = include_str!("../fixtures/signing_key_rotated.n");

/// base64url encoding of 65537.
pub const RSA_EXPONENT: &str = "AQAB";

/// A test signing key and the key ID it is published under.
#[derive(Debug, Clone)]
pub struct TestSigningKey {
    kid: String,
    pem: &'static str,
    modulus: &'static str,
}

impl TestSigningKey {
    /// The primary key, published as `kid = "primary"`.
    pub fn primary() -> Self {
        Self {
            kid: "primary".to_string(),
            pem: PRIMARY_PEM,
            modulus: PRIMARY_N.trim(),
        }
    }

    /// A second key, published as `kid = "rotated"`.
    pub fn rotated() -> Self {
        Self {
            kid: "rotated".to_string(),
            pem: ROTATED_PEM,
            modulus: ROTATED_N.trim(),
        }
    }

    /// Same key material under a different key ID.
    pub fn with_kid(mut self, kid: &str) -> Self {
        self.kid = kid.to_string();
        self
    }

    /// Key ID this key is published under.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// JWK for the public half, as the identity provider publishes it.
    pub fn jwk(&self) -> Value {
        json!({
            "kty": "RSA",
            "kid": self.kid,
            "n": self.modulus,
            "e": RSA_EXPONENT,
            "alg": "RS256",
            "use": "sig",
        })
    }

    /// Sign `claims` with RS256 under this key's ID.
    pub fn sign(&self, claims: &Value) -> String {
        self.sign_with(Algorithm::RS256, Some(&self.kid), claims)
    }

    /// Sign `claims` with an explicit RSA algorithm and header `kid`.
    ///
    /// # Panics
    ///
    /// Panics if the fixture PEM cannot be loaded or signing fails.
    pub fn sign_with(&self, alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
        let key = EncodingKey::from_rsa_pem(self.pem.as_bytes())
            .expect("fixture PEM should be a valid RSA private key");
        let mut header = Header::new(alg);
        header.kid = kid.map(ToString::to_string);
        encode(&header, claims, &key).expect("signing a test token should succeed")
    }
}

/// Key-set document publishing `keys`.
pub fn jwks_document(keys: &[&TestSigningKey]) -> Value {
    json!({ "keys": keys.iter().map(|k| k.jwk()).collect::<Vec<_>>() })
}
