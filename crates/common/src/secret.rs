//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used for identity tokens taken from
//! `Proxy-Authorization` headers. `SecretString` implements `Debug` with
//! redaction, so a struct deriving `Debug` that carries a token can be
//! passed to `tracing` without leaking it.
//!
//! Secrets are zeroized when dropped.
//!
//! # Example
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct ProxyCredentials {
//!     username: String,
//!     token: SecretString,
//! }
//!
//! let creds = ProxyCredentials {
//!     username: "x-access-token".to_string(),
//!     token: SecretString::from("eyJhbGciOi..."),
//! };
//!
//! // Safe: the token is redacted
//! println!("{:?}", creds);
//!
//! // Reading the value is explicit
//! let token: &str = creds.token.expose_secret();
//! # assert!(token.starts_with("eyJ"));
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretString};
