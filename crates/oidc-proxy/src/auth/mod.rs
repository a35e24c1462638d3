//! Authentication and authorization for tunnel requests.
//!
//! - [`jwks`]: lazily refreshed cache of the identity provider's key set
//! - [`jwt`]: token signature and time-claim verification
//! - [`claims`]: typed access to verified claims
//! - [`authorize`]: allow-list decisions for claims and destination hosts

pub mod authorize;
pub mod claims;
pub mod jwks;
pub mod jwt;

pub use authorize::{authorize_claims, authorize_host, AllowList};
pub use claims::{ClaimError, Claims};
pub use jwks::{FetchError, HttpKeySetSource, KeySetCache, KeySetSource};
pub use jwt::TokenError;
