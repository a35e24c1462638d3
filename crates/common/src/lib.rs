//! Common utilities and types shared across the OIDC proxy crates.

#![warn(clippy::pedantic)]

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, header inspection, key decoding)
pub mod jwt;
