//! HTTP handlers for the OIDC proxy.

pub mod health;
pub mod proxy;

pub use health::ping;
pub use proxy::dispatch;
