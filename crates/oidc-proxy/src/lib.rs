//! Actions OIDC Proxy Library
//!
//! An authorizing forward proxy: CONNECT tunnels are only established for
//! callers presenting a valid CI workload identity token whose claims, and
//! whose destination host, are on the configured allow-lists.
//!
//! # Modules
//!
//! - `config` - Environment configuration
//! - `auth` - Key-set cache, token validation, claim and host authorization
//! - `errors` - Rejection types and their HTTP statuses
//! - `handlers` - Liveness probe and the CONNECT dispatcher
//! - `routes` - Gateway state and the request service
//! - `server` - HTTP/1.1 accept loop with connection takeover
//! - `services` - Destination dialing and byte relay
//! - `observability` - Prometheus metrics

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod observability;
pub mod routes;
pub mod server;
pub mod services;
