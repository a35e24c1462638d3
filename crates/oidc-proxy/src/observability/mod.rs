//! Observability for the OIDC proxy.
//!
//! Provides metrics definitions and the Prometheus recorder setup.

pub mod metrics;
