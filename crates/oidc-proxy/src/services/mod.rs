//! Outbound services used by the dispatcher.

pub mod tunnel;

pub use tunnel::{dial, relay, run_session, RelayStats, TunnelError, DIAL_TIMEOUT};
