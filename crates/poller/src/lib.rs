//! `busstop-poller` library crate.
//!
//! Per-route refresh orchestration, account-wide route discovery and the
//! environment-driven configuration used by the daemon binary in
//! `main.rs`. Re-exported for integration testing.

pub mod config;
pub mod context;
pub mod discovery;
pub mod error;
pub mod events;
pub mod orchestrator;

pub use config::PollerConfig;
pub use context::{AccountContext, Connector};
pub use error::PollerError;
pub use events::PollerEvent;
pub use orchestrator::{ListenerId, RefreshOrchestrator, RefreshOutcome, RouteSnapshot, RouteState};
