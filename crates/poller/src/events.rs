//! Account-level events emitted by the poller.
//!
//! These are coarse notifications about the route set and per-route
//! outcomes. Fresh status data travels through the typed listeners on
//! each [`RefreshOrchestrator`](crate::orchestrator::RefreshOrchestrator)
//! instead, so observers never have to re-read shared state.

use busstop_core::types::RouteId;
use serde::Serialize;

/// Broadcast channel capacity for poller events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollerEvent {
    /// Discovery found routes that were not in the catalog.
    RoutesDiscovered { added: Vec<RouteId> },

    /// The per-route orchestrators were rebuilt.
    RoutesReloaded { route_ids: Vec<RouteId> },

    /// A reload was attempted and the previous route set kept running.
    ReloadFailed { error: String },

    /// A route produced a fresh status record.
    RouteUpdated { route_id: RouteId },

    /// A route answered with no data (not running right now).
    RouteUnavailable { route_id: RouteId },

    /// A route's status request failed.
    RouteFailed { route_id: RouteId, error: String },
}
