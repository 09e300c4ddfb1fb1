//! Per-route refresh control loop.
//!
//! [`RefreshOrchestrator`] owns one route's [`SessionClient`] and its
//! latest status. Each refresh asks the scheduler for the current cadence,
//! fetches the route (at most one fetch in flight), records the outcome
//! and hands fresh records straight to registered listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use busstop_client::{SessionClient, Transport};
use busstop_core::schedule::{cadence_at, CadenceConfig, PollCadence, ScheduleWindows};
use busstop_core::types::{BusStatusRecord, RouteDescriptor, RouteId};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::events::PollerEvent;

/// Callback invoked with every fresh record for a route.
pub type Listener = Arc<dyn Fn(RouteId, &BusStatusRecord) + Send + Sync>;

/// Handle returned by [`RefreshOrchestrator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Refresh state of a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteState {
    /// No refresh has completed yet.
    Idle,
    /// A status request is in flight.
    Fetching,
    /// The last refresh produced a record.
    HasData,
    /// The last refresh found the route not running.
    Unavailable,
    /// The last refresh failed; see [`RefreshOrchestrator::last_error`].
    Failed,
}

/// What a call to [`RefreshOrchestrator::refresh`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A fresh record was stored and listeners were notified.
    Updated,
    /// Upstream had no data for the route.
    Unavailable,
    /// The fetch failed; the error is stored on the orchestrator.
    Failed,
    /// Another refresh was already in flight; nothing was sent upstream.
    Skipped,
}

/// Read-only view of a route for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub struct RouteSnapshot {
    pub route_id: RouteId,
    pub name: String,
    pub state: RouteState,
    /// True only when the last refresh produced a record.
    pub available: bool,
    pub record: Option<BusStatusRecord>,
    pub last_error: Option<String>,
    pub cadence: Option<PollCadence>,
    pub last_refreshed: Option<DateTime<Utc>>,
}

/// Mutable per-route status, guarded by a short-lived lock.
struct RouteStatus {
    state: RouteState,
    record: Option<BusStatusRecord>,
    last_error: Option<String>,
    cadence: Option<PollCadence>,
    last_refreshed: Option<DateTime<Utc>>,
}

pub struct RefreshOrchestrator<T> {
    route: RouteDescriptor,
    session: tokio::sync::Mutex<SessionClient<T>>,
    windows: ScheduleWindows,
    cadence_config: CadenceConfig,
    status: Mutex<RouteStatus>,
    listeners: RwLock<HashMap<ListenerId, Listener>>,
    next_listener_id: AtomicU64,
    event_tx: Option<broadcast::Sender<PollerEvent>>,
}

impl<T: Transport> RefreshOrchestrator<T> {
    pub fn new(
        route: RouteDescriptor,
        session: SessionClient<T>,
        windows: ScheduleWindows,
        cadence_config: CadenceConfig,
    ) -> Self {
        Self {
            route,
            session: tokio::sync::Mutex::new(session),
            windows,
            cadence_config,
            status: Mutex::new(RouteStatus {
                state: RouteState::Idle,
                record: None,
                last_error: None,
                cadence: None,
                last_refreshed: None,
            }),
            listeners: RwLock::new(HashMap::new()),
            next_listener_id: AtomicU64::new(1),
            event_tx: None,
        }
    }

    /// Also publish coarse per-route outcomes on an account event channel.
    pub fn with_events(mut self, event_tx: broadcast::Sender<PollerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn route_id(&self) -> RouteId {
        self.route.id
    }

    pub fn route(&self) -> &RouteDescriptor {
        &self.route
    }

    // ---- listeners ----

    /// Register a listener called once per successful refresh.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(RouteId, &BusStatusRecord) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(listener))
    }

    /// Register an already-shared listener.
    pub fn subscribe_shared(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, listener);
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // ---- accessors ----

    pub fn state(&self) -> RouteState {
        self.lock_status().state
    }

    /// Latest record. Cleared when the route becomes unavailable; kept
    /// (but stale) after a failed refresh.
    pub fn record(&self) -> Option<BusStatusRecord> {
        self.lock_status().record.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock_status().last_error.clone()
    }

    /// Delay until the next scheduled refresh, from the cadence computed
    /// by the last refresh (or from the current time before the first).
    pub fn next_interval(&self) -> Duration {
        let cadence = self
            .lock_status()
            .cadence
            .unwrap_or_else(|| cadence_at(Local::now().naive_local(), &self.windows));
        cadence.interval(&self.cadence_config)
    }

    pub fn snapshot(&self) -> RouteSnapshot {
        let status = self.lock_status();
        RouteSnapshot {
            route_id: self.route.id,
            name: self.route.name.clone(),
            state: status.state,
            available: status.state == RouteState::HasData,
            record: status.record.clone(),
            last_error: status.last_error.clone(),
            cadence: status.cadence,
            last_refreshed: status.last_refreshed,
        }
    }

    // ---- refresh ----

    /// Refresh using the current local wall-clock time.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.refresh_at(Local::now().naive_local()).await
    }

    /// Refresh as if the local wall-clock time were `now`.
    ///
    /// Never returns an error: failures are recorded on the orchestrator
    /// and the scheduling loop carries on. If the returned future is
    /// dropped before the fetch finishes, the route goes back to the state
    /// it had before.
    pub async fn refresh_at(&self, now: NaiveDateTime) -> RefreshOutcome {
        let route_id = self.route.id;
        let cadence = cadence_at(now, &self.windows);

        let in_flight = {
            let mut status = self.lock_status();
            status.cadence = Some(cadence);
            if status.state == RouteState::Fetching {
                tracing::debug!(route_id, "Refresh already in flight, skipping");
                return RefreshOutcome::Skipped;
            }
            let previous = std::mem::replace(&mut status.state, RouteState::Fetching);
            InFlight {
                status: &self.status,
                route_id,
                previous: Some(previous),
            }
        };

        let result = self.session.lock().await.fetch_current(route_id).await;
        in_flight.complete();

        match result {
            Ok(Some(record)) => {
                {
                    let mut status = self.lock_status();
                    status.state = RouteState::HasData;
                    status.record = Some(record.clone());
                    status.last_error = None;
                    status.last_refreshed = Some(Utc::now());
                }
                tracing::debug!(route_id, bus = ?record.bus_number, ?cadence, "Route updated");
                self.notify(&record);
                self.emit(PollerEvent::RouteUpdated { route_id });
                RefreshOutcome::Updated
            }
            Ok(None) => {
                {
                    let mut status = self.lock_status();
                    status.state = RouteState::Unavailable;
                    status.record = None;
                    status.last_error = None;
                    status.last_refreshed = Some(Utc::now());
                }
                tracing::debug!(route_id, ?cadence, "Route not active");
                self.emit(PollerEvent::RouteUnavailable { route_id });
                RefreshOutcome::Unavailable
            }
            Err(e) => {
                let error = e.to_string();
                {
                    let mut status = self.lock_status();
                    status.state = RouteState::Failed;
                    status.last_error = Some(error.clone());
                    status.last_refreshed = Some(Utc::now());
                }
                tracing::warn!(route_id, error = %e, "Route refresh failed");
                self.emit(PollerEvent::RouteFailed { route_id, error });
                RefreshOutcome::Failed
            }
        }
    }

    // ---- private helpers ----

    fn lock_status(&self) -> std::sync::MutexGuard<'_, RouteStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Invoke every listener once. The registry lock is released first so
    /// listeners may subscribe or unsubscribe from inside the callback.
    fn notify(&self, record: &BusStatusRecord) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for listener in listeners {
            listener(self.route.id, record);
        }
    }

    fn emit(&self, event: PollerEvent) {
        if let Some(tx) = &self.event_tx {
            // Zero receivers is fine.
            let _ = tx.send(event);
        }
    }
}

/// Marks a fetch in flight. Dropping it before [`InFlight::complete`]
/// restores the state the route had before the fetch started.
struct InFlight<'a> {
    status: &'a Mutex<RouteStatus>,
    route_id: RouteId,
    previous: Option<RouteState>,
}

impl InFlight<'_> {
    fn complete(mut self) {
        self.previous = None;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let Some(previous) = self.previous else {
            return;
        };
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if status.state == RouteState::Fetching {
            status.state = previous;
        }
        tracing::debug!(route_id = self.route_id, ?previous, "Refresh abandoned before completion");
    }
}

impl<T: Transport + 'static> RefreshOrchestrator<T> {
    /// Fire-and-forget refresh on the tokio runtime.
    ///
    /// Safe to call from a timer: a tick that lands while a fetch is in
    /// flight is a no-op.
    pub fn request_refresh(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.refresh().await;
        });
    }

    /// Poll on the adaptive cadence until `cancel` fires.
    ///
    /// Sleeps first: the caller is expected to have done the initial
    /// refresh. An in-flight fetch is never interrupted.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let route_id = self.route.id;
        tracing::info!(route_id, name = %self.route.name, "Route poll loop started");

        loop {
            let interval = self.next_interval();
            tracing::debug!(route_id, interval_secs = interval.as_secs(), "Next refresh scheduled");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }

            self.refresh().await;
        }

        tracing::info!(route_id, "Route poll loop stopped");
    }
}
