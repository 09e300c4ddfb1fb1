//! Account-wide polling context.
//!
//! [`AccountContext`] is created once per account at startup and owns
//! everything shared between routes: the credentials and configuration,
//! the [`RouteCatalog`], and one [`RefreshOrchestrator`] per route, each
//! with its own upstream session and poll task. Route discovery merges new
//! routes into the catalog and rebuilds the orchestrator set when it grows.
//! Call [`AccountContext::shutdown`] to tear everything down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use busstop_client::{ReqwestTransport, SessionClient, Transport, TransportError};
use busstop_core::catalog::RouteCatalog;
use busstop_core::types::{BusStatusRecord, RouteDescriptor, RouteId};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::PollerConfig;
use crate::error::PollerError;
use crate::events::{PollerEvent, EVENT_CHANNEL_CAPACITY};
use crate::orchestrator::{Listener, RefreshOrchestrator, RefreshOutcome, RouteSnapshot};

/// Builds a fresh transport (and therefore a fresh cookie jar) per session.
pub type Connector<T> = Arc<dyn Fn() -> Result<T, TransportError> + Send + Sync>;

/// How long shutdown waits for each route task to exit.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Internal bookkeeping for one polled route.
struct ManagedRoute<T> {
    orchestrator: Arc<RefreshOrchestrator<T>>,
    task_handle: tokio::task::JoinHandle<()>,
    /// Per-route cancellation token (child of the master token).
    cancel: CancellationToken,
}

pub struct AccountContext<T> {
    config: PollerConfig,
    connector: Connector<T>,
    catalog: RwLock<RouteCatalog>,
    routes: RwLock<HashMap<RouteId, ManagedRoute<T>>>,
    /// Listeners attached to every orchestrator, including ones created by
    /// later reloads.
    listeners: Mutex<Vec<Listener>>,
    event_tx: broadcast::Sender<PollerEvent>,
    /// Master cancellation token -- cancelled during shutdown.
    cancel: CancellationToken,
}

impl AccountContext<ReqwestTransport> {
    /// Start polling over HTTP with a reqwest transport per session.
    pub async fn start_http(config: PollerConfig) -> Result<Arc<Self>, PollerError> {
        let transport_config = config.transport_config();
        let connector: Connector<ReqwestTransport> =
            Arc::new(move || ReqwestTransport::new(&transport_config));
        Self::start(config, connector).await
    }
}

impl<T: Transport + 'static> AccountContext<T> {
    /// Log in, discover routes and start one poll task per route.
    ///
    /// Fails only when the account itself cannot log in. When discovery
    /// finds nothing the configured fallback route is used; per-route
    /// setup failures skip that route.
    pub async fn start(config: PollerConfig, connector: Connector<T>) -> Result<Arc<Self>, PollerError> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let context = Arc::new(Self {
            config,
            connector,
            catalog: RwLock::new(RouteCatalog::default()),
            routes: RwLock::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            event_tx,
            cancel: CancellationToken::new(),
        });

        let mut session = context.new_session()?;
        session.login().await?;

        let mut routes = session.discover_routes().await;
        if routes.is_empty() {
            match context.config.fallback_route_id {
                Some(id) => {
                    tracing::info!(route_id = id, "No routes discovered, using configured route");
                    routes.push(RouteDescriptor::new(id, None));
                }
                None => tracing::warn!("No routes discovered and no fallback route configured"),
            }
        }

        *context.catalog.write().await = RouteCatalog::new(routes);

        let catalog = context.catalog.read().await.routes().to_vec();
        let started = context.build_routes(&catalog).await?;
        tracing::info!(count = started.len(), "Routes started");
        *context.routes.write().await = started;

        Ok(context)
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Subscribe to account-level events.
    pub fn subscribe_events(&self) -> broadcast::Receiver<PollerEvent> {
        self.event_tx.subscribe()
    }

    /// Register a listener on every current and future route.
    pub async fn subscribe_all<F>(&self, listener: F)
    where
        F: Fn(RouteId, &BusStatusRecord) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&listener));

        for managed in self.routes.read().await.values() {
            managed.orchestrator.subscribe_shared(Arc::clone(&listener));
        }
    }

    pub async fn catalog(&self) -> RouteCatalog {
        self.catalog.read().await.clone()
    }

    /// Ids of routes with a running poll task, ascending.
    pub async fn route_ids(&self) -> Vec<RouteId> {
        let mut ids: Vec<RouteId> = self.routes.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn orchestrator(&self, route_id: RouteId) -> Option<Arc<RefreshOrchestrator<T>>> {
        self.routes
            .read()
            .await
            .get(&route_id)
            .map(|m| Arc::clone(&m.orchestrator))
    }

    /// Snapshots of every running route, in catalog order.
    pub async fn snapshots(&self) -> Vec<RouteSnapshot> {
        let catalog = self.catalog.read().await;
        let routes = self.routes.read().await;
        catalog
            .routes()
            .iter()
            .filter_map(|r| routes.get(&r.id))
            .map(|m| m.orchestrator.snapshot())
            .collect()
    }

    /// Ask every route to refresh now. Routes with a fetch in flight
    /// ignore the request.
    pub async fn refresh_all(&self) {
        for managed in self.routes.read().await.values() {
            managed.orchestrator.request_refresh();
        }
    }

    /// Run one discovery pass.
    ///
    /// New route ids are merged into the catalog and trigger a full
    /// reload. A reload also runs when a catalog route has no running
    /// poller, so routes that failed to start earlier are retried. Returns
    /// the ids that were added. Discovery problems yield an empty result;
    /// reload problems are logged and the previous route set keeps running.
    pub async fn discover(&self) -> Vec<RouteId> {
        // A fresh session gives a fresh landing page to parse.
        let found = match self.new_session() {
            Ok(mut session) => session.discover_routes().await,
            Err(e) => {
                tracing::warn!(error = %e, "Route discovery skipped: transport unavailable");
                return Vec::new();
            }
        };

        if found.is_empty() {
            tracing::debug!("Route discovery returned nothing");
            return Vec::new();
        }

        let added = self.catalog.write().await.apply(&found);
        let unpolled = self.unpolled_ids().await;
        if added.is_empty() && unpolled.is_empty() {
            tracing::debug!(count = found.len(), "Route discovery found no new routes");
            return added;
        }

        if added.is_empty() {
            tracing::info!(?unpolled, "Retrying routes without a running poller");
        } else {
            tracing::info!(?added, "New routes discovered");
            let _ = self.event_tx.send(PollerEvent::RoutesDiscovered {
                added: added.clone(),
            });
        }

        let error = match self.reload().await {
            Ok(_) => {
                let missing = self.unpolled_ids().await;
                (!missing.is_empty()).then(|| format!("routes not started: {missing:?}"))
            }
            Err(e) => Some(e.to_string()),
        };
        if let Some(error) = error {
            tracing::error!(%error, "Route reload incomplete, keeping previous routes");
            let _ = self.event_tx.send(PollerEvent::ReloadFailed { error });
        }

        added
    }

    /// Tear down and recreate every route orchestrator from the catalog.
    ///
    /// The new set is built before the old one is stopped, so on failure
    /// the previous routes are left untouched. A route that fails to
    /// start keeps its previous orchestrator if it had one; a route that
    /// never had one stays unpolled until the next reload.
    pub async fn reload(&self) -> Result<Vec<RouteId>, PollerError> {
        let catalog = self.catalog.read().await.routes().to_vec();
        let mut fresh = self.build_routes(&catalog).await?;

        if fresh.is_empty() && !catalog.is_empty() {
            return Err(PollerError::Reload("no route could be started".to_string()));
        }

        let (previous, route_ids) = {
            let mut routes = self.routes.write().await;
            for route in &catalog {
                if fresh.contains_key(&route.id) {
                    continue;
                }
                if let Some(kept) = routes.remove(&route.id) {
                    tracing::warn!(route_id = route.id, "Route failed to restart, keeping previous poller");
                    fresh.insert(route.id, kept);
                }
            }

            let mut route_ids: Vec<RouteId> = fresh.keys().copied().collect();
            route_ids.sort_unstable();
            (std::mem::replace(&mut *routes, fresh), route_ids)
        };
        stop_routes(previous).await;

        tracing::info!(?route_ids, "Routes reloaded");
        let _ = self.event_tx.send(PollerEvent::RoutesReloaded {
            route_ids: route_ids.clone(),
        });
        Ok(route_ids)
    }

    /// Stop every route task and the master token.
    ///
    /// Waits up to 5 seconds per task for a clean exit.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down account context");
        self.cancel.cancel();

        let routes = std::mem::take(&mut *self.routes.write().await);
        stop_routes(routes).await;

        tracing::info!("Account context shut down complete");
    }

    /// Master cancellation token, for tasks that should stop on shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ---- private helpers ----

    /// Catalog ids without a running orchestrator, in catalog order.
    async fn unpolled_ids(&self) -> Vec<RouteId> {
        let catalog = self.catalog.read().await;
        let routes = self.routes.read().await;
        catalog
            .ids()
            .into_iter()
            .filter(|id| !routes.contains_key(id))
            .collect()
    }

    fn new_session(&self) -> Result<SessionClient<T>, TransportError> {
        let transport = (self.connector)()?;
        Ok(SessionClient::new(
            transport,
            self.config.credentials.clone(),
            self.config.endpoints(),
        ))
    }

    /// Build, log in, prime and spawn an orchestrator for each route.
    ///
    /// A route whose login fails is skipped. A transport that cannot be
    /// built aborts the whole batch, stopping anything already spawned.
    async fn build_routes(
        &self,
        routes: &[RouteDescriptor],
    ) -> Result<HashMap<RouteId, ManagedRoute<T>>, PollerError> {
        let mut built = HashMap::with_capacity(routes.len());

        for route in routes {
            let mut session = match self.new_session() {
                Ok(session) => session,
                Err(e) => {
                    stop_routes(built).await;
                    return Err(e.into());
                }
            };

            if let Err(e) = session.login().await {
                tracing::warn!(route_id = route.id, error = %e, "Login failed for route, skipping");
                continue;
            }

            let orchestrator = Arc::new(
                RefreshOrchestrator::new(
                    route.clone(),
                    session,
                    self.config.windows.clone(),
                    self.config.cadence,
                )
                .with_events(self.event_tx.clone()),
            );

            let listeners = self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for listener in listeners {
                orchestrator.subscribe_shared(listener);
            }

            match orchestrator.refresh().await {
                RefreshOutcome::Failed => {
                    tracing::debug!(route_id = route.id, "Initial refresh failed");
                }
                outcome => {
                    tracing::debug!(route_id = route.id, ?outcome, "Initial refresh done");
                }
            }

            let cancel = self.cancel.child_token();
            let task_handle = tokio::spawn(Arc::clone(&orchestrator).run(cancel.clone()));

            built.insert(
                route.id,
                ManagedRoute {
                    orchestrator,
                    task_handle,
                    cancel,
                },
            );
        }

        Ok(built)
    }
}

/// Cancel route tasks and wait for them to exit.
async fn stop_routes<T>(routes: HashMap<RouteId, ManagedRoute<T>>) {
    let handles = routes.into_iter().map(|(route_id, managed)| {
        managed.cancel.cancel();
        async move {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, managed.task_handle)
                .await
                .is_err()
            {
                tracing::warn!(route_id, "Route task did not stop in time");
            }
        }
    });
    futures::future::join_all(handles).await;
}
