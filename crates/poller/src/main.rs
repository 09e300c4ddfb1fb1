//! `busstop-poller` -- school-bus route polling daemon.
//!
//! Logs in to MyBusStop, discovers the routes on the account, polls each
//! one on an adaptive cadence (frequent around pickup/dropoff windows,
//! hourly otherwise) and logs every fresh bus position. Route discovery
//! re-runs daily at the configured time.
//!
//! # Environment variables
//!
//! | Variable                         | Required | Default | Description                         |
//! |----------------------------------|----------|---------|-------------------------------------|
//! | `BUSSTOP_USERNAME`               | yes      | --      | Account user name                   |
//! | `BUSSTOP_PASSWORD`               | yes      | --      | Account password                    |
//! | `BUSSTOP_ROUTE_ID`               | no       | --      | Route used when discovery is empty  |
//! | `BUSSTOP_MORNING_PICKUP_TIME`    | no       | --      | `HH:MM` centre of the morning window |
//! | `BUSSTOP_AFTERNOON_DROPOFF_TIME` | no       | --      | `HH:MM`, Monday-Thursday            |
//! | `BUSSTOP_FRIDAY_DROPOFF_TIME`    | no       | --      | `HH:MM`, Friday only                |
//! | `BUSSTOP_DISCOVERY_TIME`         | no       | `02:00` | Daily route discovery time          |
//!
//! See [`PollerConfig::from_env`] for the full list.

use busstop_poller::{discovery, AccountContext, PollerConfig};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busstop_poller=info,busstop_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PollerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        username = %config.credentials.username(),
        base_url = %config.base_url,
        fallback_route_id = ?config.fallback_route_id,
        discovery_time = %config.discovery_time.format("%H:%M"),
        "Starting busstop-poller",
    );

    let context = match AccountContext::start_http(config).await {
        Ok(context) => context,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start polling");
            std::process::exit(1);
        }
    };

    context
        .subscribe_all(|route_id, record| {
            tracing::info!(
                route_id,
                bus = ?record.bus_number,
                latitude = ?record.latitude,
                longitude = ?record.longitude,
                last_seen = ?record.last_seen,
                "Bus position updated",
            );
        })
        .await;

    let discovery_task = discovery::spawn(&context);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    context.shutdown().await;
    let _ = discovery_task.await;
}
