use std::time::Duration;

use busstop_client::session::DEFAULT_BASE_URL;
use busstop_client::transport::DEFAULT_REQUEST_TIMEOUT;
use busstop_client::{Endpoints, TransportConfig};
use busstop_core::schedule::{
    default_discovery_time, parse_time_of_day, CadenceConfig, PollWindow, ScheduleWindows,
    DEFAULT_ACTIVE_INTERVAL, DEFAULT_INACTIVE_INTERVAL, DEFAULT_WINDOW_MINUTES,
};
use busstop_core::types::{Credentials, RouteId};
use chrono::{NaiveTime, TimeDelta};

use crate::error::PollerError;

/// Poller configuration for one account.
///
/// Built from environment variables by [`PollerConfig::from_env`], or
/// directly with [`PollerConfig::new`] and field overrides.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub credentials: Credentials,
    /// Route polled when discovery finds nothing at startup.
    pub fallback_route_id: Option<RouteId>,
    /// Upstream site, e.g. `https://www.mybusstop.ca`.
    pub base_url: String,
    /// Pickup/dropoff windows applied to every route.
    pub windows: ScheduleWindows,
    pub cadence: CadenceConfig,
    /// Local time of day at which route discovery runs.
    pub discovery_time: NaiveTime,
    pub request_timeout: Duration,
}

impl PollerConfig {
    /// Configuration with every optional setting at its default.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            fallback_route_id: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            windows: ScheduleWindows::default(),
            cadence: CadenceConfig::default(),
            discovery_time: default_discovery_time(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.base_url)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            request_timeout: self.request_timeout,
            ..Default::default()
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                          | Default                     |
    /// |----------------------------------|-----------------------------|
    /// | `BUSSTOP_USERNAME`               | required                    |
    /// | `BUSSTOP_PASSWORD`               | required                    |
    /// | `BUSSTOP_ROUTE_ID`               | unset                       |
    /// | `BUSSTOP_BASE_URL`               | `https://www.mybusstop.ca`  |
    /// | `BUSSTOP_MORNING_PICKUP_TIME`    | unset (window disabled)     |
    /// | `BUSSTOP_AFTERNOON_DROPOFF_TIME` | unset (window disabled)     |
    /// | `BUSSTOP_FRIDAY_DROPOFF_TIME`    | unset (window disabled)     |
    /// | `BUSSTOP_WINDOW_MINUTES`         | `15`                        |
    /// | `BUSSTOP_ACTIVE_INTERVAL_SECS`   | `60`                        |
    /// | `BUSSTOP_INACTIVE_INTERVAL_SECS` | `3600`                      |
    /// | `BUSSTOP_DISCOVERY_TIME`         | `02:00`                     |
    /// | `BUSSTOP_REQUEST_TIMEOUT_SECS`   | `30`                        |
    pub fn from_env() -> Result<Self, PollerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable
    /// lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PollerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PollerError::Config(format!("{key} environment variable is required")))
        };

        let credentials = Credentials::new(required("BUSSTOP_USERNAME")?, required("BUSSTOP_PASSWORD")?);
        let mut config = Self::new(credentials);

        config.fallback_route_id = match lookup("BUSSTOP_ROUTE_ID") {
            Some(raw) => Some(raw.trim().parse().map_err(|_| {
                PollerError::Config("BUSSTOP_ROUTE_ID must be a valid integer".to_string())
            })?),
            None => None,
        };

        if let Some(url) = lookup("BUSSTOP_BASE_URL").filter(|v| !v.is_empty()) {
            config.base_url = url;
        }

        let half_width = TimeDelta::minutes(number_or(
            &lookup,
            "BUSSTOP_WINDOW_MINUTES",
            DEFAULT_WINDOW_MINUTES,
        ));
        let window = |key: &str| optional_window(&lookup, key, half_width);
        config.windows = ScheduleWindows {
            morning_pickup: window("BUSSTOP_MORNING_PICKUP_TIME"),
            afternoon_dropoff: window("BUSSTOP_AFTERNOON_DROPOFF_TIME"),
            friday_dropoff: window("BUSSTOP_FRIDAY_DROPOFF_TIME"),
        };

        config.cadence = CadenceConfig {
            active_interval: interval_or(&lookup, "BUSSTOP_ACTIVE_INTERVAL_SECS", DEFAULT_ACTIVE_INTERVAL),
            inactive_interval: interval_or(
                &lookup,
                "BUSSTOP_INACTIVE_INTERVAL_SECS",
                DEFAULT_INACTIVE_INTERVAL,
            ),
        };

        if let Some(raw) = lookup("BUSSTOP_DISCOVERY_TIME") {
            config.discovery_time = parse_time_of_day(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default discovery time 02:00");
                default_discovery_time()
            });
        }

        config.request_timeout = Duration::from_secs(number_or(
            &lookup,
            "BUSSTOP_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs(),
        ));

        Ok(config)
    }
}

/// Parse a numeric variable, warning and falling back on garbage.
fn number_or<F, N>(lookup: &F, key: &str, default: N) -> N
where
    F: Fn(&str) -> Option<String>,
    N: std::str::FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "Invalid number, using default");
            default
        }),
        None => default,
    }
}

/// Parse a poll interval in seconds. Zero would poll in a tight loop, so
/// it is treated like any other invalid value.
fn interval_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    match number_or(lookup, key, default.as_secs()) {
        0 => {
            tracing::warn!(key, default_secs = default.as_secs(), "Zero interval, using default");
            default
        }
        secs => Duration::from_secs(secs),
    }
}

/// A window centred on an `HH:MM` variable; unset or malformed disables it.
fn optional_window<F>(lookup: &F, key: &str, half_width: TimeDelta) -> Option<PollWindow>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key).filter(|v| !v.trim().is_empty())?;
    match parse_time_of_day(&raw) {
        Ok(center) => Some(PollWindow::new(center, half_width)),
        Err(e) => {
            tracing::warn!(key, error = %e, "Ignoring poll window");
            None
        }
    }
}
