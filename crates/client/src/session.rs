//! Authenticated session against the MyBusStop site.
//!
//! [`SessionClient`] drives the WebForms login flow, remembers whether
//! the session is live, and renews it once when a status request fails.
//! One client is one upstream session; the poller creates one per route so
//! a failure on one route never disturbs another.

use busstop_core::html::{
    extract_hidden_value, parse_route_options, EVENT_VALIDATION, VIEWSTATE, VIEWSTATE_GENERATOR,
};
use busstop_core::types::{BusStatusRecord, Credentials, RouteDescriptor, RouteId};

use crate::error::{BusStopError, TransportError};
use crate::retry::RetryPolicy;
use crate::status::parse_status_payload;
use crate::transport::Transport;

/// Production site.
pub const DEFAULT_BASE_URL: &str = "https://www.mybusstop.ca";

/// Strings that only appear on the page served after a successful login.
const LOGIN_SUCCESS_MARKERS: [&str; 2] = ["hiddenUser", "MyBusStop"];

/// Upstream URLs derived from a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Scheme and host, e.g. `https://www.mybusstop.ca`. Sent as `Origin`.
    pub origin: String,
    /// Login form (GET for tokens, POST to authenticate).
    pub login_url: String,
    /// Authenticated landing page holding the route dropdown.
    pub index_url: String,
    /// `getCurrentNEW` page method.
    pub current_url: String,
}

impl Endpoints {
    pub fn new(base_url: &str) -> Self {
        let origin = base_url.trim_end_matches('/').to_string();
        Self {
            login_url: format!("{origin}/login.aspx?ReturnUrl=%2fLogin%2fIndex.aspx"),
            index_url: format!("{origin}/Login/Index.aspx"),
            current_url: format!("{origin}/Login/Index.aspx/getCurrentNEW"),
            origin,
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

/// Login state of a [`SessionClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedOut,
    LoggedIn,
}

/// One authenticated upstream session.
pub struct SessionClient<T> {
    transport: T,
    credentials: Credentials,
    endpoints: Endpoints,
    retry: RetryPolicy,
    state: SessionState,
    /// Body of the page returned by the last successful login.
    landing_page: Option<String>,
}

impl<T: Transport> SessionClient<T> {
    pub fn new(transport: T, credentials: Credentials, endpoints: Endpoints) -> Self {
        Self {
            transport,
            credentials,
            endpoints,
            retry: RetryPolicy::default(),
            state: SessionState::LoggedOut,
            landing_page: None,
        }
    }

    /// Override the retry policy used by [`fetch_current`](Self::fetch_current).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_logged_in(&self) -> bool {
        self.state == SessionState::LoggedIn
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Run the WebForms login flow.
    ///
    /// Fetches the login page, echoes its three postback tokens back with
    /// the credentials, and checks the response for logged-in markers.
    /// The state stays [`SessionState::LoggedOut`] on any failure.
    pub async fn login(&mut self) -> Result<(), BusStopError> {
        self.state = SessionState::LoggedOut;
        tracing::debug!(username = %self.credentials.username(), "Starting login");

        let login_page = self
            .transport
            .get_text(&self.endpoints.login_url)
            .await
            .map_err(|e| BusStopError::Auth(format!("Error fetching login page: {e}")))?;

        let viewstate = require_hidden(&login_page, VIEWSTATE)?;
        let viewstate_generator = require_hidden(&login_page, VIEWSTATE_GENERATOR)?;
        let event_validation = require_hidden(&login_page, EVENT_VALIDATION)?;

        let form = [
            ("__EVENTTARGET", ""),
            ("__EVENTARGUMENT", ""),
            (VIEWSTATE, viewstate.as_str()),
            (VIEWSTATE_GENERATOR, viewstate_generator.as_str()),
            (EVENT_VALIDATION, event_validation.as_str()),
            ("txtUserName", self.credentials.username()),
            ("txtPassword", self.credentials.password()),
            ("cmdLogin", "Log in"),
        ];

        let landing = self
            .transport
            .post_form(&self.endpoints.login_url, &form)
            .await
            .map_err(|e| BusStopError::Auth(format!("Login POST failed: {e}")))?;

        if !LOGIN_SUCCESS_MARKERS.iter().any(|m| landing.contains(m)) {
            tracing::debug!("Login response did not look like a logged-in page");
            return Err(BusStopError::Auth(
                "Login appears to have failed".to_string(),
            ));
        }

        tracing::info!(username = %self.credentials.username(), "Login successful");
        self.state = SessionState::LoggedIn;
        self.landing_page = Some(landing);
        Ok(())
    }

    /// List the routes visible to the account.
    ///
    /// Parses the page kept from the last login, or fetches the landing
    /// page when none is kept. Every failure yields an empty list: callers
    /// treat empty as "nothing new".
    pub async fn discover_routes(&mut self) -> Vec<RouteDescriptor> {
        if !self.is_logged_in() {
            if let Err(e) = self.login().await {
                tracing::warn!(error = %e, "Route discovery skipped: login failed");
                return Vec::new();
            }
        }

        let routes = match self.landing_page.as_deref() {
            Some(html) => parse_route_options(html),
            None => match self.transport.get_text(&self.endpoints.index_url).await {
                Ok(html) => parse_route_options(&html),
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to fetch routes page");
                    return Vec::new();
                }
            },
        };

        tracing::debug!(count = routes.len(), "Discovered routes");
        routes
    }

    /// Fetch live status for `route_id`.
    ///
    /// Returns `Ok(None)` when the route is not running right now. A
    /// transport failure is retried under the [`RetryPolicy`], renewing
    /// the login before each retry.
    pub async fn fetch_current(
        &mut self,
        route_id: RouteId,
    ) -> Result<Option<BusStatusRecord>, BusStopError> {
        if !self.is_logged_in() {
            self.login().await?;
        }

        let body = serde_json::json!({ "route_detail_id": route_id });
        let mut attempt = 1u32;

        let payload = loop {
            match self.post_status(&body).await {
                Ok(payload) => break payload,
                Err(e) if self.retry.should_retry(attempt) => {
                    tracing::warn!(
                        route_id,
                        attempt,
                        error = %e,
                        "Status request failed, renewing session",
                    );
                    self.state = SessionState::LoggedOut;
                    self.login().await?;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(BusStopError::Api(e.to_string()));
                }
            }
        };

        let record = parse_status_payload(&payload);
        if record.is_none() {
            tracing::debug!(route_id, %payload, "No status data, route may not be active");
        }
        Ok(record)
    }

    // ---- private helpers ----

    async fn post_status(
        &self,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, TransportError> {
        let headers = [
            ("X-Requested-With", "XMLHttpRequest"),
            ("Referer", self.endpoints.index_url.as_str()),
            ("Origin", self.endpoints.origin.as_str()),
        ];
        self.transport
            .post_json(&self.endpoints.current_url, body, &headers)
            .await
    }
}

fn require_hidden(html: &str, name: &str) -> Result<String, BusStopError> {
    extract_hidden_value(html, name)
        .ok_or_else(|| BusStopError::Auth(format!("Login page is missing {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_from_base_url() {
        let e = Endpoints::new("http://127.0.0.1:8080/");
        assert_eq!(e.origin, "http://127.0.0.1:8080");
        assert_eq!(
            e.login_url,
            "http://127.0.0.1:8080/login.aspx?ReturnUrl=%2fLogin%2fIndex.aspx"
        );
        assert_eq!(e.index_url, "http://127.0.0.1:8080/Login/Index.aspx");
        assert_eq!(
            e.current_url,
            "http://127.0.0.1:8080/Login/Index.aspx/getCurrentNEW"
        );
    }

    #[test]
    fn default_endpoints_target_production() {
        assert_eq!(Endpoints::default().origin, DEFAULT_BASE_URL);
    }
}
