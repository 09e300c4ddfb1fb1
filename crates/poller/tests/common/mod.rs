//! Shared in-memory upstream for poller integration tests.
//!
//! Every [`FakeTransport`] built from one [`FakeUpstream`] talks to the same
//! scripted site, so tests can change route replies or reject logins after
//! the poller is already running.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use busstop_client::{Endpoints, SessionClient, Transport, TransportError};
use busstop_core::types::{Credentials, RouteId};
use busstop_poller::{Connector, PollerConfig};
use serde_json::{json, Value};

pub const BASE_URL: &str = "http://bus.test";

const LOGIN_PAGE: &str = r#"
    <input type="hidden" name="__VIEWSTATE" id="__VIEWSTATE" value="vs" />
    <input type="hidden" name="__VIEWSTATEGENERATOR" id="__VIEWSTATEGENERATOR" value="gen" />
    <input type="hidden" name="__EVENTVALIDATION" id="__EVENTVALIDATION" value="ev" />
"#;

/// Scripted answer to a status request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Bus is running; the payload carries this bus number.
    Active(&'static str),
    /// Route answered with an empty envelope.
    Inactive,
    /// Transport failure.
    Fail,
}

struct Site {
    /// `(id, name)` pairs rendered as `<option>` elements after login.
    routes: Vec<(RouteId, &'static str)>,
    replies: HashMap<RouteId, Reply>,
    /// `None` accepts every login; `Some(n)` accepts `n` more.
    logins_remaining: Option<usize>,
    delay: Duration,
    connector_fails: bool,
    status_calls: HashMap<RouteId, usize>,
}

#[derive(Clone)]
pub struct FakeUpstream {
    site: Arc<Mutex<Site>>,
    logins: Arc<AtomicUsize>,
}

impl FakeUpstream {
    pub fn new(routes: &[(RouteId, &'static str)]) -> Self {
        Self {
            site: Arc::new(Mutex::new(Site {
                routes: routes.to_vec(),
                replies: HashMap::new(),
                logins_remaining: None,
                delay: Duration::ZERO,
                connector_fails: false,
                status_calls: HashMap::new(),
            })),
            logins: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_routes(&self, routes: &[(RouteId, &'static str)]) {
        self.site.lock().unwrap().routes = routes.to_vec();
    }

    pub fn reply(&self, route_id: RouteId, reply: Reply) {
        self.site.lock().unwrap().replies.insert(route_id, reply);
    }

    pub fn accept_logins(&self, remaining: Option<usize>) {
        self.site.lock().unwrap().logins_remaining = remaining;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.site.lock().unwrap().delay = delay;
    }

    pub fn fail_connector(&self, fails: bool) {
        self.site.lock().unwrap().connector_fails = fails;
    }

    pub fn status_calls(&self, route_id: RouteId) -> usize {
        self.site
            .lock()
            .unwrap()
            .status_calls
            .get(&route_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> FakeTransport {
        FakeTransport {
            upstream: self.clone(),
        }
    }

    pub fn connector(&self) -> Connector<FakeTransport> {
        let upstream = self.clone();
        Arc::new(move || {
            if upstream.site.lock().unwrap().connector_fails {
                return Err(TransportError::Connection("no route to host".to_string()));
            }
            Ok(upstream.transport())
        })
    }

    pub fn session(&self) -> SessionClient<FakeTransport> {
        SessionClient::new(self.transport(), credentials(), Endpoints::new(BASE_URL))
    }

    fn landing_page(&self) -> String {
        let site = self.site.lock().unwrap();
        let options: String = site
            .routes
            .iter()
            .map(|(id, name)| format!("<option value=\"{id}\">{name}</option>\n"))
            .collect();
        format!("<input type=\"hidden\" id=\"hiddenUser\" value=\"parent\" />\n<select>\n{options}</select>")
    }
}

pub struct FakeTransport {
    upstream: FakeUpstream,
}

impl Transport for FakeTransport {
    async fn get_text(&self, url: &str) -> Result<String, TransportError> {
        if url.contains("login.aspx") {
            Ok(LOGIN_PAGE.to_string())
        } else {
            Ok(self.upstream.landing_page())
        }
    }

    async fn post_form(&self, _url: &str, _form: &[(&str, &str)]) -> Result<String, TransportError> {
        self.upstream.logins.fetch_add(1, Ordering::SeqCst);
        let accepted = {
            let mut site = self.upstream.site.lock().unwrap();
            match site.logins_remaining.as_mut() {
                None => true,
                Some(0) => false,
                Some(n) => {
                    *n -= 1;
                    true
                }
            }
        };
        if accepted {
            Ok(self.upstream.landing_page())
        } else {
            Ok("<span class=\"error\">Invalid user name or password</span>".to_string())
        }
    }

    async fn post_json(
        &self,
        _url: &str,
        body: &Value,
        _headers: &[(&str, &str)],
    ) -> Result<Value, TransportError> {
        let route_id = body["route_detail_id"].as_i64().unwrap_or_default();
        let delay = self.upstream.site.lock().unwrap().delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut site = self.upstream.site.lock().unwrap();
            *site.status_calls.entry(route_id).or_default() += 1;
            site.replies.get(&route_id).cloned().unwrap_or(Reply::Inactive)
        };

        match reply {
            Reply::Active(bus) => Ok(json!({"d": [
                bus, "2024-09-03T07:31:00", "-4", "45.4215", "-75.6972", "2024-09-03T07:32:10"
            ]})),
            Reply::Inactive => Ok(json!({"d": []})),
            Reply::Fail => Err(TransportError::Status {
                status: 500,
                body: "Internal Server Error".to_string(),
            }),
        }
    }
}

pub fn credentials() -> Credentials {
    Credentials::new("parent@example.com", "s3cret")
}

pub fn config() -> PollerConfig {
    PollerConfig {
        base_url: BASE_URL.to_string(),
        ..PollerConfig::new(credentials())
    }
}
