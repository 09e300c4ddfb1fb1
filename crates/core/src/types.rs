use std::fmt;

use serde::Serialize;

/// Upstream-assigned route identifier. Unique per account.
pub type RouteId = i64;

/// Login credentials for one upstream account.
///
/// Immutable once constructed. The `Debug` impl redacts the password so
/// credentials can sit inside structs that get logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A route visible to the account, as found by discovery.
///
/// Identity is by `id` only: two descriptors with the same id and a
/// different name are the same route, renamed.
#[derive(Debug, Clone, Serialize)]
pub struct RouteDescriptor {
    pub id: RouteId,
    pub name: String,
}

impl RouteDescriptor {
    /// Build a descriptor, falling back to [`default_route_name`] when the
    /// supplied name is missing or blank.
    pub fn new(id: RouteId, name: Option<&str>) -> Self {
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => default_route_name(id),
        };
        Self { id, name }
    }
}

impl PartialEq for RouteDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RouteDescriptor {}

/// Display label used when upstream does not supply one.
pub fn default_route_name(id: RouteId) -> String {
    format!("Route {id}")
}

/// Normalized live status for one route.
///
/// `None` fields mean upstream sent a null, empty or unparseable value.
/// A route that is not running right now has no record at all, which is
/// represented by `Option<BusStatusRecord>::None` at the call sites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BusStatusRecord {
    pub bus_number: Option<String>,
    pub checkin_time: Option<String>,
    pub timezone_offset: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub last_seen: Option<String>,
}

impl BusStatusRecord {
    /// Latitude/longitude pair, only when both are known.
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}
