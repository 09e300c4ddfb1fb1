//! Narrow HTML scraping for the upstream WebForms pages.
//!
//! These are deliberately not general HTML parsers: they match the fixed
//! markup the upstream site emits and nothing more.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::types::{RouteDescriptor, RouteId};

// ---------------------------------------------------------------------------
// Hidden form fields
// ---------------------------------------------------------------------------

/// WebForms view-state token echoed back on login.
pub const VIEWSTATE: &str = "__VIEWSTATE";

/// WebForms view-state generator token echoed back on login.
pub const VIEWSTATE_GENERATOR: &str = "__VIEWSTATEGENERATOR";

/// WebForms event-validation token echoed back on login.
pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";

/// Return the `value` of the hidden input whose `id` is `name`.
///
/// The id match is case-insensitive and the `value` attribute must follow
/// the `id` attribute directly (only whitespace in between). Returns
/// `None` when the field is absent; this never fails.
pub fn extract_hidden_value(html: &str, name: &str) -> Option<String> {
    let pattern = format!(r#"id="{}"\s+value="([^"]*)""#, regex::escape(name));
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()?;

    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

// ---------------------------------------------------------------------------
// Route options
// ---------------------------------------------------------------------------

/// `<option ... value="N" ...>Name</option>`, case-insensitive.
static ROUTE_OPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r#"<option[^>]*value="([^"]*)"[^>]*>([^<]*)</option>"#)
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});

/// Parse every route `<option>` in the authenticated landing page, in
/// document order.
///
/// Options whose value is not an integer route id are skipped; the rest
/// of the page is still parsed.
pub fn parse_route_options(html: &str) -> Vec<RouteDescriptor> {
    ROUTE_OPTION_RE
        .captures_iter(html)
        .filter_map(|caps| {
            let id: RouteId = caps.get(1)?.as_str().trim().parse().ok()?;
            let name = caps.get(2).map(|m| m.as_str());
            Some(RouteDescriptor::new(id, name))
        })
        .collect()
}
