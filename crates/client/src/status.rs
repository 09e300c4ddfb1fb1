//! Normalization of the `getCurrentNEW` status payload.
//!
//! Upstream answers with an ASP.NET page-method envelope `{"d": [...]}`
//! whose array holds, in order: bus label, check-in time, timezone
//! offset, latitude, longitude and last-seen timestamp. Anything shorter
//! means the route is not running right now.

use busstop_core::types::BusStatusRecord;
use serde_json::Value;

/// Minimum number of elements in an active-route payload.
pub const STATUS_FIELD_COUNT: usize = 6;

/// Turn the raw envelope into a record, or `None` when the route is
/// inactive (missing envelope field, not an array, or too short).
pub fn parse_status_payload(payload: &Value) -> Option<BusStatusRecord> {
    let data = payload.get("d")?.as_array()?;
    if data.len() < STATUS_FIELD_COUNT {
        return None;
    }

    Some(BusStatusRecord {
        bus_number: text_field(&data[0]),
        checkin_time: text_field(&data[1]),
        timezone_offset: text_field(&data[2]),
        latitude: coordinate(&data[3]),
        longitude: coordinate(&data[4]),
        last_seen: text_field(&data[5]),
    })
}

/// String-ish element; null and blank become `None`.
fn text_field(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric-string coordinate. Empty, `"null"` and unparseable input
/// become `None` rather than an error.
fn coordinate(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s.eq_ignore_ascii_case("null") {
                None
            } else {
                s.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn full_payload_is_normalized() {
        let payload = json!({"d": [
            "1234", "2024-01-01T08:00:00", "-5", "49.123", "-123.456", "2024-01-01T08:15:00", "extra"
        ]});

        let record = parse_status_payload(&payload).unwrap();
        assert_eq!(record.bus_number.as_deref(), Some("1234"));
        assert_eq!(record.checkin_time.as_deref(), Some("2024-01-01T08:00:00"));
        assert_eq!(record.timezone_offset.as_deref(), Some("-5"));
        assert_eq!(record.latitude, Some(49.123));
        assert_eq!(record.longitude, Some(-123.456));
        assert_eq!(record.last_seen.as_deref(), Some("2024-01-01T08:15:00"));
    }

    #[test]
    fn short_array_is_inactive() {
        let payload = json!({"d": ["1234", "08:00", "-5", "49.1", "-123.4"]});
        assert_eq!(parse_status_payload(&payload), None);
    }

    #[test]
    fn missing_or_wrong_envelope_is_inactive() {
        assert_eq!(parse_status_payload(&json!({})), None);
        assert_eq!(parse_status_payload(&json!({"d": null})), None);
        assert_eq!(parse_status_payload(&json!({"d": "route not active"})), None);
        assert_eq!(parse_status_payload(&json!([1, 2, 3, 4, 5, 6])), None);
    }

    #[test]
    fn null_and_empty_coordinates_become_none() {
        let payload = json!({"d": ["12", null, "", null, "", ""]});
        let record = parse_status_payload(&payload).unwrap();
        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
        assert_eq!(record.checkin_time, None);
        assert_eq!(record.last_seen, None);

        let payload = json!({"d": ["12", "t", "z", "null", "NULL", "s"]});
        let record = parse_status_payload(&payload).unwrap();
        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
    }

    #[test]
    fn unparseable_coordinates_become_none() {
        let payload = json!({"d": ["12", "t", "z", "north", "NaN", "s"]});
        let record = parse_status_payload(&payload).unwrap();
        assert_eq!(record.latitude, None);
        assert_eq!(record.longitude, None);
    }

    #[test]
    fn numeric_elements_are_accepted() {
        let payload = json!({"d": [1234, "t", -5, 49.5, -123.25, "s"]});
        let record = parse_status_payload(&payload).unwrap();
        assert_eq!(record.bus_number.as_deref(), Some("1234"));
        assert_eq!(record.timezone_offset.as_deref(), Some("-5"));
        assert_eq!(record.latitude, Some(49.5));
        assert_eq!(record.longitude, Some(-123.25));
    }

    #[test]
    fn all_null_record_is_still_a_record() {
        let payload = json!({"d": [null, null, null, null, null, null]});
        let record = parse_status_payload(&payload).unwrap();
        assert_eq!(record.bus_number, None);
        assert_eq!(record.position(), None);
    }
}
