//! Adaptive poll scheduling.
//!
//! A route is polled frequently only around its scheduled pickup and
//! dropoff times and rarely otherwise. Everything here is a pure function
//! of the wall-clock time passed in, so callers inject `now` and tests can
//! probe exact boundary instants.

use std::time::Duration;

use chrono::{Datelike, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Weekday};
use serde::Serialize;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minutes either side of a scheduled time during which polling is active.
pub const DEFAULT_WINDOW_MINUTES: i64 = 15;

/// Poll interval inside an active window.
pub const DEFAULT_ACTIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Poll interval outside every active window.
pub const DEFAULT_INACTIVE_INTERVAL: Duration = Duration::from_secs(3600);

const SECONDS_PER_DAY: i64 = 86_400;

/// Time of day at which route discovery runs when none is configured (02:00).
pub fn default_discovery_time() -> NaiveTime {
    NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN)
}

// ---------------------------------------------------------------------------
// Time-of-day parsing
// ---------------------------------------------------------------------------

/// Parse an `HH:MM` time of day.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, CoreError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| CoreError::InvalidTimeOfDay(value.to_string()))
}

// ---------------------------------------------------------------------------
// Windows
// ---------------------------------------------------------------------------

/// A time-of-day interval `[center - half_width, center + half_width]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollWindow {
    pub center: NaiveTime,
    #[serde(serialize_with = "serialize_minutes")]
    pub half_width: TimeDelta,
}

fn serialize_minutes<S: serde::Serializer>(d: &TimeDelta, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_i64(d.num_minutes())
}

impl PollWindow {
    pub fn new(center: NaiveTime, half_width: TimeDelta) -> Self {
        Self { center, half_width }
    }

    /// Window of [`DEFAULT_WINDOW_MINUTES`] either side of `center`.
    pub fn around(center: NaiveTime) -> Self {
        Self::new(center, TimeDelta::minutes(DEFAULT_WINDOW_MINUTES))
    }

    /// Whether `now` falls inside the window, bounds inclusive.
    ///
    /// Compared at whole-second precision. A window that crosses midnight
    /// wraps around, and one that is a full day wide or more always
    /// contains `now`.
    pub fn contains(&self, now: NaiveTime) -> bool {
        let half = self.half_width.num_seconds().abs();
        if 2 * half >= SECONDS_PER_DAY {
            return true;
        }

        let center = i64::from(self.center.num_seconds_from_midnight());
        let now = i64::from(now.num_seconds_from_midnight());
        let start = center - half;
        let end = center + half;

        if start < 0 {
            now >= start + SECONDS_PER_DAY || now <= end
        } else if end >= SECONDS_PER_DAY {
            now >= start || now <= end - SECONDS_PER_DAY
        } else {
            (start..=end).contains(&now)
        }
    }
}

/// The three independently configured windows for a route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScheduleWindows {
    /// Applies every day.
    pub morning_pickup: Option<PollWindow>,
    /// Applies Monday-Thursday and weekends, never on Friday.
    pub afternoon_dropoff: Option<PollWindow>,
    /// Applies on Friday only.
    pub friday_dropoff: Option<PollWindow>,
}

impl ScheduleWindows {
    /// Windows that apply on the given kind of day.
    pub fn applicable(&self, is_friday: bool) -> impl Iterator<Item = &PollWindow> {
        let dropoff = if is_friday {
            self.friday_dropoff.as_ref()
        } else {
            self.afternoon_dropoff.as_ref()
        };
        self.morning_pickup.as_ref().into_iter().chain(dropoff)
    }

    pub fn is_empty(&self) -> bool {
        self.morning_pickup.is_none()
            && self.afternoon_dropoff.is_none()
            && self.friday_dropoff.is_none()
    }
}

/// Whether `now` falls inside any window that applies today.
pub fn is_active_window(now: NaiveTime, windows: &ScheduleWindows, is_friday: bool) -> bool {
    windows.applicable(is_friday).any(|w| w.contains(now))
}

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

/// Poll frequency in effect right now. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollCadence {
    Active,
    Inactive,
}

/// Interval durations for each [`PollCadence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CadenceConfig {
    pub active_interval: Duration,
    pub inactive_interval: Duration,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            active_interval: DEFAULT_ACTIVE_INTERVAL,
            inactive_interval: DEFAULT_INACTIVE_INTERVAL,
        }
    }
}

impl PollCadence {
    pub fn interval(self, config: &CadenceConfig) -> Duration {
        match self {
            Self::Active => config.active_interval,
            Self::Inactive => config.inactive_interval,
        }
    }
}

pub fn select_cadence(is_active: bool) -> PollCadence {
    if is_active {
        PollCadence::Active
    } else {
        PollCadence::Inactive
    }
}

/// Cadence for a local wall-clock instant, deriving the Friday rule from
/// the weekday.
pub fn cadence_at(now: NaiveDateTime, windows: &ScheduleWindows) -> PollCadence {
    let is_friday = now.weekday() == Weekday::Fri;
    select_cadence(is_active_window(now.time(), windows, is_friday))
}

/// Time until the next occurrence of `at` strictly after `now`.
pub fn until_next(now: NaiveDateTime, at: NaiveTime) -> Duration {
    let today = now.date().and_time(at);
    let next = if today > now {
        today
    } else {
        today + TimeDelta::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    use super::*;

    fn t(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn windows() -> ScheduleWindows {
        ScheduleWindows {
            morning_pickup: Some(PollWindow::around(t(7, 30, 0))),
            afternoon_dropoff: Some(PollWindow::around(t(15, 30, 0))),
            friday_dropoff: Some(PollWindow::around(t(13, 0, 0))),
        }
    }

    // -----------------------------------------------------------------------
    // Window boundaries
    // -----------------------------------------------------------------------

    #[test]
    fn active_at_center_and_both_bounds() {
        let w = windows();
        assert!(is_active_window(t(7, 30, 0), &w, false));
        assert!(is_active_window(t(7, 15, 0), &w, false));
        assert!(is_active_window(t(7, 45, 0), &w, false));
    }

    #[test]
    fn inactive_one_second_outside() {
        let w = windows();
        assert!(!is_active_window(t(7, 14, 59), &w, false));
        assert!(!is_active_window(t(7, 45, 1), &w, false));
    }

    #[test]
    fn morning_window_applies_every_day() {
        let w = windows();
        assert!(is_active_window(t(7, 30, 0), &w, true));
        assert!(is_active_window(t(7, 30, 0), &w, false));
    }

    #[test]
    fn friday_window_only_on_friday() {
        let w = windows();
        assert!(is_active_window(t(13, 0, 0), &w, true));
        assert!(!is_active_window(t(13, 0, 0), &w, false));
    }

    #[test]
    fn afternoon_window_never_on_friday() {
        let w = windows();
        assert!(is_active_window(t(15, 30, 0), &w, false));
        assert!(!is_active_window(t(15, 30, 0), &w, true));
    }

    #[test]
    fn day_exclusivity_holds_for_any_width() {
        let wide = PollWindow::new(t(15, 0, 0), TimeDelta::hours(23));
        let afternoon_only = ScheduleWindows {
            afternoon_dropoff: Some(wide),
            ..Default::default()
        };
        let friday_only = ScheduleWindows {
            friday_dropoff: Some(wide),
            ..Default::default()
        };

        assert!(is_active_window(t(3, 0, 0), &afternoon_only, false));
        assert!(!is_active_window(t(15, 0, 0), &afternoon_only, true));
        assert!(is_active_window(t(3, 0, 0), &friday_only, true));
        assert!(!is_active_window(t(15, 0, 0), &friday_only, false));
    }

    #[test]
    fn no_windows_is_never_active() {
        let w = ScheduleWindows::default();
        assert!(w.is_empty());
        assert!(!is_active_window(t(7, 30, 0), &w, false));
    }

    #[test]
    fn window_wraps_past_midnight() {
        let w = PollWindow::around(t(23, 55, 0));
        assert!(w.contains(t(23, 40, 0)));
        assert!(w.contains(t(0, 10, 0)));
        assert!(!w.contains(t(0, 10, 1)));
        assert!(!w.contains(t(23, 39, 59)));

        let w = PollWindow::around(t(0, 5, 0));
        assert!(w.contains(t(23, 50, 0)));
        assert!(w.contains(t(0, 20, 0)));
        assert!(!w.contains(t(23, 49, 59)));
    }

    #[test]
    fn zero_width_window_matches_only_center() {
        let w = PollWindow::new(t(8, 0, 0), TimeDelta::zero());
        assert!(w.contains(t(8, 0, 0)));
        assert!(!w.contains(t(8, 0, 1)));
    }

    // -----------------------------------------------------------------------
    // Cadence
    // -----------------------------------------------------------------------

    #[test]
    fn select_cadence_maps_bool() {
        let config = CadenceConfig::default();
        assert_eq!(select_cadence(true).interval(&config), Duration::from_secs(60));
        assert_eq!(select_cadence(false).interval(&config), Duration::from_secs(3600));
    }

    #[test]
    fn cadence_at_uses_weekday() {
        let w = windows();
        // 2024-01-05 is a Friday, 2024-01-04 a Thursday.
        let friday = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_time(t(13, 5, 0));
        let thursday = NaiveDate::from_ymd_opt(2024, 1, 4).unwrap().and_time(t(13, 5, 0));
        assert_eq!(cadence_at(friday, &w), PollCadence::Active);
        assert_eq!(cadence_at(thursday, &w), PollCadence::Inactive);
    }

    // -----------------------------------------------------------------------
    // Parsing and next occurrence
    // -----------------------------------------------------------------------

    #[test]
    fn parses_hh_mm() {
        assert_eq!(parse_time_of_day("07:45").unwrap(), t(7, 45, 0));
        assert_eq!(parse_time_of_day(" 15:05 ").unwrap(), t(15, 5, 0));
    }

    #[test]
    fn malformed_time_is_rejected() {
        assert!(parse_time_of_day("25:00").is_err());
        assert!(parse_time_of_day("quarter past").is_err());
        assert_matches!(parse_time_of_day("7.30"), Err(CoreError::InvalidTimeOfDay(v)) if v == "7.30");
    }

    #[test]
    fn until_next_later_today_or_tomorrow() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        let now = day.and_time(t(1, 0, 0));
        assert_eq!(until_next(now, t(2, 0, 0)), Duration::from_secs(3600));

        let now = day.and_time(t(2, 0, 0));
        assert_eq!(until_next(now, t(2, 0, 0)), Duration::from_secs(86_400));

        let now = day.and_time(t(3, 0, 0));
        assert_eq!(until_next(now, t(2, 0, 0)), Duration::from_secs(23 * 3600));
    }
}
