//! Local-day window resolution.
//!
//! The engine reasons about "today", "this morning" and "due within N hours"
//! in the users' wall-clock day, derived from a UTC instant plus a fixed
//! timezone offset. Pure arithmetic, no failure modes.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;

/// A resolved local calendar window around one instant.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalWindow {
    pub offset_hours: i32,
    pub now_utc: DateTime<Utc>,
    /// Local calendar date, `YYYY-MM-DD`.
    pub local_date: String,
    /// Local hour of day, 0-23.
    pub local_hour: u32,
    /// ISO day of week: Monday=1 ... Sunday=7.
    pub day_id: u32,
    /// UTC instant where the local calendar day begins.
    pub start_utc: DateTime<Utc>,
    /// UTC instant where the next local calendar day begins.
    pub end_utc: DateTime<Utc>,
}

impl LocalWindow {
    /// Resolve the window for `now` at a fixed offset (e.g. +7 for WIB).
    pub fn resolve(now: DateTime<Utc>, offset_hours: i32) -> Self {
        let local = now + Duration::hours(offset_hours as i64);
        let local_date: NaiveDate = local.date_naive();
        let start_utc = local_date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always a valid time")
            .and_utc()
            - Duration::hours(offset_hours as i64);

        Self {
            offset_hours,
            now_utc: now,
            local_date: local_date.format("%Y-%m-%d").to_string(),
            local_hour: local.hour(),
            day_id: local.weekday().number_from_monday(),
            start_utc,
            end_utc: start_utc + Duration::hours(24),
        }
    }

    /// The `YYYY-MM-DD-HH` bucket event keys and fatigue sampling hang off.
    pub fn hour_bucket(&self) -> String {
        format!("{}-{:02}", self.local_date, self.local_hour)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_plain_day() {
        // 2026-08-05 is a Wednesday. 05:00 UTC at +7 is 12:00 local.
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 5, 0, 0).unwrap();
        let w = LocalWindow::resolve(now, 7);
        assert_eq!(w.local_date, "2026-08-05");
        assert_eq!(w.local_hour, 12);
        assert_eq!(w.day_id, 3);
        assert_eq!(w.start_utc, Utc.with_ymd_and_hms(2026, 8, 4, 17, 0, 0).unwrap());
        assert_eq!(w.end_utc, Utc.with_ymd_and_hms(2026, 8, 5, 17, 0, 0).unwrap());
    }

    #[test]
    fn test_offset_rolls_local_date_forward() {
        // 20:00 UTC at +7 is already 03:00 the next local day.
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 20, 0, 0).unwrap();
        let w = LocalWindow::resolve(now, 7);
        assert_eq!(w.local_date, "2026-08-06");
        assert_eq!(w.local_hour, 3);
    }

    #[test]
    fn test_negative_offset_rolls_local_date_back() {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 1, 0, 0).unwrap();
        let w = LocalWindow::resolve(now, -5);
        assert_eq!(w.local_date, "2026-08-04");
        assert_eq!(w.local_hour, 20);
    }

    #[test]
    fn test_sunday_maps_to_seven() {
        // 2026-08-09 is a Sunday.
        let now = Utc.with_ymd_and_hms(2026, 8, 9, 5, 0, 0).unwrap();
        let w = LocalWindow::resolve(now, 7);
        assert_eq!(w.day_id, 7);
    }

    #[test]
    fn test_hour_bucket_shape() {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 2, 30, 0).unwrap();
        let w = LocalWindow::resolve(now, 7);
        assert_eq!(w.hour_bucket(), "2026-08-05-09");
    }

    #[test]
    fn test_now_inside_own_window() {
        let now = Utc.with_ymd_and_hms(2026, 8, 5, 23, 59, 59).unwrap();
        let w = LocalWindow::resolve(now, 7);
        assert!(w.start_utc <= now && now < w.end_utc);
    }
}
