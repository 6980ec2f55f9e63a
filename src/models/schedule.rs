use chrono::{Datelike, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Day-of-week number as stored in `weekly_schedule`: 0 = Sunday .. 6 = Saturday.
///
/// Every schedule lookup goes through this function so the numbering cannot
/// drift between the table and the date library.
pub fn day_of_week(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// One recurring weekly availability window for a staff member.
/// Absence of a row for a day means closed that day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub staff_id: String,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

/// The resolved open/closed state of one staff member on one date, after
/// time-off overrides and the weekly schedule have been combined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveWindow {
    Closed,
    Open { start: NaiveTime, end: NaiveTime },
}

impl EffectiveWindow {
    pub fn is_open(&self) -> bool {
        matches!(self, EffectiveWindow::Open { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    // 2024-06-02 is a Sunday; the following six dates cover the whole week.
    #[test]
    fn test_day_of_week_all_seven_days() {
        assert_eq!(day_of_week(d("2024-06-02")), 0); // Sunday
        assert_eq!(day_of_week(d("2024-06-03")), 1); // Monday
        assert_eq!(day_of_week(d("2024-06-04")), 2); // Tuesday
        assert_eq!(day_of_week(d("2024-06-05")), 3); // Wednesday
        assert_eq!(day_of_week(d("2024-06-06")), 4); // Thursday
        assert_eq!(day_of_week(d("2024-06-07")), 5); // Friday
        assert_eq!(day_of_week(d("2024-06-08")), 6); // Saturday
    }

    #[test]
    fn test_day_of_week_wraps_across_weeks() {
        assert_eq!(day_of_week(d("2024-06-09")), 0);
        assert_eq!(day_of_week(d("2024-12-31")), 2); // Tuesday
        assert_eq!(day_of_week(d("2025-01-01")), 3); // Wednesday
    }

    #[test]
    fn test_effective_window_is_open() {
        assert!(!EffectiveWindow::Closed.is_open());
        assert!(EffectiveWindow::Open {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }
        .is_open());
    }
}
