use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Explicit override blocking an inclusive date range for a staff member,
/// regardless of their weekly schedule. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeOff {
    pub id: i64,
    pub staff_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub created_at: NaiveDateTime,
}

impl TimeOff {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(start: &str, end: &str) -> TimeOff {
        TimeOff {
            id: 1,
            staff_id: "staff-1".to_string(),
            start_date: NaiveDate::parse_from_str(start, "%Y-%m-%d").unwrap(),
            end_date: NaiveDate::parse_from_str(end, "%Y-%m-%d").unwrap(),
            reason: "holiday".to_string(),
            created_at: chrono::Utc::now().naive_utc(),
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_contains_is_inclusive_on_both_ends() {
        let t = record("2024-06-01", "2024-06-03");
        assert!(t.contains(d("2024-06-01")));
        assert!(t.contains(d("2024-06-02")));
        assert!(t.contains(d("2024-06-03")));
        assert!(!t.contains(d("2024-05-31")));
        assert!(!t.contains(d("2024-06-04")));
    }

    #[test]
    fn test_single_day_range() {
        let t = record("2024-06-01", "2024-06-01");
        assert!(t.contains(d("2024-06-01")));
        assert!(!t.contains(d("2024-06-02")));
    }
}
