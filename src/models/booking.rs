use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub staff_id: String,
    pub service_id: String,
    pub addon_ids: Vec<String>,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: BookingStatus,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub payment_reference: String,
    pub amount: i64,
    pub hold_expires_at: Option<NaiveDateTime>,
    pub reminder_sent: bool,
    pub cancelled_at: Option<NaiveDateTime>,
    pub cancellation_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// True when this row occupies its slot: confirmed, or a pending hold
    /// whose TTL has not lapsed.
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        match self.status {
            BookingStatus::Confirmed => true,
            BookingStatus::Pending => self.hold_expires_at.map(|e| e > now).unwrap_or(false),
            BookingStatus::Cancelled | BookingStatus::Completed => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "confirmed" => BookingStatus::Confirmed,
            "cancelled" => BookingStatus::Cancelled,
            "completed" => BookingStatus::Completed,
            _ => BookingStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

/// What a customer submits to start the booking flow. Validated before any
/// store mutation; duration and price are derived from the referenced
/// service and addons, never taken from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct BookingInput {
    pub staff_id: String,
    pub service_id: String,
    #[serde(default)]
    pub addon_ids: Vec<String>,
    pub booking_date: NaiveDate,
    pub booking_time: NaiveTime,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn base_booking(status: BookingStatus) -> Booking {
        Booking {
            id: "bk-1".to_string(),
            staff_id: "staff-1".to_string(),
            service_id: "svc-1".to_string(),
            addon_ids: vec![],
            booking_date: NaiveDate::parse_from_str("2024-06-03", "%Y-%m-%d").unwrap(),
            booking_time: NaiveTime::parse_from_str("10:00", "%H:%M").unwrap(),
            duration_minutes: 30,
            status,
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: "+15551110000".to_string(),
            payment_reference: "sb_ref".to_string(),
            amount: 5000,
            hold_expires_at: None,
            reminder_sent: false,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: dt("2024-06-01 09:00"),
            updated_at: dt("2024-06-01 09:00"),
        }
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Cancelled,
            BookingStatus::Completed,
        ] {
            assert_eq!(BookingStatus::parse(status.as_str()), status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BookingStatus::Pending.is_terminal());
        assert!(!BookingStatus::Confirmed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
    }

    #[test]
    fn test_confirmed_is_always_active() {
        let b = base_booking(BookingStatus::Confirmed);
        assert!(b.is_active(dt("2099-01-01 00:00")));
    }

    #[test]
    fn test_pending_active_only_while_hold_unexpired() {
        let mut b = base_booking(BookingStatus::Pending);
        b.hold_expires_at = Some(dt("2024-06-01 10:00"));
        assert!(b.is_active(dt("2024-06-01 09:59")));
        assert!(!b.is_active(dt("2024-06-01 10:00")));
        assert!(!b.is_active(dt("2024-06-01 10:01")));
    }

    #[test]
    fn test_pending_without_expiry_is_not_active() {
        let b = base_booking(BookingStatus::Pending);
        assert!(!b.is_active(dt("2024-06-01 09:00")));
    }

    #[test]
    fn test_cancelled_and_completed_never_active() {
        assert!(!base_booking(BookingStatus::Cancelled).is_active(dt("2024-06-01 09:00")));
        assert!(!base_booking(BookingStatus::Completed).is_active(dt("2024-06-01 09:00")));
    }
}
