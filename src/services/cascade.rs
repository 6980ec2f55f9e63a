use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::BookingStatus;
use crate::services::notifications::SmsProvider;

#[derive(Debug, Serialize)]
pub struct CascadeOutcome {
    pub time_off_created: bool,
    pub cancelled_booking_ids: Vec<String>,
    pub notify_failures: Vec<String>,
}

struct CancelledBooking {
    id: String,
    customer_name: String,
    customer_phone: String,
    time: String,
}

/// Mark a staff member unavailable for one date and cancel whatever was
/// already booked that day.
///
/// The time-off record is the authoritative availability signal: it stays
/// committed even when a later cancellation or notification fails — those
/// failures are surfaced in the outcome for manual reconciliation, not
/// rolled back. Re-running for the same date finds no active bookings and
/// sends nothing.
pub async fn mark_unavailable(
    db: &Arc<Mutex<Connection>>,
    sms: &dyn SmsProvider,
    staff_id: &str,
    date: NaiveDate,
    reason: &str,
    now: NaiveDateTime,
) -> Result<CascadeOutcome, AppError> {
    let cancellation_reason = format!("Staff unavailable: {reason}");

    // Mutate the store first; notifications go out after the lock is gone.
    let (time_off_created, cancelled) = {
        let conn = db.lock().unwrap();

        queries::get_staff(&conn, staff_id)?
            .ok_or_else(|| AppError::NotFound(format!("staff member {staff_id}")))?;

        let created = queries::insert_time_off(&conn, staff_id, date, date, reason)?;

        let mut cancelled = vec![];
        for booking in queries::active_bookings(&conn, staff_id, date, now)? {
            queries::transition_status(
                &conn,
                &booking.id,
                BookingStatus::Cancelled,
                Some(&cancellation_reason),
                now,
            )?;
            cancelled.push(CancelledBooking {
                id: booking.id,
                customer_name: booking.customer_name,
                customer_phone: booking.customer_phone,
                time: booking.booking_time.format("%H:%M").to_string(),
            });
        }
        (created, cancelled)
    };

    tracing::info!(
        staff_id = %staff_id,
        date = %date,
        cancelled = cancelled.len(),
        time_off_created,
        "time-off cascade applied"
    );

    let mut cancelled_booking_ids = vec![];
    let mut notify_failures = vec![];
    for booking in cancelled {
        let body = format!(
            "Hi {}, we're sorry — your appointment on {} at {} has been cancelled ({}). \
             Please rebook at your convenience.",
            booking.customer_name, date, booking.time, reason
        );
        if let Err(e) = sms.send_sms(&booking.customer_phone, &body).await {
            tracing::warn!(booking_id = %booking.id, error = %e, "cancellation notice failed");
            notify_failures.push(booking.id.clone());
        }
        cancelled_booking_ids.push(booking.id);
    }

    Ok(CascadeOutcome {
        time_off_created,
        cancelled_booking_ids,
        notify_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Booking, Service, Staff};
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};

    struct MockSms {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    #[async_trait]
    impl SmsProvider for MockSms {
        async fn send_sms(&self, to: &str, body: &str) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("provider down");
            }
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), body.to_string()));
            Ok(())
        }
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn seeded_db() -> Arc<Mutex<Connection>> {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_staff(
            &conn,
            &Staff {
                id: "staff-1".to_string(),
                name: "Maya".to_string(),
                email: None,
                phone: None,
                is_active: true,
            },
        )
        .unwrap();
        queries::insert_service(
            &conn,
            &Service {
                id: "cut".to_string(),
                name: "Haircut".to_string(),
                price: 5000,
                duration_minutes: 30,
                category: None,
            },
        )
        .unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn confirmed_booking(id: &str, time: &str) -> Booking {
        Booking {
            id: id.to_string(),
            staff_id: "staff-1".to_string(),
            service_id: "cut".to_string(),
            addon_ids: vec![],
            booking_date: d("2024-06-01"),
            booking_time: NaiveTime::parse_from_str(time, "%H:%M").unwrap(),
            duration_minutes: 30,
            status: BookingStatus::Confirmed,
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: "+15551110000".to_string(),
            payment_reference: format!("ref-{id}"),
            amount: 5000,
            hold_expires_at: None,
            reminder_sent: false,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: dt("2024-05-01 09:00"),
            updated_at: dt("2024-05-01 09:00"),
        }
    }

    #[tokio::test]
    async fn test_cascade_cancels_active_bookings_with_reason() {
        let db = seeded_db();
        {
            let conn = db.lock().unwrap();
            queries::insert_booking(&conn, &confirmed_booking("bk-1", "10:00")).unwrap();
            queries::insert_booking(&conn, &confirmed_booking("bk-2", "14:00")).unwrap();
        }
        let sent = Arc::new(Mutex::new(vec![]));
        let sms = MockSms {
            sent: Arc::clone(&sent),
            fail: false,
        };

        let outcome = mark_unavailable(
            &db,
            &sms,
            "staff-1",
            d("2024-06-01"),
            "illness",
            dt("2024-05-30 08:00"),
        )
        .await
        .unwrap();

        assert!(outcome.time_off_created);
        assert_eq!(outcome.cancelled_booking_ids.len(), 2);
        assert!(outcome.notify_failures.is_empty());

        let conn = db.lock().unwrap();
        for id in ["bk-1", "bk-2"] {
            let b = queries::get_booking(&conn, id).unwrap().unwrap();
            assert_eq!(b.status, BookingStatus::Cancelled);
            assert_eq!(
                b.cancellation_reason.as_deref(),
                Some("Staff unavailable: illness")
            );
            assert!(b.cancelled_at.is_some());
        }
        assert!(queries::time_off_covering(&conn, "staff-1", d("2024-06-01"))
            .unwrap()
            .is_some());
        assert_eq!(sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cascade_is_idempotent() {
        let db = seeded_db();
        {
            let conn = db.lock().unwrap();
            queries::insert_booking(&conn, &confirmed_booking("bk-1", "10:00")).unwrap();
        }
        let sent = Arc::new(Mutex::new(vec![]));
        let sms = MockSms {
            sent: Arc::clone(&sent),
            fail: false,
        };
        let now = dt("2024-05-30 08:00");

        let first = mark_unavailable(&db, &sms, "staff-1", d("2024-06-01"), "illness", now)
            .await
            .unwrap();
        assert!(first.time_off_created);
        assert_eq!(first.cancelled_booking_ids.len(), 1);

        let second = mark_unavailable(&db, &sms, "staff-1", d("2024-06-01"), "illness", now)
            .await
            .unwrap();
        assert!(!second.time_off_created);
        assert!(second.cancelled_booking_ids.is_empty());

        // One notification total, not two.
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_undo_cancellation() {
        let db = seeded_db();
        {
            let conn = db.lock().unwrap();
            queries::insert_booking(&conn, &confirmed_booking("bk-1", "10:00")).unwrap();
        }
        let sms = MockSms {
            sent: Arc::new(Mutex::new(vec![])),
            fail: true,
        };

        let outcome = mark_unavailable(
            &db,
            &sms,
            "staff-1",
            d("2024-06-01"),
            "training",
            dt("2024-05-30 08:00"),
        )
        .await
        .unwrap();

        assert!(outcome.time_off_created);
        assert_eq!(outcome.cancelled_booking_ids, vec!["bk-1".to_string()]);
        assert_eq!(outcome.notify_failures, vec!["bk-1".to_string()]);

        let conn = db.lock().unwrap();
        let b = queries::get_booking(&conn, "bk-1").unwrap().unwrap();
        assert_eq!(b.status, BookingStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_unknown_staff_is_not_found() {
        let db = seeded_db();
        let sms = MockSms {
            sent: Arc::new(Mutex::new(vec![])),
            fail: false,
        };
        let err = mark_unavailable(
            &db,
            &sms,
            "nobody",
            d("2024-06-01"),
            "illness",
            dt("2024-05-30 08:00"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
