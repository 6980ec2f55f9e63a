use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Booking;
use crate::services::booking;
use crate::services::notifications::{EmailProvider, SmsProvider};

#[derive(Debug, Serialize)]
pub struct SweepOutcome {
    pub reminded: usize,
    pub failed: usize,
    pub released_holds: usize,
}

fn reminder_body(booking: &Booking, salon_name: &str) -> String {
    format!(
        "Hi {}, a reminder from {}: your appointment is tomorrow ({}) at {}. See you then!",
        booking.customer_name,
        salon_name,
        booking.booking_date,
        booking.booking_time.format("%H:%M"),
    )
}

/// Periodic sweep: release lapsed holds, then remind tomorrow's confirmed
/// bookings.
///
/// `reminder_sent` flips only after the SMS actually went out, so a re-run
/// (or an overlapping trigger) never produces a second successful reminder
/// for the same booking. One failed notification does not stop the rest of
/// the batch. With nothing eligible the sweep has no side effects.
pub async fn run_sweep(
    db: &Arc<Mutex<Connection>>,
    sms: &dyn SmsProvider,
    email: &dyn EmailProvider,
    salon_name: &str,
    now: NaiveDateTime,
) -> Result<SweepOutcome, AppError> {
    let tomorrow = now.date() + Duration::days(1);

    let (released_holds, due) = {
        let conn = db.lock().unwrap();
        let released = booking::release_expired_holds(&conn, now)?;
        let due = queries::unreminded_confirmed_on(&conn, tomorrow)?;
        (released.len(), due)
    };

    let mut reminded = 0;
    let mut failed = 0;
    for booking in due {
        let body = reminder_body(&booking, salon_name);
        match sms.send_sms(&booking.customer_phone, &body).await {
            Ok(()) => {
                let conn = db.lock().unwrap();
                queries::mark_reminder_sent(&conn, &booking.id, now)?;
                reminded += 1;
            }
            Err(e) => {
                tracing::warn!(booking_id = %booking.id, error = %e, "reminder SMS failed");
                failed += 1;
                continue;
            }
        }

        // Email is best-effort alongside the SMS channel.
        if let Err(e) = email
            .send_email(
                &booking.customer_email,
                &format!("Appointment reminder — {salon_name}"),
                &body,
            )
            .await
        {
            tracing::warn!(booking_id = %booking.id, error = %e, "reminder email failed");
        }
    }

    if reminded > 0 || failed > 0 || released_holds > 0 {
        tracing::info!(reminded, failed, released_holds, "reminder sweep finished");
    }

    Ok(SweepOutcome {
        reminded,
        failed,
        released_holds,
    })
}
