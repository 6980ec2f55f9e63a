use chrono::{Duration, NaiveDateTime};
use rusqlite::{Connection, TransactionBehavior};
use uuid::Uuid;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingInput, BookingStatus, EffectiveWindow};
use crate::services::availability;

/// Result of confirming a hold after payment verification.
#[derive(Debug)]
pub enum ConfirmOutcome {
    Confirmed(Booking),
    /// The reference was already confirmed by an earlier verify call;
    /// re-verification is a no-op.
    AlreadyConfirmed(Booking),
}

impl ConfirmOutcome {
    pub fn booking(&self) -> &Booking {
        match self {
            ConfirmOutcome::Confirmed(b) | ConfirmOutcome::AlreadyConfirmed(b) => b,
        }
    }
}

fn overlaps(start: i64, end: i64, other_start: i64, other_end: i64) -> bool {
    start < other_end && end > other_start
}

fn minute_of_day(t: chrono::NaiveTime) -> i64 {
    use chrono::Timelike;
    (t.hour() * 60 + t.minute()) as i64
}

/// Phase 1 of the booking protocol: reserve a tentative hold on the slot
/// before the customer is redirected to payment.
///
/// The overlap re-check and the insert run inside one immediate
/// transaction; together with the partial unique index on active
/// (staff_id, booking_date, booking_time) rows this is what keeps two
/// concurrent attempts from both succeeding.
pub fn place_hold(
    conn: &mut Connection,
    input: &BookingInput,
    now: NaiveDateTime,
    hold_ttl_minutes: i64,
) -> Result<Booking, AppError> {
    if input.customer_name.trim().is_empty()
        || input.customer_email.trim().is_empty()
        || input.customer_phone.trim().is_empty()
    {
        return Err(AppError::Validation(
            "customer name, email and phone are required".to_string(),
        ));
    }

    let staff = queries::get_staff(conn, &input.staff_id)?
        .filter(|s| s.is_active)
        .ok_or_else(|| AppError::NotFound(format!("staff member {}", input.staff_id)))?;

    let service = queries::get_service(conn, &input.service_id)?
        .ok_or_else(|| AppError::NotFound(format!("service {}", input.service_id)))?;

    let mut duration_minutes = service.duration_minutes;
    let mut amount = service.price;
    for addon_id in &input.addon_ids {
        let addon = queries::get_addon(conn, addon_id)?
            .ok_or_else(|| AppError::NotFound(format!("addon {addon_id}")))?;
        duration_minutes += addon.duration_minutes;
        amount += addon.price;
    }
    if duration_minutes <= 0 {
        return Err(AppError::Validation(
            "service duration must be positive".to_string(),
        ));
    }

    if input.booking_date < now.date()
        || (input.booking_date == now.date() && input.booking_time <= now.time())
    {
        return Err(AppError::Validation(
            "the requested time is in the past".to_string(),
        ));
    }

    let start = minute_of_day(input.booking_time);
    let end = start + duration_minutes as i64;
    match availability::effective_window(conn, &input.staff_id, input.booking_date)? {
        EffectiveWindow::Open {
            start: w_start,
            end: w_end,
        } if start >= minute_of_day(w_start) && end <= minute_of_day(w_end) => {}
        _ => {
            return Err(AppError::Validation(
                "the requested time is outside working hours".to_string(),
            ))
        }
    }

    let booking = Booking {
        id: Uuid::new_v4().to_string(),
        staff_id: staff.id,
        service_id: service.id,
        addon_ids: input.addon_ids.clone(),
        booking_date: input.booking_date,
        booking_time: input.booking_time,
        duration_minutes,
        status: BookingStatus::Pending,
        customer_name: input.customer_name.trim().to_string(),
        customer_email: input.customer_email.trim().to_string(),
        customer_phone: input.customer_phone.trim().to_string(),
        payment_reference: format!("sb_{}", Uuid::new_v4().simple()),
        amount,
        hold_expires_at: Some(now + Duration::minutes(hold_ttl_minutes)),
        reminder_sent: false,
        cancelled_at: None,
        cancellation_reason: None,
        created_at: now,
        updated_at: now,
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    // Expired holds are invisible to the overlap check but still occupy the
    // unique index; clear them before inserting.
    for id in
        queries::expired_hold_ids(&tx, now, Some((booking.staff_id.as_str(), booking.booking_date)))?
    {
        queries::transition_status(
            &tx,
            &id,
            BookingStatus::Cancelled,
            Some("Hold expired before payment"),
            now,
        )?;
    }

    let occupied = queries::active_intervals(&tx, &booking.staff_id, booking.booking_date, now)?;
    for occ in &occupied {
        if overlaps(start, end, minute_of_day(occ.start), minute_of_day(occ.end)) {
            return Err(AppError::SlotTaken);
        }
    }

    if let Err(e) = queries::insert_booking(&tx, &booking) {
        // The unique slot index catches exact-start races the overlap check
        // could not see.
        if let Some(rusqlite::Error::SqliteFailure(err, _)) = e.downcast_ref::<rusqlite::Error>() {
            if err.code == rusqlite::ErrorCode::ConstraintViolation {
                return Err(AppError::SlotTaken);
            }
        }
        return Err(AppError::Database(e));
    }
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        staff_id = %booking.staff_id,
        date = %booking.booking_date,
        time = %booking.booking_time,
        "hold placed"
    );

    Ok(booking)
}

/// Phase 2: convert a hold into a confirmed booking. Callers invoke this
/// only after the payment provider verified the reference as successful.
///
/// An expired-but-unreleased hold is still converted when its interval
/// remains free. If the slot was re-sold in the meantime (or the hold was
/// already released), the captured payment is parked in the reconciliation
/// queue and the caller gets `SlotTaken` — never a silent double booking.
pub fn confirm_hold(
    conn: &mut Connection,
    reference: &str,
    now: NaiveDateTime,
) -> Result<ConfirmOutcome, AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let booking = queries::get_booking_by_reference(&tx, reference)?
        .ok_or_else(|| AppError::NotFound(format!("payment reference {reference}")))?;

    match booking.status {
        BookingStatus::Confirmed | BookingStatus::Completed => {
            return Ok(ConfirmOutcome::AlreadyConfirmed(booking));
        }
        BookingStatus::Cancelled => {
            queries::insert_reconciliation(
                &tx,
                reference,
                &booking.id,
                booking.amount,
                "payment captured for a released hold — refund required",
            )?;
            tx.commit()?;
            tracing::warn!(
                booking_id = %booking.id,
                reference = %reference,
                "verified payment arrived for a released hold"
            );
            return Err(AppError::SlotTaken);
        }
        BookingStatus::Pending => {}
    }

    let start = minute_of_day(booking.booking_time);
    let end = start + booking.duration_minutes as i64;
    let conflict = queries::active_bookings(&tx, &booking.staff_id, booking.booking_date, now)?
        .into_iter()
        .filter(|b| b.id != booking.id)
        .any(|b| {
            let b_start = minute_of_day(b.booking_time);
            overlaps(start, end, b_start, b_start + b.duration_minutes as i64)
        });

    if conflict {
        queries::transition_status(
            &tx,
            &booking.id,
            BookingStatus::Cancelled,
            Some("Slot no longer available at payment confirmation"),
            now,
        )?;
        queries::insert_reconciliation(
            &tx,
            reference,
            &booking.id,
            booking.amount,
            "slot re-sold before payment confirmation — refund required",
        )?;
        tx.commit()?;
        tracing::warn!(
            booking_id = %booking.id,
            reference = %reference,
            "slot conflict at payment confirmation"
        );
        return Err(AppError::SlotTaken);
    }

    queries::transition_status(&tx, &booking.id, BookingStatus::Confirmed, None, now)?;
    let confirmed = queries::get_booking(&tx, &booking.id)?
        .ok_or_else(|| AppError::NotFound(format!("booking {}", booking.id)))?;
    tx.commit()?;

    tracing::info!(booking_id = %confirmed.id, "booking confirmed");
    Ok(ConfirmOutcome::Confirmed(confirmed))
}

/// Release a hold whose payment definitively failed or was abandoned.
pub fn release_hold(
    conn: &Connection,
    booking_id: &str,
    reason: &str,
    now: NaiveDateTime,
) -> Result<(), AppError> {
    queries::transition_status(conn, booking_id, BookingStatus::Cancelled, Some(reason), now)?;
    Ok(())
}

/// Cancel every pending hold whose TTL has lapsed. Run from the periodic
/// sweep; safe to re-run.
pub fn release_expired_holds(conn: &Connection, now: NaiveDateTime) -> anyhow::Result<Vec<String>> {
    let ids = queries::expired_hold_ids(conn, now, None)?;
    for id in &ids {
        queries::transition_status(
            conn,
            id,
            BookingStatus::Cancelled,
            Some("Hold expired before payment"),
            now,
        )?;
    }
    if !ids.is_empty() {
        tracing::info!(count = ids.len(), "released expired holds");
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::{Service, Staff, WeeklySchedule};
    use chrono::{NaiveDate, NaiveTime};
    use std::sync::{Arc, Mutex};

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn seeded_conn() -> Connection {
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
        // Open every day 09:00-17:00 so weekday choice never matters here.
        for dow in 0..7 {
            queries::upsert_schedule_day(
                &conn,
                &WeeklySchedule {
                    staff_id: "staff-1".to_string(),
                    day_of_week: dow,
                    start_time: t("09:00"),
                    end_time: t("17:00"),
                    is_available: true,
                },
            )
            .unwrap();
        }
        conn
    }

    fn input(time: &str) -> BookingInput {
        BookingInput {
            staff_id: "staff-1".to_string(),
            service_id: "cut".to_string(),
            addon_ids: vec![],
            booking_date: d("2030-06-03"),
            booking_time: t(time),
            customer_name: "Ada".to_string(),
            customer_email: "ada@example.com".to_string(),
            customer_phone: "+15551110000".to_string(),
        }
    }

    const NOW: &str = "2030-06-01 12:00";

    #[test]
    fn test_place_hold_creates_pending_booking() {
        let mut conn = seeded_conn();
        let booking = place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.duration_minutes, 30);
        assert_eq!(booking.amount, 5000);
        assert_eq!(booking.hold_expires_at, Some(dt("2030-06-01 12:30")));

        let stored = queries::get_booking(&conn, &booking.id).unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
    }

    #[test]
    fn test_addons_extend_duration_and_price() {
        let mut conn = seeded_conn();
        queries::insert_addon(
            &conn,
            &crate::models::Addon {
                id: "treatment".to_string(),
                name: "Deep Conditioning".to_string(),
                price: 2000,
                duration_minutes: 15,
            },
        )
        .unwrap();

        let mut req = input("14:00");
        req.addon_ids = vec!["treatment".to_string()];
        let booking = place_hold(&mut conn, &req, dt(NOW), 30).unwrap();
        assert_eq!(booking.duration_minutes, 45);
        assert_eq!(booking.amount, 7000);

        // The widened interval now blocks 14:30 starts.
        let err = place_hold(&mut conn, &input("14:30"), dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));

        let mut unknown = input("16:00");
        unknown.addon_ids = vec!["nope".to_string()];
        let err = place_hold(&mut conn, &unknown, dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_same_slot_twice_is_conflict() {
        let mut conn = seeded_conn();
        place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        let err = place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));
    }

    #[test]
    fn test_overlapping_slot_is_conflict() {
        let mut conn = seeded_conn();
        place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        let err = place_hold(&mut conn, &input("14:15"), dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));
        let err = place_hold(&mut conn, &input("13:45"), dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));
    }

    #[test]
    fn test_touching_slots_are_not_conflicts() {
        let mut conn = seeded_conn();
        place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        assert!(place_hold(&mut conn, &input("14:30"), dt(NOW), 30).is_ok());
        assert!(place_hold(&mut conn, &input("13:30"), dt(NOW), 30).is_ok());
    }

    #[test]
    fn test_hold_outside_working_hours_rejected() {
        let mut conn = seeded_conn();
        let err = place_hold(&mut conn, &input("08:00"), dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        // 16:45 + 30min would run past 17:00.
        let err = place_hold(&mut conn, &input("16:45"), dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_hold_in_the_past_rejected() {
        let mut conn = seeded_conn();
        let mut req = input("14:00");
        req.booking_date = d("2030-05-31");
        let err = place_hold(&mut conn, &req, dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_missing_customer_fields_rejected_before_write() {
        let mut conn = seeded_conn();
        let mut req = input("14:00");
        req.customer_email = "  ".to_string();
        let err = place_hold(&mut conn, &req, dt(NOW), 30).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(queries::list_bookings(&conn, None, None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_expired_hold_frees_the_slot() {
        let mut conn = seeded_conn();
        place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        // 31 minutes later the first hold has lapsed; the slot is free again.
        let later = dt("2030-06-01 12:31");
        let second = place_hold(&mut conn, &input("14:00"), later, 30).unwrap();
        assert_eq!(second.status, BookingStatus::Pending);
    }

    #[test]
    fn test_confirm_hold_transitions_to_confirmed() {
        let mut conn = seeded_conn();
        let booking = place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        let outcome = confirm_hold(&mut conn, &booking.payment_reference, dt(NOW)).unwrap();
        let confirmed = outcome.booking();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert!(confirmed.hold_expires_at.is_none());
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let mut conn = seeded_conn();
        let booking = place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        confirm_hold(&mut conn, &booking.payment_reference, dt(NOW)).unwrap();
        let outcome = confirm_hold(&mut conn, &booking.payment_reference, dt(NOW)).unwrap();
        assert!(matches!(outcome, ConfirmOutcome::AlreadyConfirmed(_)));
        assert!(queries::list_reconciliation(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_expired_hold_still_confirms_when_slot_free() {
        let mut conn = seeded_conn();
        let booking = place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        let outcome =
            confirm_hold(&mut conn, &booking.payment_reference, dt("2030-06-01 13:00")).unwrap();
        assert!(matches!(outcome, ConfirmOutcome::Confirmed(_)));
    }

    #[test]
    fn test_resold_slot_at_confirmation_parks_payment() {
        let mut conn = seeded_conn();
        let first = place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        // First hold expires, a second customer takes the slot and pays.
        let later = dt("2030-06-01 12:31");
        let second = place_hold(&mut conn, &input("14:00"), later, 30).unwrap();
        confirm_hold(&mut conn, &second.payment_reference, later).unwrap();

        // The first customer's payment now verifies — too late.
        let err = confirm_hold(&mut conn, &first.payment_reference, later).unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));

        let recon = queries::list_reconciliation(&conn).unwrap();
        assert_eq!(recon.len(), 1);
        assert_eq!(recon[0].payment_reference, first.payment_reference);
        assert_eq!(recon[0].amount, 5000);

        // A retried verification does not add a second refund entry.
        let err = confirm_hold(&mut conn, &first.payment_reference, later).unwrap_err();
        assert!(matches!(err, AppError::SlotTaken));
        assert_eq!(queries::list_reconciliation(&conn).unwrap().len(), 1);

        // The winning booking is untouched.
        let winner = queries::get_booking(&conn, &second.id).unwrap().unwrap();
        assert_eq!(winner.status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_concurrent_holds_exactly_one_wins() {
        let conn = Arc::new(Mutex::new(seeded_conn()));
        let mut handles = vec![];
        for _ in 0..2 {
            let conn = Arc::clone(&conn);
            handles.push(std::thread::spawn(move || {
                let mut guard = conn.lock().unwrap();
                place_hold(&mut guard, &input("14:00"), dt(NOW), 30).is_ok()
            }));
        }
        let results: Vec<bool> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|ok| **ok).count(), 1);

        let conn = conn.lock().unwrap();
        let active = queries::active_bookings(&conn, "staff-1", d("2030-06-03"), dt(NOW)).unwrap();
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn test_ledger_invariant_no_overlapping_active_pairs() {
        let mut conn = seeded_conn();
        for time in ["09:00", "09:15", "09:30", "10:00", "10:45", "11:00"] {
            let _ = place_hold(&mut conn, &input(time), dt(NOW), 30);
        }
        let active = queries::active_bookings(&conn, "staff-1", d("2030-06-03"), dt(NOW)).unwrap();
        for (i, a) in active.iter().enumerate() {
            for b in active.iter().skip(i + 1) {
                let a_start = minute_of_day(a.booking_time);
                let b_start = minute_of_day(b.booking_time);
                assert!(
                    !overlaps(
                        a_start,
                        a_start + a.duration_minutes as i64,
                        b_start,
                        b_start + b.duration_minutes as i64
                    ),
                    "active bookings {} and {} overlap",
                    a.id,
                    b.id
                );
            }
        }
    }

    #[test]
    fn test_release_expired_holds_only_touches_lapsed_ones() {
        let mut conn = seeded_conn();
        let a = place_hold(&mut conn, &input("14:00"), dt(NOW), 30).unwrap();
        let b = place_hold(&mut conn, &input("15:00"), dt("2030-06-01 12:15"), 30).unwrap();

        // At 12:35 only the first hold (expires 12:30) has lapsed.
        let released = release_expired_holds(&conn, dt("2030-06-01 12:35")).unwrap();
        assert_eq!(released, vec![a.id.clone()]);

        let a_row = queries::get_booking(&conn, &a.id).unwrap().unwrap();
        assert_eq!(a_row.status, BookingStatus::Cancelled);
        assert_eq!(
            a_row.cancellation_reason.as_deref(),
            Some("Hold expired before payment")
        );
        assert!(a_row.cancelled_at.is_some());

        let b_row = queries::get_booking(&conn, &b.id).unwrap().unwrap();
        assert_eq!(b_row.status, BookingStatus::Pending);
    }
}
