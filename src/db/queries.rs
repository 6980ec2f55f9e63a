use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, Connection};

use crate::models::{
    Addon, Booking, BookingStatus, OccupiedInterval, Service, Staff, TimeOff, WeeklySchedule,
};

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_date(d: NaiveDate) -> String {
    d.format(DATE_FMT).to_string()
}

fn fmt_time(t: NaiveTime) -> String {
    t.format(TIME_FMT).to_string()
}

fn fmt_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FMT).to_string()
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, DATE_FMT).unwrap_or_default()
}

fn parse_time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, TIME_FMT).unwrap_or_default()
}

fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .unwrap_or_else(|_| chrono::Utc::now().naive_utc())
}

// ── Staff ──

pub fn insert_staff(conn: &Connection, staff: &Staff) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO staff (id, name, email, phone, is_active) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            staff.id,
            staff.name,
            staff.email,
            staff.phone,
            staff.is_active as i32
        ],
    )?;
    Ok(())
}

pub fn get_staff(conn: &Connection, id: &str) -> anyhow::Result<Option<Staff>> {
    let result = conn.query_row(
        "SELECT id, name, email, phone, is_active FROM staff WHERE id = ?1",
        params![id],
        |row| {
            Ok(Staff {
                id: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                phone: row.get(3)?,
                is_active: row.get::<_, i32>(4)? != 0,
            })
        },
    );

    match result {
        Ok(staff) => Ok(Some(staff)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_staff(conn: &Connection) -> anyhow::Result<Vec<Staff>> {
    let mut stmt = conn
        .prepare("SELECT id, name, email, phone, is_active FROM staff WHERE is_active = 1 ORDER BY name ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(Staff {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            phone: row.get(3)?,
            is_active: row.get::<_, i32>(4)? != 0,
        })
    })?;

    let mut staff = vec![];
    for row in rows {
        staff.push(row?);
    }
    Ok(staff)
}

// ── Weekly Schedule ──

pub fn upsert_schedule_day(conn: &Connection, entry: &WeeklySchedule) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO weekly_schedule (staff_id, day_of_week, start_time, end_time, is_available)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(staff_id, day_of_week) DO UPDATE SET
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           is_available = excluded.is_available,
           updated_at = datetime('now')",
        params![
            entry.staff_id,
            entry.day_of_week,
            fmt_time(entry.start_time),
            fmt_time(entry.end_time),
            entry.is_available as i32,
        ],
    )?;
    Ok(())
}

pub fn get_schedule_day(
    conn: &Connection,
    staff_id: &str,
    day_of_week: u8,
) -> anyhow::Result<Option<WeeklySchedule>> {
    let result = conn.query_row(
        "SELECT staff_id, day_of_week, start_time, end_time, is_available
         FROM weekly_schedule WHERE staff_id = ?1 AND day_of_week = ?2",
        params![staff_id, day_of_week],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, u8>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i32>(4)?,
            ))
        },
    );

    match result {
        Ok((staff_id, day_of_week, start, end, is_available)) => Ok(Some(WeeklySchedule {
            staff_id,
            day_of_week,
            start_time: parse_time(&start),
            end_time: parse_time(&end),
            is_available: is_available != 0,
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_week_schedule(conn: &Connection, staff_id: &str) -> anyhow::Result<Vec<WeeklySchedule>> {
    let mut stmt = conn.prepare(
        "SELECT staff_id, day_of_week, start_time, end_time, is_available
         FROM weekly_schedule WHERE staff_id = ?1 ORDER BY day_of_week ASC",
    )?;
    let rows = stmt.query_map(params![staff_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, u8>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i32>(4)?,
        ))
    })?;

    let mut entries = vec![];
    for row in rows {
        let (staff_id, day_of_week, start, end, is_available) = row?;
        entries.push(WeeklySchedule {
            staff_id,
            day_of_week,
            start_time: parse_time(&start),
            end_time: parse_time(&end),
            is_available: is_available != 0,
        });
    }
    Ok(entries)
}

// ── Time Off ──

/// Returns true when a new record was created; an identical range for the
/// same staff member is ignored.
pub fn insert_time_off(
    conn: &Connection,
    staff_id: &str,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: &str,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO time_off (staff_id, start_date, end_date, reason)
         VALUES (?1, ?2, ?3, ?4)",
        params![staff_id, fmt_date(start_date), fmt_date(end_date), reason],
    )?;
    Ok(count > 0)
}

pub fn time_off_covering(
    conn: &Connection,
    staff_id: &str,
    date: NaiveDate,
) -> anyhow::Result<Option<TimeOff>> {
    let date_str = fmt_date(date);
    let result = conn.query_row(
        "SELECT id, staff_id, start_date, end_date, reason, created_at
         FROM time_off WHERE staff_id = ?1 AND start_date <= ?2 AND end_date >= ?2
         LIMIT 1",
        params![staff_id, date_str],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        },
    );

    match result {
        Ok((id, staff_id, start, end, reason, created_at)) => Ok(Some(TimeOff {
            id,
            staff_id,
            start_date: parse_date(&start),
            end_date: parse_date(&end),
            reason,
            created_at: parse_datetime(&created_at),
        })),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_time_off(conn: &Connection, staff_id: &str) -> anyhow::Result<Vec<TimeOff>> {
    let mut stmt = conn.prepare(
        "SELECT id, staff_id, start_date, end_date, reason, created_at
         FROM time_off WHERE staff_id = ?1 ORDER BY start_date DESC",
    )?;
    let rows = stmt.query_map(params![staff_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut records = vec![];
    for row in rows {
        let (id, staff_id, start, end, reason, created_at) = row?;
        records.push(TimeOff {
            id,
            staff_id,
            start_date: parse_date(&start),
            end_date: parse_date(&end),
            reason,
            created_at: parse_datetime(&created_at),
        });
    }
    Ok(records)
}

// ── Services & Addons ──

pub fn insert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, name, price, duration_minutes, category)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            service.id,
            service.name,
            service.price,
            service.duration_minutes,
            service.category
        ],
    )?;
    Ok(())
}

pub fn get_service(conn: &Connection, id: &str) -> anyhow::Result<Option<Service>> {
    let result = conn.query_row(
        "SELECT id, name, price, duration_minutes, category FROM services WHERE id = ?1",
        params![id],
        |row| {
            Ok(Service {
                id: row.get(0)?,
                name: row.get(1)?,
                price: row.get(2)?,
                duration_minutes: row.get(3)?,
                category: row.get(4)?,
            })
        },
    );

    match result {
        Ok(service) => Ok(Some(service)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, price, duration_minutes, category FROM services ORDER BY name ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(Service {
            id: row.get(0)?,
            name: row.get(1)?,
            price: row.get(2)?,
            duration_minutes: row.get(3)?,
            category: row.get(4)?,
        })
    })?;

    let mut services = vec![];
    for row in rows {
        services.push(row?);
    }
    Ok(services)
}

pub fn insert_addon(conn: &Connection, addon: &Addon) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO addons (id, name, price, duration_minutes) VALUES (?1, ?2, ?3, ?4)",
        params![addon.id, addon.name, addon.price, addon.duration_minutes],
    )?;
    Ok(())
}

pub fn get_addon(conn: &Connection, id: &str) -> anyhow::Result<Option<Addon>> {
    let result = conn.query_row(
        "SELECT id, name, price, duration_minutes FROM addons WHERE id = ?1",
        params![id],
        |row| {
            Ok(Addon {
                id: row.get(0)?,
                name: row.get(1)?,
                price: row.get(2)?,
                duration_minutes: row.get(3)?,
            })
        },
    );

    match result {
        Ok(addon) => Ok(Some(addon)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Bookings ──

pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO bookings (id, staff_id, service_id, addon_ids, booking_date, booking_time,
            duration_minutes, status, customer_name, customer_email, customer_phone,
            payment_reference, amount, hold_expires_at, reminder_sent, cancelled_at,
            cancellation_reason, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            booking.id,
            booking.staff_id,
            booking.service_id,
            serde_json::to_string(&booking.addon_ids)?,
            fmt_date(booking.booking_date),
            fmt_time(booking.booking_time),
            booking.duration_minutes,
            booking.status.as_str(),
            booking.customer_name,
            booking.customer_email,
            booking.customer_phone,
            booking.payment_reference,
            booking.amount,
            booking.hold_expires_at.map(fmt_datetime),
            booking.reminder_sent as i32,
            booking.cancelled_at.map(fmt_datetime),
            booking.cancellation_reason,
            fmt_datetime(booking.created_at),
            fmt_datetime(booking.updated_at),
        ],
    )?;
    Ok(())
}

const BOOKING_COLUMNS: &str = "id, staff_id, service_id, addon_ids, booking_date, booking_time, \
    duration_minutes, status, customer_name, customer_email, customer_phone, payment_reference, \
    amount, hold_expires_at, reminder_sent, cancelled_at, cancellation_reason, created_at, updated_at";

fn parse_booking_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let addon_ids_json: String = row.get(3)?;
    let date_str: String = row.get(4)?;
    let time_str: String = row.get(5)?;
    let status_str: String = row.get(7)?;
    let hold_expires_at: Option<String> = row.get(13)?;
    let cancelled_at: Option<String> = row.get(15)?;
    let created_at_str: String = row.get(17)?;
    let updated_at_str: String = row.get(18)?;

    Ok(Booking {
        id: row.get(0)?,
        staff_id: row.get(1)?,
        service_id: row.get(2)?,
        addon_ids: serde_json::from_str(&addon_ids_json).unwrap_or_default(),
        booking_date: parse_date(&date_str),
        booking_time: parse_time(&time_str),
        duration_minutes: row.get(6)?,
        status: BookingStatus::parse(&status_str),
        customer_name: row.get(8)?,
        customer_email: row.get(9)?,
        customer_phone: row.get(10)?,
        payment_reference: row.get(11)?,
        amount: row.get(12)?,
        hold_expires_at: hold_expires_at.as_deref().map(parse_datetime),
        reminder_sent: row.get::<_, i32>(14)? != 0,
        cancelled_at: cancelled_at.as_deref().map(parse_datetime),
        cancellation_reason: row.get(16)?,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

pub fn get_booking(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_reference(
    conn: &Connection,
    reference: &str,
) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE payment_reference = ?1"),
        params![reference],
        |row| Ok(parse_booking_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// A booking occupies its slot while confirmed, or while a pending hold is
// unexpired.
const ACTIVE_PREDICATE: &str =
    "(status = 'confirmed' OR (status = 'pending' AND hold_expires_at > ?3))";

/// Occupied intervals for one staff member on one date, ascending by start
/// time. Pending + confirmed only; expired holds are invisible.
pub fn active_intervals(
    conn: &Connection,
    staff_id: &str,
    date: NaiveDate,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<OccupiedInterval>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT booking_time, duration_minutes FROM bookings
         WHERE staff_id = ?1 AND booking_date = ?2 AND {ACTIVE_PREDICATE}
         ORDER BY booking_time ASC"
    ))?;
    let rows = stmt.query_map(
        params![staff_id, fmt_date(date), fmt_datetime(now)],
        |row| {
            let time_str: String = row.get(0)?;
            let duration: i32 = row.get(1)?;
            Ok((time_str, duration))
        },
    )?;

    let mut intervals = vec![];
    for row in rows {
        let (time_str, duration) = row?;
        let start = parse_time(&time_str);
        let end = start + chrono::Duration::minutes(duration as i64);
        intervals.push(OccupiedInterval { start, end });
    }
    Ok(intervals)
}

pub fn active_bookings(
    conn: &Connection,
    staff_id: &str,
    date: NaiveDate,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE staff_id = ?1 AND booking_date = ?2 AND {ACTIVE_PREDICATE}
         ORDER BY booking_time ASC"
    ))?;
    let rows = stmt.query_map(
        params![staff_id, fmt_date(date), fmt_datetime(now)],
        |row| Ok(parse_booking_row(row)),
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Apply a status transition. A transition to cancelled always records
/// cancelled_at and cancellation_reason; a transition to confirmed clears
/// the hold TTL.
pub fn transition_status(
    conn: &Connection,
    id: &str,
    new_status: BookingStatus,
    reason: Option<&str>,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let now_str = fmt_datetime(now);
    let count = match new_status {
        BookingStatus::Cancelled => conn.execute(
            "UPDATE bookings SET status = 'cancelled', cancelled_at = ?1,
                cancellation_reason = ?2, updated_at = ?1 WHERE id = ?3",
            params![now_str, reason.unwrap_or("Cancelled"), id],
        )?,
        BookingStatus::Confirmed => conn.execute(
            "UPDATE bookings SET status = 'confirmed', hold_expires_at = NULL,
                updated_at = ?1 WHERE id = ?2",
            params![now_str, id],
        )?,
        other => conn.execute(
            "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![other.as_str(), now_str, id],
        )?,
    };
    Ok(count > 0)
}

pub fn list_bookings(
    conn: &Connection,
    status_filter: Option<&str>,
    date_filter: Option<NaiveDate>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(status) = status_filter {
        params_vec.push(Box::new(status.to_string()));
        sql.push_str(&format!(" AND status = ?{}", params_vec.len()));
    }
    if let Some(date) = date_filter {
        params_vec.push(Box::new(fmt_date(date)));
        sql.push_str(&format!(" AND booking_date = ?{}", params_vec.len()));
    }
    params_vec.push(Box::new(limit));
    sql.push_str(&format!(
        " ORDER BY booking_date DESC, booking_time DESC LIMIT ?{}",
        params_vec.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Confirmed bookings on `date` that have not yet received a reminder.
pub fn unreminded_confirmed_on(conn: &Connection, date: NaiveDate) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE booking_date = ?1 AND status = 'confirmed' AND reminder_sent = 0
         ORDER BY booking_time ASC"
    ))?;
    let rows = stmt.query_map(params![fmt_date(date)], |row| Ok(parse_booking_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

pub fn mark_reminder_sent(conn: &Connection, id: &str, now: NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET reminder_sent = 1, updated_at = ?1 WHERE id = ?2",
        params![fmt_datetime(now), id],
    )?;
    Ok(count > 0)
}

/// Pending holds whose TTL has lapsed, optionally scoped to one staff/date.
pub fn expired_hold_ids(
    conn: &Connection,
    now: NaiveDateTime,
    scope: Option<(&str, NaiveDate)>,
) -> anyhow::Result<Vec<String>> {
    let now_str = fmt_datetime(now);
    let mut ids = vec![];

    match scope {
        Some((staff_id, date)) => {
            let mut stmt = conn.prepare(
                "SELECT id FROM bookings
                 WHERE status = 'pending' AND hold_expires_at <= ?1
                   AND staff_id = ?2 AND booking_date = ?3",
            )?;
            let rows = stmt.query_map(params![now_str, staff_id, fmt_date(date)], |row| {
                row.get::<_, String>(0)
            })?;
            for row in rows {
                ids.push(row?);
            }
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT id FROM bookings WHERE status = 'pending' AND hold_expires_at <= ?1")?;
            let rows = stmt.query_map(params![now_str], |row| row.get::<_, String>(0))?;
            for row in rows {
                ids.push(row?);
            }
        }
    }
    Ok(ids)
}

// ── Payment Reconciliation ──

#[derive(Debug, Clone)]
pub struct ReconciliationRow {
    pub id: i64,
    pub payment_reference: String,
    pub booking_id: String,
    pub amount: i64,
    pub reason: String,
}

pub fn reconciliation_exists(conn: &Connection, payment_reference: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM payment_reconciliation WHERE payment_reference = ?1",
        params![payment_reference],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Record a captured payment that could not be converted into a committed
/// booking; these rows feed the manual refund queue. At most one row per
/// payment reference, so webhook retries do not inflate the refund queue.
pub fn insert_reconciliation(
    conn: &Connection,
    payment_reference: &str,
    booking_id: &str,
    amount: i64,
    reason: &str,
) -> anyhow::Result<()> {
    if reconciliation_exists(conn, payment_reference)? {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO payment_reconciliation (payment_reference, booking_id, amount, reason)
         VALUES (?1, ?2, ?3, ?4)",
        params![payment_reference, booking_id, amount, reason],
    )?;
    Ok(())
}

pub fn list_reconciliation(conn: &Connection) -> anyhow::Result<Vec<ReconciliationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, payment_reference, booking_id, amount, reason
         FROM payment_reconciliation ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ReconciliationRow {
            id: row.get(0)?,
            payment_reference: row.get(1)?,
            booking_id: row.get(2)?,
            amount: row.get(3)?,
            reason: row.get(4)?,
        })
    })?;

    let mut records = vec![];
    for row in rows {
        records.push(row?);
    }
    Ok(records)
}
