use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{day_of_week, EffectiveWindow, OccupiedInterval, Slot};

pub const DEFAULT_GRANULARITY_MINUTES: i32 = 15;

/// Resolve one staff member's open window on one date.
///
/// Time-off wins over the weekly schedule: any record covering the date
/// closes the day outright. Otherwise the weekly entry for that weekday
/// applies; a missing or unavailable entry means closed.
pub fn effective_window(
    conn: &Connection,
    staff_id: &str,
    date: NaiveDate,
) -> anyhow::Result<EffectiveWindow> {
    if queries::time_off_covering(conn, staff_id, date)?.is_some() {
        return Ok(EffectiveWindow::Closed);
    }

    match queries::get_schedule_day(conn, staff_id, day_of_week(date))? {
        Some(entry) if entry.is_available => Ok(EffectiveWindow::Open {
            start: entry.start_time,
            end: entry.end_time,
        }),
        _ => Ok(EffectiveWindow::Closed),
    }
}

fn minute_of_day(t: NaiveTime) -> i32 {
    (t.hour() * 60 + t.minute()) as i32
}

fn time_at(minute: i32) -> NaiveTime {
    NaiveTime::from_hms_opt((minute / 60) as u32, (minute % 60) as u32, 0)
        .unwrap_or(NaiveTime::MIN)
}

/// Walk candidate start times through the window and keep the ones whose
/// half-open interval fits without touching an occupied one. Boundaries
/// that merely touch are not conflicts. An empty result is a valid answer
/// meaning closed or fully booked, never an error.
pub fn compute_slots(
    window: &EffectiveWindow,
    occupied: &[OccupiedInterval],
    duration_minutes: i32,
    granularity_minutes: i32,
    cutoff: Option<NaiveTime>,
) -> Vec<Slot> {
    let (start, end) = match window {
        EffectiveWindow::Closed => return vec![],
        EffectiveWindow::Open { start, end } => (minute_of_day(*start), minute_of_day(*end)),
    };

    if duration_minutes <= 0 || granularity_minutes <= 0 || start + duration_minutes > end {
        return vec![];
    }

    let cutoff = cutoff.map(minute_of_day);
    let mut slots = vec![];
    let mut candidate = start;

    while candidate + duration_minutes <= end {
        let candidate_end = candidate + duration_minutes;
        let past = cutoff.map(|c| candidate <= c).unwrap_or(false);
        let conflicts = occupied.iter().any(|occ| {
            candidate < minute_of_day(occ.end) && candidate_end > minute_of_day(occ.start)
        });

        if !past && !conflicts {
            slots.push(Slot {
                start_time: time_at(candidate),
                end_time: time_at(candidate_end),
            });
        }
        candidate += granularity_minutes;
    }

    slots
}

/// Full availability lookup: effective window, occupied intervals from the
/// ledger, then the candidate walk. Same-day requests discard start times
/// at or before the current wall clock.
pub fn available_slots(
    conn: &Connection,
    staff_id: &str,
    date: NaiveDate,
    duration_minutes: i32,
    now: NaiveDateTime,
) -> anyhow::Result<Vec<Slot>> {
    let window = effective_window(conn, staff_id, date)?;
    if !window.is_open() {
        return Ok(vec![]);
    }

    let occupied = queries::active_intervals(conn, staff_id, date, now)?;
    let cutoff = (date == now.date()).then(|| now.time());

    Ok(compute_slots(
        &window,
        &occupied,
        duration_minutes,
        DEFAULT_GRANULARITY_MINUTES,
        cutoff,
    ))
}
