use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{NaiveDate, NaiveTime, Utc};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, TimeOff, WeeklySchedule};
use crate::services::cascade::{self, CascadeOutcome};
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct BookingsQuery {
    pub status: Option<String>,
    pub date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BookingsQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let bookings = {
        let db = state.db.lock().unwrap();
        queries::list_bookings(
            &db,
            query.status.as_deref(),
            query.date,
            query.limit.unwrap_or(50),
        )?
    };
    Ok(Json(bookings))
}

// POST /api/admin/bookings/:id/cancel
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let updated = {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        if booking.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "booking is already {}",
                booking.status.as_str()
            )));
        }
        queries::transition_status(
            &db,
            &id,
            BookingStatus::Cancelled,
            Some("Cancelled by admin"),
            Utc::now().naive_utc(),
        )?
    };

    Ok(Json(serde_json::json!({ "ok": updated })))
}

// POST /api/admin/bookings/:id/complete
pub async fn complete_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let updated = {
        let db = state.db.lock().unwrap();
        let booking = queries::get_booking(&db, &id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {id}")))?;
        if booking.status != BookingStatus::Confirmed {
            return Err(AppError::Validation(
                "only confirmed bookings can be completed".to_string(),
            ));
        }
        queries::transition_status(
            &db,
            &id,
            BookingStatus::Completed,
            None,
            Utc::now().naive_utc(),
        )?
    };

    Ok(Json(serde_json::json!({ "ok": updated })))
}

// GET /api/admin/schedule/:staff_id
pub async fn get_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(staff_id): Path<String>,
) -> Result<Json<Vec<WeeklySchedule>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let entries = {
        let db = state.db.lock().unwrap();
        queries::get_staff(&db, &staff_id)?
            .ok_or_else(|| AppError::NotFound(format!("staff member {staff_id}")))?;
        queries::get_week_schedule(&db, &staff_id)?
    };
    Ok(Json(entries))
}

// POST /api/admin/schedule/:staff_id
#[derive(Deserialize)]
pub struct ScheduleDayRequest {
    pub day_of_week: u8,
    pub start_time: String,
    pub end_time: String,
    pub is_available: bool,
}

pub async fn update_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(staff_id): Path<String>,
    Json(days): Json<Vec<ScheduleDayRequest>>,
) -> Result<Json<serde_json::Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let mut entries = vec![];
    for day in &days {
        if day.day_of_week > 6 {
            return Err(AppError::Validation(format!(
                "day_of_week must be 0-6, got {}",
                day.day_of_week
            )));
        }
        let start = NaiveTime::parse_from_str(&day.start_time, "%H:%M")
            .map_err(|_| AppError::Validation(format!("invalid start_time: {}", day.start_time)))?;
        let end = NaiveTime::parse_from_str(&day.end_time, "%H:%M")
            .map_err(|_| AppError::Validation(format!("invalid end_time: {}", day.end_time)))?;
        if start >= end {
            return Err(AppError::Validation(
                "start_time must be before end_time".to_string(),
            ));
        }
        entries.push(WeeklySchedule {
            staff_id: staff_id.clone(),
            day_of_week: day.day_of_week,
            start_time: start,
            end_time: end,
            is_available: day.is_available,
        });
    }

    {
        let db = state.db.lock().unwrap();
        queries::get_staff(&db, &staff_id)?
            .ok_or_else(|| AppError::NotFound(format!("staff member {staff_id}")))?;
        for entry in &entries {
            queries::upsert_schedule_day(&db, entry)?;
        }
    }

    Ok(Json(serde_json::json!({ "ok": true, "updated": entries.len() })))
}

// POST /api/admin/time-off
#[derive(Deserialize)]
pub struct TimeOffRequest {
    pub staff_id: String,
    pub date: NaiveDate,
    pub reason: String,
}

pub async fn mark_unavailable(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<TimeOffRequest>,
) -> Result<Json<CascadeOutcome>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if body.reason.trim().is_empty() {
        return Err(AppError::Validation("reason is required".to_string()));
    }

    let outcome = cascade::mark_unavailable(
        &state.db,
        state.sms.as_ref(),
        &body.staff_id,
        body.date,
        body.reason.trim(),
        Utc::now().naive_utc(),
    )
    .await?;

    Ok(Json(outcome))
}

// GET /api/admin/time-off
#[derive(Deserialize)]
pub struct TimeOffQuery {
    pub staff_id: String,
}

pub async fn get_time_off(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TimeOffQuery>,
) -> Result<Json<Vec<TimeOff>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let records = {
        let db = state.db.lock().unwrap();
        queries::list_time_off(&db, &query.staff_id)?
    };
    Ok(Json(records))
}
