use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::Slot;
use crate::services::availability;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub staff_id: String,
    pub date: String,
    pub service_id: String,
    /// Comma-separated addon ids.
    pub addon_ids: Option<String>,
}

#[derive(Serialize)]
pub struct AvailabilityResponse {
    pub staff_id: String,
    pub date: NaiveDate,
    pub duration_minutes: i32,
    pub slots: Vec<Slot>,
}

// GET /api/availability
pub async fn get_availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {}", query.date)))?;

    let addon_ids: Vec<String> = query
        .addon_ids
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let now = Utc::now().naive_utc();

    let (duration_minutes, slots) = {
        let db = state.db.lock().unwrap();

        queries::get_staff(&db, &query.staff_id)?
            .filter(|s| s.is_active)
            .ok_or_else(|| AppError::NotFound(format!("staff member {}", query.staff_id)))?;

        let service = queries::get_service(&db, &query.service_id)?
            .ok_or_else(|| AppError::NotFound(format!("service {}", query.service_id)))?;

        let mut duration = service.duration_minutes;
        for addon_id in &addon_ids {
            let addon = queries::get_addon(&db, addon_id)?
                .ok_or_else(|| AppError::NotFound(format!("addon {addon_id}")))?;
            duration += addon.duration_minutes;
        }

        let slots = availability::available_slots(&db, &query.staff_id, date, duration, now)?;
        (duration, slots)
    };

    Ok(Json(AvailabilityResponse {
        staff_id: query.staff_id,
        date,
        duration_minutes,
        slots,
    }))
}
