use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;

use crate::errors::AppError;
use crate::services::reminders::{self, SweepOutcome};
use crate::state::AppState;

// POST /api/cron/reminders
//
// Externally triggered sweep; idempotent, so an over-eager scheduler that
// fires twice does no harm.
pub async fn run_reminders(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SweepOutcome>, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if auth.strip_prefix("Bearer ").unwrap_or("") != state.config.cron_secret {
        return Err(AppError::Unauthorized);
    }

    let outcome = reminders::run_sweep(
        &state.db,
        state.sms.as_ref(),
        state.email.as_ref(),
        &state.config.salon_name,
        Utc::now().naive_utc(),
    )
    .await?;

    Ok(Json(outcome))
}
