use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Service, Staff};
use crate::state::AppState;

// GET /api/services
pub async fn get_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Service>>, AppError> {
    let services = {
        let db = state.db.lock().unwrap();
        queries::list_services(&db)?
    };
    Ok(Json(services))
}

// GET /api/staff
pub async fn get_staff(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Staff>>, AppError> {
    let staff = {
        let db = state.db.lock().unwrap();
        queries::list_staff(&db)?
    };
    Ok(Json(staff))
}
