use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{BookingInput, BookingStatus};
use crate::services::booking::{self, ConfirmOutcome};
use crate::state::AppState;

#[derive(Serialize)]
pub struct CreateBookingResponse {
    pub booking_id: String,
    pub reference: String,
    pub authorization_url: String,
    pub amount: i64,
    pub hold_expires_at: Option<NaiveDateTime>,
}

// POST /api/bookings
//
// Phase 1 of the booking flow: reserve a hold on the slot, then hand the
// customer a payment authorization URL. The hold is released again if
// payment cannot even be initialized.
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(input): Json<BookingInput>,
) -> Result<Json<CreateBookingResponse>, AppError> {
    let now = Utc::now().naive_utc();

    let held = {
        let mut db = state.db.lock().unwrap();
        booking::place_hold(&mut db, &input, now, state.config.hold_ttl_minutes)?
    };

    let metadata = serde_json::json!({
        "booking_id": held.id,
        "staff_id": held.staff_id,
        "booking_date": held.booking_date,
        "booking_time": held.booking_time,
    });

    let initialized = match state
        .payments
        .initialize(
            &held.customer_email,
            held.amount,
            &held.payment_reference,
            metadata,
        )
        .await
    {
        Ok(init) => init,
        Err(e) => {
            tracing::error!(booking_id = %held.id, error = %e, "payment initialization failed");
            let db = state.db.lock().unwrap();
            booking::release_hold(&db, &held.id, "Payment initialization failed", now)?;
            return Err(AppError::Payment(
                "could not start payment — please try again".to_string(),
            ));
        }
    };

    Ok(Json(CreateBookingResponse {
        booking_id: held.id,
        reference: initialized.reference,
        authorization_url: initialized.authorization_url,
        amount: held.amount,
        hold_expires_at: held.hold_expires_at,
    }))
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    pub reference: String,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub status: &'static str,
    pub booking_id: Option<String>,
}

// GET /api/bookings/verify
//
// Phase 2: the customer lands back here after checkout (the Paystack
// webhook drives the same path). Only a verified-successful charge can
// confirm the hold.
pub async fn verify_booking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<Json<VerifyResponse>, AppError> {
    verify_and_confirm(&state, &query.reference).await.map(Json)
}

pub async fn verify_and_confirm(
    state: &AppState,
    reference: &str,
) -> Result<VerifyResponse, AppError> {
    let now = Utc::now().naive_utc();

    let held = {
        let db = state.db.lock().unwrap();
        queries::get_booking_by_reference(&db, reference)?
            .ok_or_else(|| AppError::NotFound(format!("payment reference {reference}")))?
    };

    let verification = state
        .payments
        .verify(reference)
        .await
        .map_err(|e| AppError::Payment(e.to_string()))?;

    if !verification.success {
        if verification.gateway_status == "failed" {
            // Only a live hold can be released; a stale "failed" lookup must
            // never undo a booking that already confirmed.
            if held.status == BookingStatus::Pending {
                let db = state.db.lock().unwrap();
                booking::release_hold(&db, &held.id, "Payment not completed", now)?;
            }
            return Ok(VerifyResponse {
                status: "payment_failed",
                booking_id: None,
            });
        }
        // Abandoned or still processing; the hold simply runs out its TTL.
        return Ok(VerifyResponse {
            status: "payment_pending",
            booking_id: None,
        });
    }

    if verification.amount < held.amount {
        tracing::warn!(
            booking_id = %held.id,
            expected = held.amount,
            settled = verification.amount,
            "settled amount below booking total"
        );
        return Err(AppError::Payment(
            "settled amount does not cover the booking".to_string(),
        ));
    }

    let outcome = {
        let mut db = state.db.lock().unwrap();
        booking::confirm_hold(&mut db, reference, now)?
    };

    let status = match &outcome {
        ConfirmOutcome::Confirmed(_) => "confirmed",
        ConfirmOutcome::AlreadyConfirmed(_) => "already_confirmed",
    };
    Ok(VerifyResponse {
        status,
        booking_id: Some(outcome.booking().id.clone()),
    })
}
