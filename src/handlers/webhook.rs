use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;

use crate::errors::AppError;
use crate::handlers::bookings::verify_and_confirm;
use crate::state::AppState;

#[derive(Deserialize)]
struct PaystackEvent {
    event: String,
    data: PaystackEventData,
}

#[derive(Deserialize)]
struct PaystackEventData {
    reference: String,
}

fn validate_signature(secret_key: &str, signature: &str, body: &[u8]) -> bool {
    let mut mac = match Hmac::<Sha512>::new_from_slice(secret_key.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    expected == signature.to_lowercase()
}

// POST /webhook/paystack
//
// Paystack retries webhooks until it sees a 2xx, and the confirm path is
// idempotent, so a repeated charge.success delivery is harmless.
pub async fn paystack_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Validate the signature (skip if the secret key is empty — dev mode).
    if !state.config.paystack_secret_key.is_empty() {
        let signature = headers
            .get("x-paystack-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty()
            || !validate_signature(&state.config.paystack_secret_key, signature, &body)
        {
            tracing::warn!("rejected webhook with missing or invalid signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let event: PaystackEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable webhook payload");
            return (StatusCode::BAD_REQUEST, "Bad payload").into_response();
        }
    };

    if event.event == "charge.success" {
        let reference = event.data.reference;
        tracing::info!(reference = %reference, "webhook charge.success");

        match verify_and_confirm(&state, &reference).await {
            Ok(outcome) => {
                tracing::info!(reference = %reference, status = outcome.status, "webhook processed");
            }
            Err(AppError::SlotTaken) => {
                // Already parked in the reconciliation queue by the guard.
                tracing::warn!(reference = %reference, "webhook payment hit a sold slot");
            }
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "webhook processing failed");
            }
        }
    }

    (StatusCode::OK, "ok").into_response()
}
