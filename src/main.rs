use std::sync::{Arc, Mutex};

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use salonbook::config::AppConfig;
use salonbook::db;
use salonbook::handlers;
use salonbook::services::notifications::email::HttpEmailProvider;
use salonbook::services::notifications::twilio::TwilioSmsProvider;
use salonbook::services::payments::paystack::PaystackProvider;
use salonbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    let payments = PaystackProvider::new(config.paystack_secret_key.clone());
    let sms = TwilioSmsProvider::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_phone_number.clone(),
    );
    let email = HttpEmailProvider::new(config.email_api_key.clone(), config.email_from.clone());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        payments: Box::new(payments),
        sms: Box::new(sms),
        email: Box::new(email),
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/services", get(handlers::catalog::get_services))
        .route("/api/staff", get(handlers::catalog::get_staff))
        .route(
            "/api/availability",
            get(handlers::availability::get_availability),
        )
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route(
            "/api/bookings/verify",
            get(handlers::bookings::verify_booking),
        )
        .route("/webhook/paystack", post(handlers::webhook::paystack_webhook))
        .route(
            "/calendar/:booking_id",
            get(handlers::calendar::download_ics),
        )
        .route("/api/admin/bookings", get(handlers::admin::get_bookings))
        .route(
            "/api/admin/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .route(
            "/api/admin/bookings/:id/complete",
            post(handlers::admin::complete_booking),
        )
        .route(
            "/api/admin/schedule/:staff_id",
            get(handlers::admin::get_schedule).post(handlers::admin::update_schedule),
        )
        .route(
            "/api/admin/time-off",
            get(handlers::admin::get_time_off).post(handlers::admin::mark_unavailable),
        )
        .route("/api/cron/reminders", post(handlers::cron::run_reminders))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
