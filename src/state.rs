use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::notifications::{EmailProvider, SmsProvider};
use crate::services::payments::PaymentProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub payments: Box<dyn PaymentProvider>,
    pub sms: Box<dyn SmsProvider>,
    pub email: Box<dyn EmailProvider>,
}
