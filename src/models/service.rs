use serde::{Deserialize, Serialize};

/// Immutable reference data; prices are in minor currency units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub duration_minutes: i32,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Addon {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub duration_minutes: i32,
}
