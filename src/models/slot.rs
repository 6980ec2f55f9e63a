use chrono::NaiveTime;
use serde::Serialize;

/// A bookable start/end pair, computed per request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

/// The time range covered by an existing active booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupiedInterval {
    pub start: NaiveTime,
    pub end: NaiveTime,
}
