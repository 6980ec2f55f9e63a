pub mod booking;
pub mod schedule;
pub mod service;
pub mod slot;
pub mod staff;
pub mod time_off;

pub use booking::{Booking, BookingInput, BookingStatus};
pub use schedule::{day_of_week, EffectiveWindow, WeeklySchedule};
pub use service::{Addon, Service};
pub use slot::{OccupiedInterval, Slot};
pub use staff::Staff;
pub use time_off::TimeOff;
