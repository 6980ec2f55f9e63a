use chrono::Duration;

use crate::models::Booking;

pub fn generate_ics(booking: &Booking, service_name: &str, salon_name: &str) -> String {
    let start = booking.booking_date.and_time(booking.booking_time);
    let dtstart = start.format("%Y%m%dT%H%M%S").to_string();
    let dtend = (start + Duration::minutes(booking.duration_minutes as i64))
        .format("%Y%m%dT%H%M%S")
        .to_string();
    let dtstamp = booking.created_at.format("%Y%m%dT%H%M%S").to_string();
    let uid = format!("{}@salonbook", booking.id);

    let summary = format!("{service_name} at {salon_name}");
    let description = format!("Booked for {}", booking.customer_name);

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Salonbook//Booking//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}
