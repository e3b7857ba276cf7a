use crate::models::{AppointmentDetails, AppointmentStatus};

const ICS_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Single-event iCalendar document for an appointment.
pub fn generate_ics(details: &AppointmentDetails, calendar_name: &str) -> String {
    let appointment = &details.appointment;
    let dtstart = details.slot.start.format(ICS_FORMAT);
    let dtend = details.slot.end.format(ICS_FORMAT);
    let dtstamp = appointment.created_at.format(ICS_FORMAT);
    let uid = format!("{}@slotbook", appointment.id);
    let status = match appointment.status {
        AppointmentStatus::Active => "CONFIRMED",
        AppointmentStatus::Cancelled => "CANCELLED",
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Slotbook//Booking Assistant//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:Appointment with {calendar_name}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Appointment, Slot, SlotStatus};
    use chrono::NaiveDateTime;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn details(status: AppointmentStatus) -> AppointmentDetails {
        AppointmentDetails {
            appointment: Appointment {
                id: "appt-123".to_string(),
                slot_id: "slot-1".to_string(),
                requester: "conv-1".to_string(),
                created_at: dt("2025-03-10 10:00:00"),
                status,
            },
            slot: Slot {
                id: "slot-1".to_string(),
                start: dt("2025-03-15 14:00:00"),
                end: dt("2025-03-15 14:30:00"),
                status: SlotStatus::Booked,
                holder: Some("conv-1".to_string()),
            },
        }
    }

    #[test]
    fn test_generate_ics() {
        let ics = generate_ics(&details(AppointmentStatus::Active), "Slotbook");
        assert!(ics.starts_with("BEGIN:VCALENDAR\r\n"));
        assert!(ics.contains("UID:appt-123@slotbook"));
        assert!(ics.contains("DTSTAMP:20250310T100000"));
        assert!(ics.contains("DTSTART:20250315T140000"));
        assert!(ics.contains("DTEND:20250315T143000"));
        assert!(ics.contains("SUMMARY:Appointment with Slotbook"));
        assert!(ics.contains("STATUS:CONFIRMED"));
        assert!(ics.ends_with("END:VCALENDAR\r\n"));
    }

    #[test]
    fn test_cancelled_appointment_is_marked() {
        let ics = generate_ics(&details(AppointmentStatus::Cancelled), "Slotbook");
        assert!(ics.contains("STATUS:CANCELLED"));
    }
}
