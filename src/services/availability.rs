use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc, Weekday};
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::BookingError;
use crate::models::{Appointment, AppointmentDetails, AppointmentStatus, Slot, SlotStatus, TimeRange};

/// Owns slot and appointment lifecycle. Every status change goes through
/// a single conditional update, so concurrent callers see exactly one
/// winner per slot.
pub struct AvailabilityStore {
    db: Arc<Mutex<Connection>>,
}

impl AvailabilityStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, BookingError> {
        self.db.lock().map_err(|_| BookingError::LockPoisoned)
    }

    /// Free slots overlapping `range`, earliest first.
    pub fn query_available(&self, range: &TimeRange) -> Result<Vec<Slot>, BookingError> {
        if range.is_empty() {
            return Err(BookingError::InvalidRange {
                start: range.start,
                end: range.end,
            });
        }
        let db = self.conn()?;
        Ok(queries::free_slots_in_range(&db, &range.start, &range.end)?)
    }

    pub fn hold(&self, slot_id: &str, owner: &str) -> Result<Slot, BookingError> {
        let db = self.conn()?;
        let now = Utc::now().naive_utc();
        let changed = queries::hold_slot(&db, slot_id, owner, &now)?;

        match queries::get_slot(&db, slot_id)? {
            Some(slot) if changed == 1 => {
                tracing::debug!(slot_id, owner, "slot held");
                Ok(slot)
            }
            Some(_) => Err(BookingError::SlotUnavailable(slot_id.to_string())),
            None => Err(BookingError::NotFound(format!("slot {slot_id}"))),
        }
    }

    pub fn confirm(&self, slot_id: &str, requester: &str) -> Result<Appointment, BookingError> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        if queries::book_slot(&tx, slot_id, requester)? == 0 {
            return match queries::get_slot(&tx, slot_id)? {
                Some(_) => Err(BookingError::NotHeld(slot_id.to_string())),
                None => Err(BookingError::NotFound(format!("slot {slot_id}"))),
            };
        }

        let appointment = Appointment {
            id: uuid::Uuid::new_v4().to_string(),
            slot_id: slot_id.to_string(),
            requester: requester.to_string(),
            created_at: Utc::now().naive_utc(),
            status: AppointmentStatus::Active,
        };
        queries::insert_appointment(&tx, &appointment)?;
        tx.commit()?;

        tracing::info!(slot_id, appointment_id = %appointment.id, "appointment booked");
        Ok(appointment)
    }

    /// Held → Free for the owning conversation. Already-free slots are a no-op.
    pub fn release(&self, slot_id: &str, owner: &str) -> Result<(), BookingError> {
        let db = self.conn()?;
        if queries::release_slot(&db, slot_id, owner)? == 1 {
            tracing::debug!(slot_id, owner, "hold released");
            return Ok(());
        }

        match queries::get_slot(&db, slot_id)? {
            Some(slot) if slot.status == SlotStatus::Free => Ok(()),
            Some(_) => Err(BookingError::NotHeld(slot_id.to_string())),
            None => Err(BookingError::NotFound(format!("slot {slot_id}"))),
        }
    }

    pub fn cancel(&self, appointment_id: &str) -> Result<Appointment, BookingError> {
        let mut db = self.conn()?;
        let tx = db.transaction()?;

        let mut appointment = queries::get_appointment(&tx, appointment_id)?
            .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))?;

        if appointment.status == AppointmentStatus::Cancelled {
            return Ok(appointment);
        }

        queries::update_appointment_status(&tx, appointment_id, AppointmentStatus::Cancelled)?;
        queries::free_booked_slot(&tx, &appointment.slot_id)?;
        tx.commit()?;

        tracing::info!(appointment_id, slot_id = %appointment.slot_id, "appointment cancelled");
        appointment.status = AppointmentStatus::Cancelled;
        Ok(appointment)
    }

    pub fn add_slot(&self, start: NaiveDateTime, end: NaiveDateTime) -> Result<Slot, BookingError> {
        if start >= end {
            return Err(BookingError::InvalidRange { start, end });
        }
        let db = self.conn()?;
        if let Some(existing) = queries::overlapping_slots(&db, &start, &end)?.first() {
            return Err(BookingError::Conflict(existing.id.clone()));
        }

        let slot = Slot {
            id: uuid::Uuid::new_v4().to_string(),
            start,
            end,
            status: SlotStatus::Free,
            holder: None,
        };
        queries::insert_slot(&db, &slot)?;
        Ok(slot)
    }

    pub fn get(&self, slot_id: &str) -> Result<Option<Slot>, BookingError> {
        let db = self.conn()?;
        Ok(queries::get_slot(&db, slot_id)?)
    }

    pub fn appointment(&self, appointment_id: &str) -> Result<AppointmentDetails, BookingError> {
        let db = self.conn()?;
        queries::get_appointment_details(&db, appointment_id)?
            .ok_or_else(|| BookingError::NotFound(format!("appointment {appointment_id}")))
    }

    pub fn list_appointments(&self) -> Result<Vec<AppointmentDetails>, BookingError> {
        let db = self.conn()?;
        Ok(queries::list_appointment_details(&db)?)
    }

    /// Hold-expiry hook. Nothing in the dialog flow calls this; the host
    /// decides whether and how often holds time out.
    pub fn release_expired_holds(&self, cutoff: &NaiveDateTime) -> Result<usize, BookingError> {
        let db = self.conn()?;
        let released = queries::release_holds_before(&db, cutoff)?;
        if released > 0 {
            tracing::info!(released, "released expired holds");
        }
        Ok(released)
    }
}

/// Weekday business-hours calendar, `slot_minutes` apart, for `days`
/// calendar days starting at `from`. Slots that would overlap an
/// existing one are skipped, so reseeding is harmless.
pub fn seed_business_hours(
    store: &AvailabilityStore,
    from: NaiveDate,
    days: u32,
    open_hour: u32,
    close_hour: u32,
    slot_minutes: i64,
) -> Result<usize, BookingError> {
    if slot_minutes <= 0 {
        return Ok(0);
    }

    let mut created = 0;
    for offset in 0..days {
        let date = from + Duration::days(offset as i64);
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            continue;
        }
        let (Some(open), Some(close)) = (
            date.and_hms_opt(open_hour, 0, 0),
            date.and_hms_opt(close_hour, 0, 0),
        ) else {
            continue;
        };

        let mut start = open;
        while start + Duration::minutes(slot_minutes) <= close {
            let end = start + Duration::minutes(slot_minutes);
            match store.add_slot(start, end) {
                Ok(_) => created += 1,
                Err(BookingError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
            start = end;
        }
    }

    tracing::info!(created, days, "seeded business-hours slots");
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn store() -> AvailabilityStore {
        let conn = db::init_db(":memory:").unwrap();
        AvailabilityStore::new(Arc::new(Mutex::new(conn)))
    }

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn range(start: &str, end: &str) -> TimeRange {
        TimeRange::new(dt(start), dt(end))
    }

    #[test]
    fn test_query_returns_single_overlapping_slot() {
        let store = store();
        let slot = store
            .add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 09:30"))
            .unwrap();

        let found = store
            .query_available(&range("2025-06-16 09:00", "2025-06-16 10:00"))
            .unwrap();
        assert_eq!(found, vec![slot]);
    }

    #[test]
    fn test_query_orders_by_start_and_skips_non_free() {
        let store = store();
        let late = store.add_slot(dt("2025-06-16 11:00"), dt("2025-06-16 12:00")).unwrap();
        let early = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();
        let held = store.add_slot(dt("2025-06-16 10:00"), dt("2025-06-16 11:00")).unwrap();
        store.hold(&held.id, "conv-a").unwrap();

        let found = store
            .query_available(&range("2025-06-16 08:00", "2025-06-16 18:00"))
            .unwrap();
        let ids: Vec<_> = found.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, vec![early.id, late.id]);
    }

    #[test]
    fn test_query_empty_range_is_error() {
        let store = store();
        let result = store.query_available(&range("2025-06-16 10:00", "2025-06-16 10:00"));
        assert!(matches!(result, Err(BookingError::InvalidRange { .. })));
    }

    #[test]
    fn test_add_overlapping_slot_conflicts() {
        let store = store();
        store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();
        let result = store.add_slot(dt("2025-06-16 09:30"), dt("2025-06-16 10:30"));
        assert!(matches!(result, Err(BookingError::Conflict(_))));
        // Adjacent is fine
        assert!(store.add_slot(dt("2025-06-16 10:00"), dt("2025-06-16 10:30")).is_ok());
    }

    #[test]
    fn test_add_slot_rejects_inverted_range() {
        let store = store();
        let result = store.add_slot(dt("2025-06-16 10:00"), dt("2025-06-16 09:00"));
        assert!(matches!(result, Err(BookingError::InvalidRange { .. })));
    }

    #[test]
    fn test_double_hold_fails() {
        let store = store();
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();

        let held = store.hold(&slot.id, "conv-a").unwrap();
        assert_eq!(held.status, SlotStatus::Held);
        assert_eq!(held.holder.as_deref(), Some("conv-a"));

        assert!(matches!(
            store.hold(&slot.id, "conv-b"),
            Err(BookingError::SlotUnavailable(_))
        ));
        assert!(matches!(
            store.hold(&slot.id, "conv-a"),
            Err(BookingError::SlotUnavailable(_))
        ));
    }

    #[test]
    fn test_hold_unknown_slot_not_found() {
        let store = store();
        assert!(matches!(
            store.hold("missing", "conv-a"),
            Err(BookingError::NotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_holds_have_one_winner() {
        let store = Arc::new(store());
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                let slot_id = slot.id.clone();
                std::thread::spawn(move || store.hold(&slot_id, &format!("conv-{i}")))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, BookingError::SlotUnavailable(_))));
    }

    #[test]
    fn test_release_is_idempotent_on_free_slot() {
        let store = store();
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();

        store.release(&slot.id, "conv-a").unwrap();
        store.release(&slot.id, "conv-a").unwrap();
        assert_eq!(store.get(&slot.id).unwrap().unwrap(), slot);
    }

    #[test]
    fn test_release_only_by_owner() {
        let store = store();
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();
        store.hold(&slot.id, "conv-a").unwrap();

        assert!(matches!(
            store.release(&slot.id, "conv-b"),
            Err(BookingError::NotHeld(_))
        ));
        store.release(&slot.id, "conv-a").unwrap();
        assert_eq!(store.get(&slot.id).unwrap().unwrap().status, SlotStatus::Free);
    }

    #[test]
    fn test_confirm_requires_hold_by_caller() {
        let store = store();
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();

        assert!(matches!(
            store.confirm(&slot.id, "conv-a"),
            Err(BookingError::NotHeld(_))
        ));

        store.hold(&slot.id, "conv-a").unwrap();
        assert!(matches!(
            store.confirm(&slot.id, "conv-b"),
            Err(BookingError::NotHeld(_))
        ));
        assert_eq!(store.get(&slot.id).unwrap().unwrap().status, SlotStatus::Held);
    }

    #[test]
    fn test_hold_confirm_cancel_round_trip() {
        let store = store();
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();

        store.hold(&slot.id, "conv-a").unwrap();
        let appointment = store.confirm(&slot.id, "conv-a").unwrap();
        assert_eq!(appointment.slot_id, slot.id);
        assert_eq!(appointment.requester, "conv-a");
        assert_eq!(appointment.status, AppointmentStatus::Active);

        let details = store.appointment(&appointment.id).unwrap();
        assert_eq!(details.slot.id, slot.id);
        assert_eq!(details.slot.status, SlotStatus::Booked);

        let cancelled = store.cancel(&appointment.id).unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
        assert_eq!(store.get(&slot.id).unwrap().unwrap().status, SlotStatus::Free);

        // Cancelling twice leaves things as they are
        let again = store.cancel(&appointment.id).unwrap();
        assert_eq!(again.status, AppointmentStatus::Cancelled);
    }

    #[test]
    fn test_cancel_unknown_appointment() {
        let store = store();
        assert!(matches!(store.cancel("nope"), Err(BookingError::NotFound(_))));
    }

    #[test]
    fn test_rebook_after_cancel() {
        let store = store();
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();
        store.hold(&slot.id, "conv-a").unwrap();
        let first = store.confirm(&slot.id, "conv-a").unwrap();
        store.cancel(&first.id).unwrap();

        store.hold(&slot.id, "conv-b").unwrap();
        let second = store.confirm(&slot.id, "conv-b").unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(store.list_appointments().unwrap().len(), 2);
    }

    #[test]
    fn test_release_expired_holds() {
        let store = store();
        let slot = store.add_slot(dt("2025-06-16 09:00"), dt("2025-06-16 10:00")).unwrap();
        store.hold(&slot.id, "conv-a").unwrap();

        let past = Utc::now().naive_utc() - Duration::hours(1);
        assert_eq!(store.release_expired_holds(&past).unwrap(), 0);

        let future = Utc::now().naive_utc() + Duration::minutes(1);
        assert_eq!(store.release_expired_holds(&future).unwrap(), 1);
        assert_eq!(store.get(&slot.id).unwrap().unwrap().status, SlotStatus::Free);
    }

    #[test]
    fn test_seed_business_hours_skips_weekend() {
        let store = store();
        // 2025-06-13 is a Friday; the next two days are the weekend
        let from = NaiveDate::from_ymd_opt(2025, 6, 13).unwrap();
        let created = seed_business_hours(&store, from, 3, 9, 17, 60).unwrap();
        assert_eq!(created, 8);

        let again = seed_business_hours(&store, from, 3, 9, 17, 60).unwrap();
        assert_eq!(again, 0);

        let friday = store
            .query_available(&range("2025-06-13 00:00", "2025-06-14 00:00"))
            .unwrap();
        assert_eq!(friday.len(), 8);
        assert_eq!(friday[0].start, dt("2025-06-13 09:00"));
        assert_eq!(friday[7].end, dt("2025-06-13 17:00"));
    }
}
