//! Calendar management for the booking system.
//!
//! This module provides the workday slot template and the DoctorCalendar,
//! which derives a doctor's free slots on a date from the template and the
//! appointments already booked.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::models::Appointment;
use crate::store::Store;

/// Canonical hourly grid of a working day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotTemplate {
    pub start_hour: u32,
    pub end_hour: u32,
    pub slot_minutes: i64,
}

impl SlotTemplate {
    /// 09:00 to 17:00 in one-hour slots.
    pub const fn workday() -> Self {
        SlotTemplate {
            start_hour: 9,
            end_hour: 17,
            slot_minutes: 60,
        }
    }

    /// Every slot start such that the slot ends by `end_hour`.
    pub fn slots(&self) -> Vec<NaiveTime> {
        let mut slots = Vec::new();
        let (Some(mut current), Some(end)) = (
            NaiveTime::from_hms_opt(self.start_hour, 0, 0),
            NaiveTime::from_hms_opt(self.end_hour, 0, 0),
        ) else {
            return slots;
        };
        let step = Duration::minutes(self.slot_minutes);

        while current < end {
            let (slot_end, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 || slot_end > end {
                break;
            }
            slots.push(current);
            current = slot_end;
        }

        slots
    }
}

impl Default for SlotTemplate {
    fn default() -> Self {
        SlotTemplate::workday()
    }
}

/// First and last instant of a calendar date.
pub fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    let end = date.and_time(
        NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999).unwrap_or(NaiveTime::MIN),
    );
    (start, end)
}

/// Render a slot the way it is exchanged with clients, e.g. `"09:00"`.
pub fn format_slot(slot: NaiveTime) -> String {
    slot.format("%H:%M").to_string()
}

/// Read-only view of doctors' schedules.
pub struct DoctorCalendar<S: Store> {
    store: Arc<S>,
    template: SlotTemplate,
}

impl<S: Store> DoctorCalendar<S> {
    pub fn new(store: Arc<S>) -> Self {
        DoctorCalendar {
            store,
            template: SlotTemplate::workday(),
        }
    }

    pub fn template(&self) -> SlotTemplate {
        self.template
    }

    /// Appointments of a doctor whose start falls on `date`.
    pub fn appointments_on_date(
        &self,
        doctor_id: uuid::Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Appointment>> {
        let (from, to) = day_bounds(date);
        self.store.read(|repos| {
            Ok(repos.find_by_doctor_and_time_range(doctor_id, from, to)?)
        })
    }

    /// Template slots on `date` not taken by any appointment.
    ///
    /// A booking removes the slot whose time of day equals its start exactly;
    /// an off-grid booking such as 10:30 removes nothing.
    pub fn availability(&self, doctor_id: uuid::Uuid, date: NaiveDate) -> Result<Vec<NaiveTime>> {
        let (from, to) = day_bounds(date);
        let booked = self.store.read(|repos| {
            if !repos.doctor_exists(doctor_id)? {
                return Err(AppError::not_found("Doctor"));
            }
            Ok(repos.find_by_doctor_and_time_range(doctor_id, from, to)?)
        })?;

        let free: Vec<NaiveTime> = self
            .template
            .slots()
            .into_iter()
            .filter(|slot| !booked.iter().any(|a| a.time_only() == *slot))
            .collect();

        debug!(
            doctor = %doctor_id,
            %date,
            booked = booked.len(),
            free = free.len(),
            "computed availability"
        );
        Ok(free)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppointmentStatus, Doctor};
    use crate::store::InMemoryStore;
    use uuid::Uuid;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn setup() -> (Arc<InMemoryStore>, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let doctor = Doctor::new(
            "Dr. Ada Lane".to_string(),
            "Dermatology".to_string(),
            "ada@clinic.test".to_string(),
            "5551234567".to_string(),
            "hash".to_string(),
            vec!["09:00".to_string()],
        )
        .unwrap();
        let id = doctor.id;
        store
            .transaction(|repos| -> Result<()> { Ok(repos.save_doctor(doctor)?) })
            .unwrap();
        (store, id)
    }

    fn book(store: &InMemoryStore, doctor_id: Uuid, start: NaiveDateTime) {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id: Uuid::new_v4(),
            start,
            status: AppointmentStatus::Scheduled,
        };
        store
            .transaction(|repos| -> Result<()> { Ok(repos.save_appointment(appointment)?) })
            .unwrap();
    }

    #[test]
    fn workday_template_has_eight_slots() {
        let slots = SlotTemplate::workday().slots();
        assert_eq!(slots.len(), 8);
        assert_eq!(slots.first(), Some(&hm(9, 0)));
        assert_eq!(slots.last(), Some(&hm(16, 0)));
    }

    #[test]
    fn no_bookings_returns_full_grid() {
        let (store, doctor_id) = setup();
        let calendar = DoctorCalendar::new(store);
        let free = calendar.availability(doctor_id, date()).unwrap();
        assert_eq!(free, SlotTemplate::workday().slots());
    }

    #[test]
    fn booked_slot_is_removed() {
        let (store, doctor_id) = setup();
        book(&store, doctor_id, date().and_time(hm(10, 0)));
        let calendar = DoctorCalendar::new(store);

        let free: Vec<String> = calendar
            .availability(doctor_id, date())
            .unwrap()
            .into_iter()
            .map(format_slot)
            .collect();
        assert!(!free.contains(&"10:00".to_string()));
        assert_eq!(
            free,
            vec!["09:00", "11:00", "12:00", "13:00", "14:00", "15:00", "16:00"]
        );
    }

    #[test]
    fn off_grid_booking_removes_nothing() {
        let (store, doctor_id) = setup();
        book(&store, doctor_id, date().and_time(hm(10, 30)));
        let calendar = DoctorCalendar::new(store);
        assert_eq!(calendar.availability(doctor_id, date()).unwrap().len(), 8);
    }

    #[test]
    fn other_days_and_doctors_do_not_interfere() {
        let (store, doctor_id) = setup();
        let next_day = date().succ_opt().unwrap();
        book(&store, doctor_id, next_day.and_time(hm(9, 0)));
        book(&store, Uuid::new_v4(), date().and_time(hm(9, 0)));
        let calendar = DoctorCalendar::new(store);
        assert_eq!(calendar.availability(doctor_id, date()).unwrap().len(), 8);
    }

    #[test]
    fn fully_booked_day_is_empty() {
        let (store, doctor_id) = setup();
        for slot in SlotTemplate::workday().slots() {
            book(&store, doctor_id, date().and_time(slot));
        }
        let calendar = DoctorCalendar::new(store);
        assert!(calendar.availability(doctor_id, date()).unwrap().is_empty());
    }

    #[test]
    fn unknown_doctor_is_not_found() {
        let (store, _) = setup();
        let calendar = DoctorCalendar::new(store);
        let err = calendar.availability(Uuid::new_v4(), date()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }
}
