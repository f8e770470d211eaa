//! Appointment booking engine with ownership and conflict checks.
//!
//! This module provides the AppointmentScheduler, which books, reschedules,
//! cancels and re-statuses appointments. Every mutation runs inside a single
//! store transaction so the read-check-write sequence cannot interleave with
//! another mutation.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::calendar::day_bounds;
use crate::error::{AppError, Result};
use crate::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, AppointmentView, APPOINTMENT_HOURS,
};
use crate::store::{Repositories, Store};

/// Fail with `Unauthorized` unless `claimed_patient` owns `appointment`.
pub fn assert_owner(appointment: &Appointment, claimed_patient: Uuid) -> Result<()> {
    if appointment.patient_id != claimed_patient {
        warn!(
            appointment = %appointment.id,
            claimed = %claimed_patient,
            "patient does not own appointment"
        );
        return Err(AppError::Unauthorized(
            "Unauthorized: patient mismatch".to_string(),
        ));
    }
    Ok(())
}

/// Fail with `Unauthorized` unless `doctor_id` is the doctor the appointment is with.
pub fn assert_attending(appointment: &Appointment, doctor_id: Uuid) -> Result<()> {
    if appointment.doctor_id != doctor_id {
        warn!(
            appointment = %appointment.id,
            claimed = %doctor_id,
            "doctor is not attending appointment"
        );
        return Err(AppError::Unauthorized(
            "Unauthorized: doctor mismatch".to_string(),
        ));
    }
    Ok(())
}

/// Start times that collide with a booking starting at `start`.
///
/// Both ends are inclusive: back-to-back bookings exactly one hour apart
/// count as a collision.
pub fn conflict_window(start: NaiveDateTime) -> Result<(NaiveDateTime, NaiveDateTime)> {
    let length = Duration::hours(APPOINTMENT_HOURS);
    match (start.checked_sub_signed(length), start.checked_add_signed(length)) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(AppError::validation("appointment time is out of range")),
    }
}

fn load(repos: &dyn Repositories, id: Uuid) -> Result<Appointment> {
    repos
        .find_appointment(id)?
        .ok_or_else(|| AppError::not_found("Appointment"))
}

/// Move an appointment to `status` inside an open transaction.
pub(crate) fn apply_status(
    repos: &mut dyn Repositories,
    id: Uuid,
    status: AppointmentStatus,
) -> Result<Appointment> {
    let mut appointment = load(repos, id)?;
    appointment.status = appointment.status.transition_to(status)?;
    repos.save_appointment(appointment.clone())?;
    Ok(appointment)
}

fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(AppError::Storage(e)) = &result {
        error!(operation, error = %e, "persistence failure");
    }
    result
}

pub struct AppointmentScheduler<S: Store> {
    store: Arc<S>,
}

impl<S: Store> AppointmentScheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        AppointmentScheduler { store }
    }

    /// Persist a new appointment.
    ///
    /// The appointment must come from [`Appointment::new`], which has already
    /// checked the start time. No conflict check is made here.
    pub fn book(&self, appointment: Appointment) -> Result<Appointment> {
        let result: Result<Appointment> = self.store.transaction(|repos| {
            if !repos.doctor_exists(appointment.doctor_id)? {
                return Err(AppError::not_found("Doctor"));
            }
            if repos.find_patient(appointment.patient_id)?.is_none() {
                return Err(AppError::not_found("Patient"));
            }
            repos.save_appointment(appointment.clone())?;
            Ok(appointment)
        });

        let appointment = logged("book", result)?;
        info!(
            appointment = %appointment.id,
            doctor = %appointment.doctor_id,
            start = %appointment.start,
            "appointment booked"
        );
        Ok(appointment)
    }

    pub fn get(&self, id: Uuid) -> Result<Appointment> {
        self.store.read(|repos| load(repos, id))
    }

    /// Reschedule an existing appointment.
    ///
    /// The update may not change the owning patient, and its new hour may not
    /// collide with any other appointment of the target doctor.
    pub fn update(&self, id: Uuid, update: AppointmentUpdate) -> Result<Appointment> {
        let result: Result<Appointment> = self.store.transaction(|repos| {
            let mut existing = load(repos, id)?;
            assert_owner(&existing, update.patient_id)?;

            if !repos.doctor_exists(update.doctor_id)? {
                return Err(AppError::not_found("Doctor"));
            }
            let status = existing.status.transition_to(update.status)?;

            let (from, to) = conflict_window(update.start)?;
            let clashes = repos
                .find_by_doctor_and_time_range(update.doctor_id, from, to)?
                .into_iter()
                .any(|other| other.id != id);
            if clashes {
                warn!(
                    appointment = %id,
                    doctor = %update.doctor_id,
                    start = %update.start,
                    "reschedule rejected, doctor busy"
                );
                return Err(AppError::Conflict(
                    "Doctor not available at this time".to_string(),
                ));
            }

            existing.start = update.start;
            existing.doctor_id = update.doctor_id;
            existing.status = status;
            repos.save_appointment(existing.clone())?;
            Ok(existing)
        });

        let updated = logged("update", result)?;
        info!(appointment = %id, start = %updated.start, "appointment updated");
        Ok(updated)
    }

    /// Delete an appointment on behalf of the patient who owns it.
    pub fn cancel(&self, id: Uuid, requesting_patient_id: Uuid) -> Result<()> {
        let result: Result<()> = self.store.transaction(|repos| {
            let existing = load(repos, id)?;
            assert_owner(&existing, requesting_patient_id)?;
            repos.delete_appointment(id)?;
            Ok(())
        });

        logged("cancel", result)?;
        info!(appointment = %id, "appointment cancelled");
        Ok(())
    }

    pub fn change_status(&self, id: Uuid, status: AppointmentStatus) -> Result<Appointment> {
        self.set_status(id, None, status)
    }

    /// Same as [`change_status`](Self::change_status) for a raw status code.
    pub fn change_status_code(&self, id: Uuid, code: i32) -> Result<Appointment> {
        self.change_status(id, AppointmentStatus::try_from(code)?)
    }

    /// Change status on behalf of a doctor, who must be the one attending.
    pub fn change_status_as_doctor(
        &self,
        doctor_id: Uuid,
        id: Uuid,
        code: i32,
    ) -> Result<Appointment> {
        self.set_status(id, Some(doctor_id), AppointmentStatus::try_from(code)?)
    }

    fn set_status(
        &self,
        id: Uuid,
        attending: Option<Uuid>,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        let result: Result<Appointment> = self.store.transaction(|repos| {
            if let Some(doctor_id) = attending {
                assert_attending(&load(repos, id)?, doctor_id)?;
            }
            apply_status(repos, id, status)
        });

        let appointment = logged("change_status", result)?;
        info!(appointment = %id, status = status.name(), "appointment status changed");
        Ok(appointment)
    }

    /// A doctor's appointments on `date`, optionally narrowed to patients whose
    /// name contains `patient_name` (any case). Returned in store order.
    pub fn list_for_doctor(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        patient_name: Option<&str>,
    ) -> Result<Vec<Appointment>> {
        let (from, to) = day_bounds(date);
        let name = patient_name.map(str::trim).filter(|n| !n.is_empty());

        self.store.read(|repos| {
            let found = match name {
                Some(name) => repos
                    .find_by_doctor_and_patient_name_and_time_range(doctor_id, name, from, to)?,
                None => repos.find_by_doctor_and_time_range(doctor_id, from, to)?,
            };
            Ok(found)
        })
    }

    /// A patient's appointments with `status`, earliest first.
    pub fn list_for_patient(
        &self,
        patient_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Vec<Appointment>> {
        self.store.read(|repos| {
            Ok(repos.find_by_patient_id_and_status_order_by_time(patient_id, status)?)
        })
    }

    /// A patient's appointments filtered by doctor name and/or status,
    /// earliest first.
    pub fn search_for_patient(
        &self,
        patient_id: Uuid,
        doctor_name: Option<&str>,
        status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>> {
        let needle = doctor_name
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty());

        self.store.read(|repos| {
            let mut found = Vec::new();
            for appointment in repos.find_by_patient_id(patient_id)? {
                if status.is_some_and(|s| s != appointment.status) {
                    continue;
                }
                if let Some(needle) = &needle {
                    let matches = repos
                        .find_doctor(appointment.doctor_id)?
                        .is_some_and(|d| d.name.to_lowercase().contains(needle));
                    if !matches {
                        continue;
                    }
                }
                found.push(appointment);
            }
            found.sort_by_key(|a| a.start);
            Ok(found)
        })
    }

    /// Join an appointment with its doctor and patient for display.
    pub fn view(&self, appointment: &Appointment) -> Result<AppointmentView> {
        self.store.read(|repos| {
            let doctor = repos
                .find_doctor(appointment.doctor_id)?
                .ok_or_else(|| AppError::not_found("Doctor"))?;
            let patient = repos
                .find_patient(appointment.patient_id)?
                .ok_or_else(|| AppError::not_found("Patient"))?;
            AppointmentView::new(appointment, &doctor, &patient)
        })
    }
}
