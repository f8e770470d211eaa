//! Prescription issuance.
//!
//! Issuing a prescription and marking its appointment as prescribed happen in
//! the same transaction.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AppointmentStatus, Prescription};
use crate::scheduler::{apply_status, assert_attending};
use crate::store::Store;

pub struct PrescriptionService<S: Store> {
    store: Arc<S>,
}

impl<S: Store> PrescriptionService<S> {
    pub fn new(store: Arc<S>) -> Self {
        PrescriptionService { store }
    }

    /// Save `prescription` and move its appointment to `Prescribed`.
    ///
    /// Only the attending doctor may prescribe, and an appointment carries at
    /// most one prescription.
    pub fn issue(&self, doctor_id: Uuid, prescription: Prescription) -> Result<Prescription> {
        let appointment_id = prescription.appointment_id;
        let prescription = self.store.transaction(|repos| -> Result<Prescription> {
            let appointment = repos
                .find_appointment(appointment_id)?
                .ok_or_else(|| AppError::not_found("Appointment"))?;
            assert_attending(&appointment, doctor_id)?;
            if repos
                .find_prescription_by_appointment_id(appointment_id)?
                .is_some()
            {
                warn!(appointment = %appointment_id, "prescription already issued");
                return Err(AppError::Conflict(
                    "Prescription already exists for this appointment".to_string(),
                ));
            }
            apply_status(repos, appointment_id, AppointmentStatus::Prescribed)?;
            repos.save_prescription(prescription.clone())?;
            Ok(prescription)
        })?;

        info!(
            prescription = %prescription.id,
            appointment = %appointment_id,
            "prescription issued"
        );
        Ok(prescription)
    }

    /// The prescription of an appointment, as seen by its attending doctor.
    pub fn for_appointment(&self, doctor_id: Uuid, appointment_id: Uuid) -> Result<Prescription> {
        self.store.read(|repos| {
            let appointment = repos
                .find_appointment(appointment_id)?
                .ok_or_else(|| AppError::not_found("Appointment"))?;
            assert_attending(&appointment, doctor_id)?;
            repos
                .find_prescription_by_appointment_id(appointment_id)?
                .ok_or_else(|| AppError::not_found("Prescription"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Appointment;
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;

    fn with_appointment(status: AppointmentStatus) -> (Arc<InMemoryStore>, Appointment) {
        let store = Arc::new(InMemoryStore::new());
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            start: NaiveDate::from_ymd_opt(2033, 2, 2)
                .unwrap()
                .and_hms_opt(11, 0, 0)
                .unwrap(),
            status,
        };
        let saved = appointment.clone();
        store
            .transaction(|repos| -> Result<()> { Ok(repos.save_appointment(saved)?) })
            .unwrap();
        (store, appointment)
    }

    fn prescription_for(appointment_id: Uuid) -> Prescription {
        Prescription::new(
            "John Smith".to_string(),
            appointment_id,
            "Ibuprofen".to_string(),
            "200mg twice daily".to_string(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn issuing_marks_appointment_prescribed() {
        let (store, appointment) = with_appointment(AppointmentStatus::Scheduled);
        let service = PrescriptionService::new(store.clone());

        let issued = service
            .issue(appointment.doctor_id, prescription_for(appointment.id))
            .unwrap();
        assert_eq!(
            service
                .for_appointment(appointment.doctor_id, appointment.id)
                .unwrap(),
            issued
        );

        let status = store
            .read(|repos| -> Result<AppointmentStatus> {
                Ok(repos
                    .find_appointment(appointment.id)?
                    .map(|a| a.status)
                    .unwrap_or(AppointmentStatus::Scheduled))
            })
            .unwrap();
        assert_eq!(status, AppointmentStatus::Prescribed);
    }

    #[test]
    fn second_prescription_conflicts() {
        let (store, appointment) = with_appointment(AppointmentStatus::Scheduled);
        let service = PrescriptionService::new(store);
        let doctor_id = appointment.doctor_id;
        service
            .issue(doctor_id, prescription_for(appointment.id))
            .unwrap();

        let err = service
            .issue(doctor_id, prescription_for(appointment.id))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn missing_or_closed_appointment_is_rejected() {
        let (store, appointment) = with_appointment(AppointmentStatus::Cancelled);
        let service = PrescriptionService::new(store);

        let doctor_id = appointment.doctor_id;

        let err = service
            .issue(doctor_id, prescription_for(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = service
            .issue(doctor_id, prescription_for(appointment.id))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            service
                .for_appointment(doctor_id, appointment.id)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn only_the_attending_doctor_prescribes() {
        let (store, appointment) = with_appointment(AppointmentStatus::Scheduled);
        let service = PrescriptionService::new(store);
        let stranger = Uuid::new_v4();

        let err = service
            .issue(stranger, prescription_for(appointment.id))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        service
            .issue(appointment.doctor_id, prescription_for(appointment.id))
            .unwrap();
        let err = service
            .for_appointment(stranger, appointment.id)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
