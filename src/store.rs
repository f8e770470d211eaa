//! Persistence seam for the booking engines.
//!
//! Each entity has a narrow repository trait; [`Repositories`] bundles them so
//! an engine can work against one unit of work. A [`Store`] hands out that unit
//! of work either read-only or inside a transaction that commits only when the
//! closure succeeds.

use chrono::NaiveDateTime;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Admin, Appointment, AppointmentStatus, Doctor, Patient, Prescription};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

pub trait AdminRepository {
    fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Admin>>;
    fn save_admin(&mut self, admin: Admin) -> StoreResult<()>;
}

pub trait DoctorRepository {
    fn find_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>>;
    fn find_doctor_by_email(&self, email: &str) -> StoreResult<Option<Doctor>>;
    fn doctor_exists(&self, id: Uuid) -> StoreResult<bool>;
    fn find_all_doctors(&self) -> StoreResult<Vec<Doctor>>;
    fn save_doctor(&mut self, doctor: Doctor) -> StoreResult<()>;
    fn delete_doctor(&mut self, id: Uuid) -> StoreResult<bool>;
}

pub trait PatientRepository {
    fn find_patient(&self, id: Uuid) -> StoreResult<Option<Patient>>;
    fn find_patient_by_email(&self, email: &str) -> StoreResult<Option<Patient>>;
    fn find_patient_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> StoreResult<Option<Patient>>;
    fn save_patient(&mut self, patient: Patient) -> StoreResult<()>;
}

/// Appointment queries. Time ranges are inclusive at both ends.
pub trait AppointmentRepository {
    fn find_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>>;
    fn save_appointment(&mut self, appointment: Appointment) -> StoreResult<()>;
    fn delete_appointment(&mut self, id: Uuid) -> StoreResult<bool>;
    fn find_by_doctor_and_time_range(
        &self,
        doctor_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<Appointment>>;
    fn find_by_doctor_and_patient_name_and_time_range(
        &self,
        doctor_id: Uuid,
        patient_name: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<Appointment>>;
    fn find_by_patient_id(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>>;
    fn find_by_patient_id_and_status_order_by_time(
        &self,
        patient_id: Uuid,
        status: AppointmentStatus,
    ) -> StoreResult<Vec<Appointment>>;
    fn delete_all_by_doctor_id(&mut self, doctor_id: Uuid) -> StoreResult<usize>;
}

pub trait PrescriptionRepository {
    fn save_prescription(&mut self, prescription: Prescription) -> StoreResult<()>;
    fn find_prescription_by_appointment_id(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Prescription>>;
}

/// Every repository, as seen from within one unit of work.
pub trait Repositories:
    AdminRepository
    + DoctorRepository
    + PatientRepository
    + AppointmentRepository
    + PrescriptionRepository
{
}

impl<T> Repositories for T where
    T: AdminRepository
        + DoctorRepository
        + PatientRepository
        + AppointmentRepository
        + PrescriptionRepository
{
}

/// Source of units of work.
///
/// `transaction` must make the closure's reads and writes atomic with respect
/// to every other transaction, and discard all writes when it returns `Err`.
pub trait Store: Send + Sync {
    fn read<T, E>(
        &self,
        f: impl FnOnce(&dyn Repositories) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>;

    fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut dyn Repositories) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>;
}

/// Backing rows for [`InMemoryStore`], kept in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    admins: Vec<Admin>,
    doctors: Vec<Doctor>,
    patients: Vec<Patient>,
    appointments: Vec<Appointment>,
    prescriptions: Vec<Prescription>,
}

fn upsert<T>(rows: &mut Vec<T>, row: T, same: impl Fn(&T) -> bool) {
    match rows.iter_mut().find(|existing| same(existing)) {
        Some(existing) => *existing = row,
        None => rows.push(row),
    }
}

impl AdminRepository for Tables {
    fn find_admin_by_username(&self, username: &str) -> StoreResult<Option<Admin>> {
        Ok(self.admins.iter().find(|a| a.username == username).cloned())
    }

    fn save_admin(&mut self, admin: Admin) -> StoreResult<()> {
        if self
            .admins
            .iter()
            .any(|a| a.username == admin.username && a.id != admin.id)
        {
            return Err(StoreError::Constraint(format!(
                "admin username '{}' already taken",
                admin.username
            )));
        }
        let id = admin.id;
        upsert(&mut self.admins, admin, |a| a.id == id);
        Ok(())
    }
}

impl DoctorRepository for Tables {
    fn find_doctor(&self, id: Uuid) -> StoreResult<Option<Doctor>> {
        Ok(self.doctors.iter().find(|d| d.id == id).cloned())
    }

    fn find_doctor_by_email(&self, email: &str) -> StoreResult<Option<Doctor>> {
        Ok(self.doctors.iter().find(|d| d.email == email).cloned())
    }

    fn doctor_exists(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.doctors.iter().any(|d| d.id == id))
    }

    fn find_all_doctors(&self) -> StoreResult<Vec<Doctor>> {
        Ok(self.doctors.clone())
    }

    fn save_doctor(&mut self, doctor: Doctor) -> StoreResult<()> {
        if self
            .doctors
            .iter()
            .any(|d| d.email == doctor.email && d.id != doctor.id)
        {
            return Err(StoreError::Constraint(format!(
                "doctor email '{}' already registered",
                doctor.email
            )));
        }
        let id = doctor.id;
        upsert(&mut self.doctors, doctor, |d| d.id == id);
        Ok(())
    }

    fn delete_doctor(&mut self, id: Uuid) -> StoreResult<bool> {
        let before = self.doctors.len();
        self.doctors.retain(|d| d.id != id);
        Ok(self.doctors.len() != before)
    }
}

impl PatientRepository for Tables {
    fn find_patient(&self, id: Uuid) -> StoreResult<Option<Patient>> {
        Ok(self.patients.iter().find(|p| p.id == id).cloned())
    }

    fn find_patient_by_email(&self, email: &str) -> StoreResult<Option<Patient>> {
        Ok(self.patients.iter().find(|p| p.email == email).cloned())
    }

    fn find_patient_by_email_or_phone(
        &self,
        email: &str,
        phone: &str,
    ) -> StoreResult<Option<Patient>> {
        Ok(self
            .patients
            .iter()
            .find(|p| p.email == email || p.phone == phone)
            .cloned())
    }

    fn save_patient(&mut self, patient: Patient) -> StoreResult<()> {
        let id = patient.id;
        upsert(&mut self.patients, patient, |p| p.id == id);
        Ok(())
    }
}

impl AppointmentRepository for Tables {
    fn find_appointment(&self, id: Uuid) -> StoreResult<Option<Appointment>> {
        Ok(self.appointments.iter().find(|a| a.id == id).cloned())
    }

    fn save_appointment(&mut self, appointment: Appointment) -> StoreResult<()> {
        let id = appointment.id;
        upsert(&mut self.appointments, appointment, |a| a.id == id);
        Ok(())
    }

    fn delete_appointment(&mut self, id: Uuid) -> StoreResult<bool> {
        let before = self.appointments.len();
        self.appointments.retain(|a| a.id != id);
        Ok(self.appointments.len() != before)
    }

    fn find_by_doctor_and_time_range(
        &self,
        doctor_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<Appointment>> {
        Ok(self
            .appointments
            .iter()
            .filter(|a| a.doctor_id == doctor_id && a.start >= from && a.start <= to)
            .cloned()
            .collect())
    }

    fn find_by_doctor_and_patient_name_and_time_range(
        &self,
        doctor_id: Uuid,
        patient_name: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> StoreResult<Vec<Appointment>> {
        let needle = patient_name.to_lowercase();
        Ok(self
            .appointments
            .iter()
            .filter(|a| a.doctor_id == doctor_id && a.start >= from && a.start <= to)
            .filter(|a| {
                self.patients
                    .iter()
                    .find(|p| p.id == a.patient_id)
                    .map(|p| p.name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    fn find_by_patient_id(&self, patient_id: Uuid) -> StoreResult<Vec<Appointment>> {
        Ok(self
            .appointments
            .iter()
            .filter(|a| a.patient_id == patient_id)
            .cloned()
            .collect())
    }

    fn find_by_patient_id_and_status_order_by_time(
        &self,
        patient_id: Uuid,
        status: AppointmentStatus,
    ) -> StoreResult<Vec<Appointment>> {
        let mut found: Vec<Appointment> = self
            .appointments
            .iter()
            .filter(|a| a.patient_id == patient_id && a.status == status)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.start);
        Ok(found)
    }

    fn delete_all_by_doctor_id(&mut self, doctor_id: Uuid) -> StoreResult<usize> {
        let before = self.appointments.len();
        self.appointments.retain(|a| a.doctor_id != doctor_id);
        Ok(before - self.appointments.len())
    }
}

impl PrescriptionRepository for Tables {
    fn save_prescription(&mut self, prescription: Prescription) -> StoreResult<()> {
        let id = prescription.id;
        upsert(&mut self.prescriptions, prescription, |p| p.id == id);
        Ok(())
    }

    fn find_prescription_by_appointment_id(
        &self,
        appointment_id: Uuid,
    ) -> StoreResult<Option<Prescription>> {
        Ok(self
            .prescriptions
            .iter()
            .find(|p| p.appointment_id == appointment_id)
            .cloned())
    }
}

/// Process-local store. A transaction works on a copy of the tables under the
/// lock and swaps it in on success, so transactions are serialized.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for InMemoryStore {
    fn read<T, E>(
        &self,
        f: impl FnOnce(&dyn Repositories) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let tables = self.tables.lock();
        f(&*tables)
    }

    fn transaction<T, E>(
        &self,
        f: impl FnOnce(&mut dyn Repositories) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut tables = self.tables.lock();
        let mut working = tables.clone();
        let out = f(&mut working)?;
        *tables = working;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2030, 3, 4)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn appointment(doctor_id: Uuid, patient_id: Uuid, hour: u32) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            start: at(hour),
            status: AppointmentStatus::Scheduled,
        }
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let store = InMemoryStore::new();
        let doctor_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();

        let result: Result<(), AppError> = store.transaction(|repos| {
            repos.save_appointment(appointment(doctor_id, patient_id, 10))?;
            Err(AppError::validation("abort"))
        });
        assert!(result.is_err());

        let remaining = store
            .read(|repos| repos.find_by_patient_id(patient_id).map_err(AppError::from))
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[test]
    fn time_range_is_inclusive() {
        let store = InMemoryStore::new();
        let doctor_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();

        store
            .transaction(|repos| -> Result<(), AppError> {
                repos.save_appointment(appointment(doctor_id, patient_id, 9))?;
                repos.save_appointment(appointment(doctor_id, patient_id, 11))?;
                repos.save_appointment(appointment(doctor_id, patient_id, 13))?;
                Ok(())
            })
            .unwrap();

        let found = store
            .read(|repos| {
                repos
                    .find_by_doctor_and_time_range(doctor_id, at(9), at(11))
                    .map_err(AppError::from)
            })
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn patient_listing_is_ordered_by_time() {
        let store = InMemoryStore::new();
        let doctor_id = Uuid::new_v4();
        let patient_id = Uuid::new_v4();

        store
            .transaction(|repos| -> Result<(), AppError> {
                repos.save_appointment(appointment(doctor_id, patient_id, 15))?;
                repos.save_appointment(appointment(doctor_id, patient_id, 9))?;
                repos.save_appointment(appointment(doctor_id, patient_id, 12))?;
                Ok(())
            })
            .unwrap();

        let hours: Vec<NaiveDateTime> = store
            .read(|repos| {
                repos
                    .find_by_patient_id_and_status_order_by_time(
                        patient_id,
                        AppointmentStatus::Scheduled,
                    )
                    .map_err(AppError::from)
            })
            .unwrap()
            .into_iter()
            .map(|a| a.start)
            .collect();
        assert_eq!(hours, vec![at(9), at(12), at(15)]);
    }
}
