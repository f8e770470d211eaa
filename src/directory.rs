//! Doctor roster: registration, updates, cascading removal and filtering.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::hash_password;
use crate::error::{AppError, Result};
use crate::models::Doctor;
use crate::store::Store;

/// Half of the day an offered slot begins in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Am,
    Pm,
}

impl Period {
    pub fn from_string(value: &str) -> Result<Self> {
        match value.to_uppercase().trim() {
            "AM" => Ok(Period::Am),
            "PM" => Ok(Period::Pm),
            _ => Err(AppError::validation(format!(
                "Invalid period: '{}'. Must be AM or PM",
                value
            ))),
        }
    }

    pub fn contains_hour(self, hour: u32) -> bool {
        match self {
            Period::Am => hour < 12,
            Period::Pm => hour >= 12,
        }
    }
}

/// Conjunction of optional criteria over the doctor roster.
///
/// Name matches as a case-insensitive substring, specialty as a
/// case-insensitive exact value, and period when at least one offered slot
/// starts in that half of the day.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctorFilter {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub period: Option<Period>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl DoctorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a filter from raw request parameters; blank values are ignored.
    pub fn from_params(
        name: Option<&str>,
        specialty: Option<&str>,
        period: Option<&str>,
    ) -> Result<Self> {
        Ok(DoctorFilter {
            name: present(name).map(str::to_string),
            specialty: present(specialty).map(str::to_string),
            period: present(period).map(Period::from_string).transpose()?,
        })
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn specialty(mut self, specialty: &str) -> Self {
        self.specialty = Some(specialty.to_string());
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn matches(&self, doctor: &Doctor) -> bool {
        if let Some(name) = &self.name {
            if !doctor.name.to_lowercase().contains(&name.to_lowercase()) {
                return false;
            }
        }
        if let Some(specialty) = &self.specialty {
            if !doctor.specialty.eq_ignore_ascii_case(specialty.trim()) {
                return false;
            }
        }
        if let Some(period) = self.period {
            if !doctor.offered_hours().any(|hour| period.contains_hour(hour)) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, doctors: Vec<Doctor>) -> Vec<Doctor> {
        doctors.into_iter().filter(|d| self.matches(d)).collect()
    }
}

/// Editable part of a doctor record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoctorProfile {
    pub name: String,
    pub specialty: String,
    pub email: String,
    pub phone: String,
    pub available_times: Vec<String>,
}

pub struct DoctorDirectory<S: Store> {
    store: Arc<S>,
}

impl<S: Store> DoctorDirectory<S> {
    pub fn new(store: Arc<S>) -> Self {
        DoctorDirectory { store }
    }

    /// Add a doctor; the email must not belong to another doctor.
    pub fn register(&self, profile: DoctorProfile, password: &str) -> Result<Doctor> {
        let doctor = Doctor::new(
            profile.name,
            profile.specialty,
            profile.email,
            profile.phone,
            hash_password(password)?,
            profile.available_times,
        )?;

        let doctor = self.store.transaction(|repos| {
            if repos.find_doctor_by_email(&doctor.email)?.is_some() {
                warn!(email = %doctor.email, "doctor email already registered");
                return Err(AppError::Conflict("Doctor already exists".to_string()));
            }
            repos.save_doctor(doctor.clone())?;
            Ok(doctor)
        })?;

        info!(doctor = %doctor.id, "doctor registered");
        Ok(doctor)
    }

    /// Replace a doctor's profile, keeping id and credentials.
    pub fn update(&self, id: Uuid, profile: DoctorProfile) -> Result<Doctor> {
        let doctor = self.store.transaction(|repos| {
            let mut doctor = repos
                .find_doctor(id)?
                .ok_or_else(|| AppError::not_found("Doctor"))?;
            if let Some(other) = repos.find_doctor_by_email(&profile.email)? {
                if other.id != id {
                    return Err(AppError::Conflict("Doctor already exists".to_string()));
                }
            }

            doctor.name = profile.name.clone();
            doctor.specialty = profile.specialty.clone();
            doctor.email = profile.email.clone();
            doctor.phone = profile.phone.clone();
            doctor.available_times = profile.available_times.clone();
            doctor.validate()?;

            repos.save_doctor(doctor.clone())?;
            Ok(doctor)
        })?;

        info!(doctor = %id, "doctor updated");
        Ok(doctor)
    }

    /// Remove a doctor together with every appointment that references it.
    ///
    /// Appointments go first, then the doctor, in one transaction. Returns the
    /// number of appointments removed.
    pub fn delete(&self, id: Uuid) -> Result<usize> {
        let removed = self.store.transaction(|repos| {
            if !repos.doctor_exists(id)? {
                return Err(AppError::not_found("Doctor"));
            }
            let removed = repos.delete_all_by_doctor_id(id)?;
            repos.delete_doctor(id)?;
            Ok(removed)
        })?;

        info!(doctor = %id, appointments = removed, "doctor deleted");
        Ok(removed)
    }

    pub fn get(&self, id: Uuid) -> Result<Doctor> {
        self.store.read(|repos| {
            repos
                .find_doctor(id)?
                .ok_or_else(|| AppError::not_found("Doctor"))
        })
    }

    pub fn list(&self) -> Result<Vec<Doctor>> {
        self.store.read(|repos| Ok(repos.find_all_doctors()?))
    }

    pub fn find_by_name(&self, name: &str) -> Result<Vec<Doctor>> {
        self.filter(&DoctorFilter::new().name(name))
    }

    pub fn filter(&self, filter: &DoctorFilter) -> Result<Vec<Doctor>> {
        Ok(filter.apply(self.list()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{Appointment, AppointmentStatus};
    use crate::store::InMemoryStore;
    use chrono::NaiveDate;

    fn profile(name: &str, specialty: &str, email: &str, times: &[&str]) -> DoctorProfile {
        DoctorProfile {
            name: name.to_string(),
            specialty: specialty.to_string(),
            email: email.to_string(),
            phone: "5554443333".to_string(),
            available_times: times.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn roster() -> (Arc<InMemoryStore>, DoctorDirectory<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let directory = DoctorDirectory::new(store.clone());
        directory
            .register(
                profile("Dr. John Smith", "Cardiology", "smith@clinic.test", &["09:00", "10:00"]),
                "secret1",
            )
            .unwrap();
        directory
            .register(
                profile("Dr. Anna SMITHERS", "Dermatology", "anna@clinic.test", &["14:00"]),
                "secret1",
            )
            .unwrap();
        directory
            .register(
                profile("Dr. Karl Jones", "cardiology", "jones@clinic.test", &["11:00-12:00", "16:00"]),
                "secret1",
            )
            .unwrap();
        (store, directory)
    }

    fn names(doctors: Vec<Doctor>) -> Vec<String> {
        doctors.into_iter().map(|d| d.name).collect()
    }

    #[test]
    fn name_and_morning_filter() {
        let (_, directory) = roster();
        let found = directory
            .filter(&DoctorFilter::new().name("Smith").period(Period::Am))
            .unwrap();
        assert_eq!(names(found), vec!["Dr. John Smith"]);
    }

    #[test]
    fn period_matches_any_offered_slot() {
        let (_, directory) = roster();
        let afternoon = directory
            .filter(&DoctorFilter::new().period(Period::Pm))
            .unwrap();
        assert_eq!(names(afternoon), vec!["Dr. Anna SMITHERS", "Dr. Karl Jones"]);
    }

    #[test]
    fn specialty_is_exact_ignoring_case() {
        let (_, directory) = roster();
        let cardio = directory
            .filter(&DoctorFilter::new().specialty("CARDIOLOGY"))
            .unwrap();
        assert_eq!(names(cardio), vec!["Dr. John Smith", "Dr. Karl Jones"]);

        let partial = directory
            .filter(&DoctorFilter::new().specialty("cardio"))
            .unwrap();
        assert!(partial.is_empty());

        let combined = directory
            .filter(&DoctorFilter::new().specialty("cardiology").period(Period::Pm))
            .unwrap();
        assert_eq!(names(combined), vec!["Dr. Karl Jones"]);
    }

    #[test]
    fn empty_filter_returns_everyone() {
        let (_, directory) = roster();
        let filter = DoctorFilter::from_params(Some(""), None, Some("  ")).unwrap();
        assert_eq!(directory.filter(&filter).unwrap().len(), 3);
        assert!(DoctorFilter::from_params(None, None, Some("noon")).is_err());
    }

    #[test]
    fn duplicate_email_conflicts() {
        let (_, directory) = roster();
        let err = directory
            .register(
                profile("Dr. Other Smith", "Oncology", "smith@clinic.test", &[]),
                "secret1",
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn update_keeps_identity_and_rejects_taken_email() {
        let (_, directory) = roster();
        let smith = directory.find_by_name("john").unwrap().remove(0);

        let updated = directory
            .update(
                smith.id,
                profile("Dr. John Smith", "Cardiology", "smith@clinic.test", &["15:00"]),
            )
            .unwrap();
        assert_eq!(updated.id, smith.id);
        assert_eq!(updated.password_hash, smith.password_hash);
        assert_eq!(updated.available_times, vec!["15:00".to_string()]);

        let err = directory
            .update(
                smith.id,
                profile("Dr. John Smith", "Cardiology", "anna@clinic.test", &[]),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err = directory
            .update(Uuid::new_v4(), profile("Dr. Nobody", "None", "x@y.test", &[]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn delete_cascades_to_appointments() {
        let (store, directory) = roster();
        let smith = directory.find_by_name("john").unwrap().remove(0);
        let jones = directory.find_by_name("jones").unwrap().remove(0);
        let start = NaiveDate::from_ymd_opt(2032, 1, 5)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();

        store
            .transaction(|repos| -> Result<()> {
                for (doctor, hours) in [(smith.id, 3), (jones.id, 1)] {
                    for offset in 0..hours {
                        repos.save_appointment(Appointment {
                            id: Uuid::new_v4(),
                            doctor_id: doctor,
                            patient_id: Uuid::new_v4(),
                            start: start + chrono::Duration::hours(offset),
                            status: AppointmentStatus::Scheduled,
                        })?;
                    }
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(directory.delete(smith.id).unwrap(), 3);
        let day = start.date();
        let (from, to) = crate::calendar::day_bounds(day);
        let (left_smith, left_jones) = store
            .read(|repos| -> Result<(usize, usize)> {
                Ok((
                    repos.find_by_doctor_and_time_range(smith.id, from, to)?.len(),
                    repos.find_by_doctor_and_time_range(jones.id, from, to)?.len(),
                ))
            })
            .unwrap();
        assert_eq!((left_smith, left_jones), (0, 1));
        assert_eq!(directory.get(smith.id).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(directory.delete(smith.id).unwrap_err().kind(), ErrorKind::NotFound);
    }
}
