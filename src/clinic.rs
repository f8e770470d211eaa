//! Token-gated entry points.
//!
//! Each operation first resolves the caller's token against the role it
//! requires, then hands off to the engine. Identity used for ownership
//! (the patient cancelling, the doctor listing their day) always comes from
//! the resolved principal, never from request data.

use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;
use uuid::Uuid;

use crate::accounts::{Accounts, NewPatient};
use crate::calendar::{format_slot, DoctorCalendar};
use crate::directory::{DoctorDirectory, DoctorFilter, DoctorProfile};
use crate::error::{AppError, Result};
use crate::models::{
    Appointment, AppointmentStatus, AppointmentUpdate, AppointmentView, Doctor, Patient,
    Prescription, Principal, Role,
};
use crate::prescriptions::PrescriptionService;
use crate::scheduler::AppointmentScheduler;
use crate::store::Store;
use crate::token::TokenService;

pub struct Clinic<S: Store> {
    store: Arc<S>,
    tokens: TokenService,
    pub calendar: DoctorCalendar<S>,
    pub scheduler: AppointmentScheduler<S>,
    pub directory: DoctorDirectory<S>,
    pub prescriptions: PrescriptionService<S>,
    pub accounts: Accounts<S>,
}

impl<S: Store> Clinic<S> {
    pub fn new(store: Arc<S>, tokens: TokenService) -> Self {
        Clinic {
            calendar: DoctorCalendar::new(store.clone()),
            scheduler: AppointmentScheduler::new(store.clone()),
            directory: DoctorDirectory::new(store.clone()),
            prescriptions: PrescriptionService::new(store.clone()),
            accounts: Accounts::new(store.clone(), tokens.clone()),
            store,
            tokens,
        }
    }

    pub fn validate_token(&self, role: &str, token: &str) -> bool {
        self.tokens.validate(self.store.as_ref(), role, token)
    }

    pub fn generate_token(&self, principal_id: &str) -> Result<String> {
        self.tokens.generate(principal_id)
    }

    fn authorize(&self, role: Role, token: &str) -> Result<Principal> {
        self.tokens.resolve(self.store.as_ref(), role.name(), token)
    }

    fn patient(&self, token: &str) -> Result<Patient> {
        match self.authorize(Role::Patient, token)? {
            Principal::Patient(patient) => Ok(patient),
            _ => Err(AppError::TokenInvalid),
        }
    }

    fn doctor(&self, token: &str) -> Result<Doctor> {
        match self.authorize(Role::Doctor, token)? {
            Principal::Doctor(doctor) => Ok(doctor),
            _ => Err(AppError::TokenInvalid),
        }
    }

    /// Free slots as `"HH:MM"` strings; any role may ask.
    pub fn availability(
        &self,
        role: &str,
        token: &str,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<String>> {
        if !self.validate_token(role, token) {
            return Err(AppError::TokenInvalid);
        }
        let slots = self.calendar.availability(doctor_id, date)?;
        Ok(slots.into_iter().map(format_slot).collect())
    }

    /// Book a slot for the patient holding `token`.
    pub fn book(&self, token: &str, doctor_id: Uuid, start: NaiveDateTime) -> Result<Appointment> {
        let patient = self.patient(token)?;
        let appointment = Appointment::schedule(doctor_id, patient.id, start)?;
        self.scheduler.book(appointment)
    }

    /// Move the caller's appointment to another doctor and/or start time.
    pub fn reschedule(
        &self,
        token: &str,
        appointment_id: Uuid,
        doctor_id: Uuid,
        start: NaiveDateTime,
    ) -> Result<Appointment> {
        let patient = self.patient(token)?;
        let current = self.scheduler.get(appointment_id)?;
        let update = AppointmentUpdate {
            patient_id: patient.id,
            doctor_id,
            start,
            status: current.status,
        };
        self.scheduler.update(appointment_id, update)
    }

    pub fn cancel(&self, token: &str, appointment_id: Uuid) -> Result<()> {
        let patient = self.patient(token)?;
        self.scheduler.cancel(appointment_id, patient.id)
    }

    /// Change status of one of the calling doctor's appointments.
    pub fn change_status(&self, token: &str, appointment_id: Uuid, code: i32) -> Result<Appointment> {
        let doctor = self.doctor(token)?;
        self.scheduler
            .change_status_as_doctor(doctor.id, appointment_id, code)
    }

    /// The calling doctor's appointments on `date`.
    pub fn doctor_appointments(
        &self,
        token: &str,
        date: NaiveDate,
        patient_name: Option<&str>,
    ) -> Result<Vec<AppointmentView>> {
        let doctor = self.doctor(token)?;
        self.scheduler
            .list_for_doctor(doctor.id, date, patient_name)?
            .iter()
            .map(|a| self.scheduler.view(a))
            .collect()
    }

    /// The calling patient's appointments in `status`, earliest first.
    pub fn patient_appointments(
        &self,
        token: &str,
        status: AppointmentStatus,
    ) -> Result<Vec<AppointmentView>> {
        let patient = self.patient(token)?;
        self.scheduler
            .list_for_patient(patient.id, status)?
            .iter()
            .map(|a| self.scheduler.view(a))
            .collect()
    }

    pub fn issue_prescription(&self, token: &str, prescription: Prescription) -> Result<Prescription> {
        let doctor = self.doctor(token)?;
        self.prescriptions.issue(doctor.id, prescription)
    }

    pub fn prescription(&self, token: &str, appointment_id: Uuid) -> Result<Prescription> {
        let doctor = self.doctor(token)?;
        self.prescriptions.for_appointment(doctor.id, appointment_id)
    }

    pub fn add_doctor(&self, token: &str, profile: DoctorProfile, password: &str) -> Result<Doctor> {
        self.authorize(Role::Admin, token)?;
        self.directory.register(profile, password)
    }

    pub fn update_doctor(&self, token: &str, id: Uuid, profile: DoctorProfile) -> Result<Doctor> {
        self.authorize(Role::Admin, token)?;
        self.directory.update(id, profile)
    }

    pub fn delete_doctor(&self, token: &str, id: Uuid) -> Result<usize> {
        self.authorize(Role::Admin, token)?;
        self.directory.delete(id)
    }

    pub fn register_patient(&self, new: NewPatient) -> Result<Patient> {
        self.accounts.register_patient(new)
    }

    pub fn login(&self, role: Role, identifier: &str, password: &str) -> Result<String> {
        self.accounts.login(role, identifier, password)
    }

    /// Public roster search.
    pub fn filter_doctors(
        &self,
        name: Option<&str>,
        specialty: Option<&str>,
        period: Option<&str>,
    ) -> Result<Vec<Doctor>> {
        self.directory
            .filter(&DoctorFilter::from_params(name, specialty, period)?)
    }
}
