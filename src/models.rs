//! Data models for the appointment booking system.
//!
//! This module defines the core data structures used throughout the system:
//! - AppointmentStatus: lifecycle of an appointment and its legal transitions
//! - Role: the three kinds of principal a token can be checked against
//! - Doctor, Patient, Admin: principals held in the store
//! - Appointment: a one-hour booking of a doctor by a patient
//! - Prescription: medication issued against an appointment
//! - AppointmentView: read model joining an appointment with its people

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Every appointment occupies exactly one hour.
pub const APPOINTMENT_HOURS: i64 = 1;

/// Lifecycle status of an appointment.
///
/// Stored and exchanged as its integer code (0 = scheduled, 1 = prescribed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AppointmentStatus {
    Scheduled = 0,
    Prescribed = 1,
    Completed = 2,
    Cancelled = 3,
}

impl AppointmentStatus {
    /// Convert a string to a status value.
    pub fn from_string(value: &str) -> Result<Self> {
        match value.to_lowercase().trim() {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "prescribed" => Ok(AppointmentStatus::Prescribed),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Ok(AppointmentStatus::Cancelled),
            _ => Err(AppError::validation(format!(
                "Invalid status: '{}'. Must be one of: scheduled, prescribed, completed, cancelled",
                value
            ))),
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn name(&self) -> &str {
        match self {
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Prescribed => "PRESCRIBED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled
        )
    }

    /// Whether `next` may follow `self`. Staying put is always allowed.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;

        if self == next {
            return true;
        }
        match self {
            Scheduled => matches!(next, Prescribed | Completed | Cancelled),
            Prescribed => matches!(next, Completed | Cancelled),
            Completed | Cancelled => false,
        }
    }

    /// Validate a transition, returning the new status.
    pub fn transition_to(self, next: AppointmentStatus) -> Result<Self> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::validation(format!(
                "Cannot change status from {} to {}",
                self.name(),
                next.name()
            )))
        }
    }
}

impl TryFrom<i32> for AppointmentStatus {
    type Error = AppError;

    fn try_from(code: i32) -> Result<Self> {
        match code {
            0 => Ok(AppointmentStatus::Scheduled),
            1 => Ok(AppointmentStatus::Prescribed),
            2 => Ok(AppointmentStatus::Completed),
            3 => Ok(AppointmentStatus::Cancelled),
            other => Err(AppError::validation(format!(
                "Unknown appointment status code: {}",
                other
            ))),
        }
    }
}

impl From<AppointmentStatus> for i32 {
    fn from(status: AppointmentStatus) -> i32 {
        status.code()
    }
}

/// The kind of principal a token is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Doctor,
    Patient,
}

impl Role {
    /// Parse a role name, ignoring case.
    pub fn from_string(value: &str) -> Result<Self> {
        match value.to_lowercase().trim() {
            "admin" => Ok(Role::Admin),
            "doctor" => Ok(Role::Doctor),
            "patient" => Ok(Role::Patient),
            _ => Err(AppError::validation(format!(
                "Invalid role: '{}'. Must be one of: admin, doctor, patient",
                value
            ))),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Patient => "patient",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(AppError::validation(format!(
            "{} must be between {} and {} characters",
            field, min, max
        )));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(AppError::validation("email must be a valid format"));
    }
    Ok(())
}

fn check_phone(phone: &str) -> Result<()> {
    if phone.len() != 10 || !phone.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("phone must be exactly 10 digits"));
    }
    Ok(())
}

/// A doctor and the time-of-day slots they offer.
///
/// `available_times` is the doctor's advertised template (e.g. `"09:00"` or
/// `"14:00-15:00"`), not the per-date availability computed by the calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub available_times: Vec<String>,
}

impl Doctor {
    /// Create a new doctor with validation.
    pub fn new(
        name: String,
        specialty: String,
        email: String,
        phone: String,
        password_hash: String,
        available_times: Vec<String>,
    ) -> Result<Self> {
        let doctor = Doctor {
            id: Uuid::new_v4(),
            name,
            specialty,
            email,
            phone,
            password_hash,
            available_times,
        };
        doctor.validate()?;
        Ok(doctor)
    }

    pub fn validate(&self) -> Result<()> {
        check_length("name", &self.name, 3, 100)?;
        check_length("specialty", &self.specialty, 3, 50)?;
        check_email(&self.email)?;
        check_phone(&self.phone)?;
        if self.password_hash.is_empty() {
            return Err(AppError::validation("password cannot be empty"));
        }
        Ok(())
    }

    /// Hours of the day at which this doctor's offered slots begin.
    ///
    /// Entries that do not start with `HH:MM` are skipped.
    pub fn offered_hours(&self) -> impl Iterator<Item = u32> + '_ {
        use chrono::Timelike;

        self.available_times
            .iter()
            .filter_map(|slot| parse_slot_start(slot))
            .map(|time| time.hour())
    }
}

/// Parse the leading `HH:MM` of an offered slot string such as `"09:00-10:00"`.
pub fn parse_slot_start(slot: &str) -> Option<NaiveTime> {
    let start = slot.trim().split('-').next()?.trim();
    NaiveTime::parse_from_str(start, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(start, "%H:%M:%S"))
        .ok()
}

/// Represents a patient in the booking system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub phone: String,
    pub address: String,
}

impl Patient {
    /// Create a new patient with validation.
    pub fn new(
        name: String,
        email: String,
        password_hash: String,
        phone: String,
        address: String,
    ) -> Result<Self> {
        check_length("name", &name, 3, 100)?;
        check_email(&email)?;
        check_phone(&phone)?;
        if address.trim().is_empty() || address.chars().count() > 255 {
            return Err(AppError::validation(
                "address must be present and not exceed 255 characters",
            ));
        }
        if password_hash.is_empty() {
            return Err(AppError::validation("password cannot be empty"));
        }

        Ok(Patient {
            id: Uuid::new_v4(),
            name,
            email,
            password_hash,
            phone,
            address,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admin {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

impl Admin {
    pub fn new(username: String, password_hash: String) -> Result<Self> {
        if username.trim().is_empty() {
            return Err(AppError::validation("username cannot be empty"));
        }
        if password_hash.is_empty() {
            return Err(AppError::validation("password cannot be empty"));
        }
        Ok(Admin {
            id: Uuid::new_v4(),
            username,
            password_hash,
        })
    }
}

/// A resolved principal, as found in the store at validation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Admin(Admin),
    Doctor(Doctor),
    Patient(Patient),
}

impl Principal {
    pub fn role(&self) -> Role {
        match self {
            Principal::Admin(_) => Role::Admin,
            Principal::Doctor(_) => Role::Doctor,
            Principal::Patient(_) => Role::Patient,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Principal::Admin(admin) => admin.id,
            Principal::Doctor(doctor) => doctor.id,
            Principal::Patient(patient) => patient.id,
        }
    }

    /// The identifier embedded as a token subject.
    pub fn identifier(&self) -> &str {
        match self {
            Principal::Admin(admin) => &admin.username,
            Principal::Doctor(doctor) => &doctor.email,
            Principal::Patient(patient) => &patient.email,
        }
    }
}

/// A one-hour booking of a doctor by a patient.
///
/// Start times are wall-clock, timezone-naive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub start: NaiveDateTime,
    pub status: AppointmentStatus,
}

impl Appointment {
    /// Create a new appointment, checking the start lies strictly after `now`.
    pub fn new(
        doctor_id: Uuid,
        patient_id: Uuid,
        start: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Self> {
        if start <= now {
            return Err(AppError::validation("appointment time must be in the future"));
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            start,
            status: AppointmentStatus::Scheduled,
        };
        appointment.end_time()?;
        Ok(appointment)
    }

    /// Create a new appointment checked against the local wall clock.
    pub fn schedule(doctor_id: Uuid, patient_id: Uuid, start: NaiveDateTime) -> Result<Self> {
        Appointment::new(doctor_id, patient_id, start, Local::now().naive_local())
    }

    /// `start` plus the appointment length; fails if that leaves the calendar.
    pub fn end_time(&self) -> Result<NaiveDateTime> {
        self.start
            .checked_add_signed(Duration::hours(APPOINTMENT_HOURS))
            .ok_or_else(|| AppError::validation("appointment time is out of range"))
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn time_only(&self) -> NaiveTime {
        self.start.time()
    }
}

/// Replacement values for an existing appointment.
///
/// `patient_id` is the claimed owner; it must match the stored patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentUpdate {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub start: NaiveDateTime,
    pub status: AppointmentStatus,
}

/// Medication issued by a doctor against an appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub patient_name: String,
    pub appointment_id: Uuid,
    pub medication: String,
    pub dosage: String,
    pub doctor_notes: Option<String>,
}

impl Prescription {
    /// Create a new prescription with validation.
    pub fn new(
        patient_name: String,
        appointment_id: Uuid,
        medication: String,
        dosage: String,
        doctor_notes: Option<String>,
    ) -> Result<Self> {
        check_length("patientName", &patient_name, 3, 100)?;
        check_length("medication", &medication, 3, 100)?;
        if dosage.trim().is_empty() {
            return Err(AppError::validation("dosage cannot be empty"));
        }
        if let Some(notes) = &doctor_notes {
            if notes.chars().count() > 200 {
                return Err(AppError::validation(
                    "doctorNotes must not exceed 200 characters",
                ));
            }
        }

        Ok(Prescription {
            id: Uuid::new_v4(),
            patient_name,
            appointment_id,
            medication,
            dosage,
            doctor_notes,
        })
    }
}

/// Flattened appointment with doctor and patient details for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentView {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub patient_email: String,
    pub patient_phone: String,
    pub patient_address: String,
    pub appointment_time: NaiveDateTime,
    pub status: AppointmentStatus,
    pub appointment_date: NaiveDate,
    pub appointment_time_only: NaiveTime,
    pub end_time: NaiveDateTime,
}

impl AppointmentView {
    pub fn new(appointment: &Appointment, doctor: &Doctor, patient: &Patient) -> Result<Self> {
        Ok(AppointmentView {
            id: appointment.id,
            doctor_id: doctor.id,
            doctor_name: doctor.name.clone(),
            patient_id: patient.id,
            patient_name: patient.name.clone(),
            patient_email: patient.email.clone(),
            patient_phone: patient.phone.clone(),
            patient_address: patient.address.clone(),
            appointment_time: appointment.start,
            status: appointment.status,
            appointment_date: appointment.date(),
            appointment_time_only: appointment.time_only(),
            end_time: appointment.end_time()?,
        })
    }
}
