//! Doctor/patient appointment booking.
//!
//! Availability, conflict-checked booking, token-gated access, doctor search
//! and prescriptions over a transactional store.

pub mod accounts;
pub mod calendar;
pub mod clinic;
pub mod config;
pub mod directory;
pub mod error;
pub mod models;
pub mod prescriptions;
pub mod scheduler;
pub mod store;
pub mod token;

pub use clinic::Clinic;
pub use config::Config;
pub use error::{AppError, ErrorKind, Result};
pub use models::{
    Appointment, AppointmentStatus, AppointmentUpdate, AppointmentView, Doctor, Patient,
    Prescription, Role,
};
pub use store::{InMemoryStore, Store};
pub use token::TokenService;
