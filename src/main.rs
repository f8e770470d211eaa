//! Interactive command-line front end for the clinic.
//!
//! Runs against an in-memory store; state lasts for the session.

use anyhow::Result;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use easyclinic::accounts::NewPatient;
use easyclinic::directory::DoctorProfile;
use easyclinic::models::parse_slot_start;
use easyclinic::{
    AppError, AppointmentStatus, AppointmentView, Clinic, Config, InMemoryStore, Prescription,
    Role, TokenService,
};

#[derive(Parser, Debug)]
#[command(name = "easyclinic")]
#[command(author, version, about = "Doctor appointment booking", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "easyclinic.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Username of the bootstrap admin account
    #[arg(long, default_value = "admin")]
    admin_user: String,

    /// Password of the bootstrap admin account
    #[arg(long, env = "EASYCLINIC_ADMIN_PASSWORD", default_value = "change-me")]
    admin_password: String,

    /// Run the scripted walkthrough and exit
    #[arg(long)]
    demo: bool,
}

struct Session {
    role: Role,
    subject: String,
    token: String,
}

struct ClinicCLI {
    clinic: Clinic<InMemoryStore>,
    session: Option<Session>,
    running: bool,
}

impl ClinicCLI {
    fn new(clinic: Clinic<InMemoryStore>) -> Self {
        ClinicCLI {
            clinic,
            session: None,
            running: true,
        }
    }

    fn print_header(&self) {
        println!("\n{}", "=".repeat(60));
        println!("       EASYCLINIC APPOINTMENT BOOKING");
        println!("{}", "=".repeat(60));
    }

    fn print_menu(&self) {
        match &self.session {
            Some(s) => println!("\n--- Main Menu ({} {}) ---", s.role, s.subject),
            None => println!("\n--- Main Menu (not logged in) ---"),
        }
        println!("1. Register as patient");
        println!("2. Log in");
        println!("3. Find doctors");
        println!("4. View doctor availability");
        println!("5. Book appointment (patient)");
        println!("6. Reschedule appointment (patient)");
        println!("7. Cancel appointment (patient)");
        println!("8. My appointments");
        println!("9. Issue prescription (doctor)");
        println!("10. Change appointment status (doctor)");
        println!("11. Add doctor (admin)");
        println!("12. Remove doctor (admin)");
        println!("13. Run demo");
        println!("14. Log out");
        println!("15. Exit");
        println!("{}", "-".repeat(20));
    }

    fn get_input(&self, prompt: &str, default: Option<&str>) -> String {
        if let Some(def) = default {
            print!("{} [{}]: ", prompt, def);
        } else {
            print!("{}: ", prompt);
        }
        let _ = io::stdout().flush();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => {
                println!("\nGoodbye!");
                std::process::exit(0);
            }
            Ok(_) => {}
        }
        let input = input.trim();

        if input.is_empty() {
            default.unwrap_or("").to_string()
        } else {
            input.to_string()
        }
    }

    fn get_int_input(&self, prompt: &str, default: Option<i32>) -> i32 {
        loop {
            let default_str = default.map(|d| d.to_string());
            let input = self.get_input(prompt, default_str.as_deref());

            if let Ok(value) = input.parse::<i32>() {
                return value;
            }
            println!("Please enter a valid number");
        }
    }

    fn get_uuid_input(&self, prompt: &str) -> Option<Uuid> {
        let input = self.get_input(prompt, None);
        match Uuid::parse_str(&input) {
            Ok(id) => Some(id),
            Err(_) => {
                println!("Not a valid id: {}", input);
                None
            }
        }
    }

    fn get_date_input(&self, prompt: &str) -> Option<NaiveDate> {
        let tomorrow = (Local::now() + Duration::days(1)).date_naive();
        let default = tomorrow.format("%Y-%m-%d").to_string();
        let input = self.get_input(prompt, Some(&default));
        match NaiveDate::parse_from_str(&input, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                println!("Dates look like 2030-01-31");
                None
            }
        }
    }

    fn get_start_input(&self) -> Option<NaiveDateTime> {
        let date = self.get_date_input("Date (YYYY-MM-DD)")?;
        let time = self.get_input("Time (HH:MM)", Some("10:00"));
        match parse_slot_start(&time) {
            Some(time) => Some(date.and_time(time)),
            None => {
                println!("Times look like 14:00");
                None
            }
        }
    }

    fn token_for(&self, role: Role) -> Option<&str> {
        match &self.session {
            Some(s) if s.role == role => Some(s.token.as_str()),
            _ => {
                println!("\nPlease log in as {} first (option 2)", role);
                None
            }
        }
    }

    fn register_patient(&mut self) {
        println!("\n--- Register Patient ---");

        let new = NewPatient {
            name: self.get_input("Full name", None),
            email: self.get_input("Email", None),
            phone: self.get_input("Phone (10 digits)", None),
            address: self.get_input("Address", None),
            password: self.get_input("Password", None),
        };
        match self.clinic.register_patient(new) {
            Ok(patient) => println!("\nRegistered {} ({})", patient.name, patient.email),
            Err(e) => println!("Error registering patient: {}", e),
        }
    }

    fn login(&mut self) {
        println!("\n--- Log In ---");

        let role = match Role::from_string(&self.get_input("Role (admin/doctor/patient)", Some("patient"))) {
            Ok(role) => role,
            Err(e) => {
                println!("{}", e);
                return;
            }
        };
        let identifier = self.get_input("Username, email or phone", None);
        let password = self.get_input("Password", None);

        match self.clinic.login(role, &identifier, &password) {
            Ok(token) => {
                println!("\nLogged in as {} {}", role, identifier);
                self.session = Some(Session {
                    role,
                    subject: identifier,
                    token,
                });
            }
            Err(e) => println!("Login failed: {}", e),
        }
    }

    fn find_doctors(&self) {
        println!("\n--- Find Doctors ---");

        let name = self.get_input("Name contains (blank for any)", None);
        let specialty = self.get_input("Specialty (blank for any)", None);
        let period = self.get_input("Period am/pm (blank for any)", None);

        match self
            .clinic
            .filter_doctors(Some(&name), Some(&specialty), Some(&period))
        {
            Ok(doctors) if doctors.is_empty() => println!("\nNo matching doctors"),
            Ok(doctors) => {
                println!("\n--- Doctors ({}) ---", doctors.len());
                for d in doctors {
                    println!("  {} - {} [{}]", d.name, d.specialty, d.available_times.join(", "));
                    println!("    ID: {}", d.id);
                }
            }
            Err(e) => println!("Error: {}", e),
        }
    }

    fn view_availability(&self) {
        let Some(session) = &self.session else {
            println!("\nPlease log in first (option 2)");
            return;
        };

        println!("\n--- Doctor Availability ---");
        let Some(doctor_id) = self.get_uuid_input("Doctor ID") else {
            return;
        };
        let Some(date) = self.get_date_input("Date (YYYY-MM-DD)") else {
            return;
        };

        match self
            .clinic
            .availability(session.role.name(), &session.token, doctor_id, date)
        {
            Ok(slots) if slots.is_empty() => println!("\nNo free slots on {}", date),
            Ok(slots) => {
                println!("\n{}:", date.format("%A, %Y-%m-%d"));
                for slot in slots {
                    println!("  {}", slot);
                }
            }
            Err(e) => println!("Error: {}", e),
        }
    }

    fn book(&mut self) {
        let Some(token) = self.token_for(Role::Patient) else {
            return;
        };

        println!("\n--- Book Appointment ---");
        let Some(doctor_id) = self.get_uuid_input("Doctor ID") else {
            return;
        };
        let Some(start) = self.get_start_input() else {
            return;
        };

        match self.clinic.book(token, doctor_id, start) {
            Ok(appt) => {
                println!("\nBooked for {}", appt.start.format("%Y-%m-%d %H:%M"));
                println!("Appointment ID: {}", appt.id);
            }
            Err(e) => println!("Error booking appointment: {}", e),
        }
    }

    fn reschedule(&mut self) {
        let Some(token) = self.token_for(Role::Patient) else {
            return;
        };

        println!("\n--- Reschedule Appointment ---");
        let Some(id) = self.get_uuid_input("Appointment ID") else {
            return;
        };
        let Some(doctor_id) = self.get_uuid_input("Doctor ID") else {
            return;
        };
        let Some(start) = self.get_start_input() else {
            return;
        };

        match self.clinic.reschedule(token, id, doctor_id, start) {
            Ok(appt) => println!("\nMoved to {}", appt.start.format("%Y-%m-%d %H:%M")),
            Err(e) => println!("Error rescheduling: {}", e),
        }
    }

    fn cancel(&mut self) {
        let Some(token) = self.token_for(Role::Patient) else {
            return;
        };

        println!("\n--- Cancel Appointment ---");
        let Some(id) = self.get_uuid_input("Appointment ID") else {
            return;
        };
        match self.clinic.cancel(token, id) {
            Ok(()) => println!("\nAppointment cancelled; the slot is free again"),
            Err(e) => println!("Error cancelling: {}", e),
        }
    }

    fn my_appointments(&self) {
        let Some(session) = &self.session else {
            println!("\nPlease log in first (option 2)");
            return;
        };

        let views = match session.role {
            Role::Doctor => {
                let Some(date) = self.get_date_input("Date (YYYY-MM-DD)") else {
                    return;
                };
                let name = self.get_input("Patient name contains (blank for all)", None);
                self.clinic
                    .doctor_appointments(&session.token, date, Some(&name))
            }
            Role::Patient => {
                let status = self.get_input("Status", Some("scheduled"));
                match AppointmentStatus::from_string(&status) {
                    Ok(status) => self.clinic.patient_appointments(&session.token, status),
                    Err(e) => Err(e),
                }
            }
            Role::Admin => {
                println!("\nAdmins have no appointments");
                return;
            }
        };

        match views {
            Ok(views) if views.is_empty() => println!("\nNo appointments"),
            Ok(views) => print_views(&views),
            Err(e) => println!("Error: {}", e),
        }
    }

    fn issue_prescription(&mut self) {
        let Some(token) = self.token_for(Role::Doctor) else {
            return;
        };

        println!("\n--- Issue Prescription ---");
        let Some(appointment_id) = self.get_uuid_input("Appointment ID") else {
            return;
        };
        let patient_name = self.get_input("Patient name", None);
        let medication = self.get_input("Medication", None);
        let dosage = self.get_input("Dosage", None);
        let notes = self.get_input("Notes (optional)", None);
        let notes = (!notes.is_empty()).then_some(notes);

        let issued = Prescription::new(patient_name, appointment_id, medication, dosage, notes)
            .and_then(|p| self.clinic.issue_prescription(token, p));
        match issued {
            Ok(p) => println!("\nPrescribed {} ({}) for {}", p.medication, p.dosage, p.patient_name),
            Err(e) => println!("Error issuing prescription: {}", e),
        }
    }

    fn change_status(&mut self) {
        let Some(token) = self.token_for(Role::Doctor) else {
            return;
        };

        println!("\n--- Change Status ---");
        let Some(id) = self.get_uuid_input("Appointment ID") else {
            return;
        };
        println!("  0. Scheduled");
        println!("  1. Prescribed");
        println!("  2. Completed");
        println!("  3. Cancelled");
        let code = self.get_int_input("New status", Some(2));

        match self.clinic.change_status(token, id, code) {
            Ok(appt) => println!("\nAppointment is now {}", appt.status.name()),
            Err(e) => println!("Error: {}", e),
        }
    }

    fn add_doctor(&mut self) {
        let Some(token) = self.token_for(Role::Admin) else {
            return;
        };

        println!("\n--- Add Doctor ---");
        let profile = DoctorProfile {
            name: self.get_input("Doctor name", Some("Dr. Smith")),
            specialty: self.get_input("Specialty", Some("General")),
            email: self.get_input("Email", None),
            phone: self.get_input("Phone (10 digits)", None),
            available_times: self
                .get_input("Offered times, comma separated", Some("09:00,10:00,14:00"))
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        };
        let password = self.get_input("Initial password", None);

        match self.clinic.add_doctor(token, profile, &password) {
            Ok(doctor) => {
                println!("\nAdded {}", doctor.name);
                println!("Doctor ID: {}", doctor.id);
            }
            Err(e) => println!("Error adding doctor: {}", e),
        }
    }

    fn remove_doctor(&mut self) {
        let Some(token) = self.token_for(Role::Admin) else {
            return;
        };

        println!("\n--- Remove Doctor ---");
        let Some(id) = self.get_uuid_input("Doctor ID") else {
            return;
        };
        match self.clinic.delete_doctor(token, id) {
            Ok(removed) => println!("\nDoctor removed along with {} appointment(s)", removed),
            Err(e) => println!("Error removing doctor: {}", e),
        }
    }

    fn run_demo(&mut self) {
        println!("\n--- Running Demo ---");
        let demo = Clinic::new(
            Arc::new(InMemoryStore::new()),
            TokenService::new(Uuid::new_v4().to_string()),
        );
        if let Err(e) = run_demo(&demo) {
            println!("Demo stopped: {}", e);
        }
    }

    fn run(&mut self) {
        self.print_header();

        while self.running {
            self.print_menu();

            let choice = self.get_int_input("Enter choice", Some(13));

            match choice {
                1 => self.register_patient(),
                2 => self.login(),
                3 => self.find_doctors(),
                4 => self.view_availability(),
                5 => self.book(),
                6 => self.reschedule(),
                7 => self.cancel(),
                8 => self.my_appointments(),
                9 => self.issue_prescription(),
                10 => self.change_status(),
                11 => self.add_doctor(),
                12 => self.remove_doctor(),
                13 => self.run_demo(),
                14 => {
                    self.session = None;
                    println!("\nLogged out");
                }
                15 => {
                    self.running = false;
                    println!("\nGoodbye!");
                }
                _ => println!("Invalid choice"),
            }
        }
    }
}

fn print_views(views: &[AppointmentView]) {
    let mut current_date = None;
    for view in views {
        if Some(view.appointment_date) != current_date {
            current_date = Some(view.appointment_date);
            println!("\n{}:", view.appointment_date.format("%A, %Y-%m-%d"));
        }
        println!(
            "  {} - {} {} with {} [{}]",
            view.appointment_time_only.format("%H:%M"),
            view.end_time.format("%H:%M"),
            view.patient_name,
            view.doctor_name,
            view.status.name()
        );
        println!("    ID: {}", view.id);
    }
}

/// Scripted walkthrough on a throwaway clinic.
fn run_demo(clinic: &Clinic<InMemoryStore>) -> easyclinic::Result<()> {
    clinic.accounts.register_admin("demo-admin", "demo-admin")?;
    let admin = clinic.login(Role::Admin, "demo-admin", "demo-admin")?;

    let doctor = clinic.add_doctor(
        &admin,
        DoctorProfile {
            name: "Dr. Demo".to_string(),
            specialty: "General".to_string(),
            email: "demo@clinic.test".to_string(),
            phone: "5550001111".to_string(),
            available_times: vec!["09:00".to_string(), "14:00".to_string()],
        },
        "demo-doctor",
    )?;
    let doctor_token = clinic.login(Role::Doctor, "demo@clinic.test", "demo-doctor")?;
    println!("Added {} (offers 09:00 and 14:00)", doctor.name);

    let mut patients = Vec::new();
    for (name, email, phone) in [
        ("John Smith", "john@email.test", "5551000001"),
        ("Jane Doe", "jane@email.test", "5551000002"),
    ] {
        clinic.register_patient(NewPatient {
            name: name.to_string(),
            email: email.to_string(),
            password: "demo-patient".to_string(),
            phone: phone.to_string(),
            address: "1 Demo Road".to_string(),
        })?;
        patients.push(clinic.login(Role::Patient, email, "demo-patient")?);
    }
    let (john, jane) = (&patients[0], &patients[1]);

    let day = (Local::now() + Duration::days(1)).date_naive();
    let at = |hour: u32| {
        day.and_hms_opt(hour, 0, 0)
            .ok_or_else(|| AppError::validation(format!("no such hour: {hour}")))
    };

    let johns = clinic.book(john, doctor.id, at(10)?)?;
    let janes = clinic.book(jane, doctor.id, at(13)?)?;
    println!("\nJohn booked 10:00, Jane booked 13:00");

    let free = clinic.availability("patient", john, doctor.id, day)?;
    println!("Free slots tomorrow: {}", free.join(", "));

    match clinic.reschedule(jane, janes.id, doctor.id, at(11)?) {
        Ok(_) => println!("Jane moved to 11:00"),
        Err(e) => println!("Jane cannot move to 11:00: {}", e),
    }
    match clinic.cancel(jane, johns.id) {
        Ok(()) => println!("Jane cancelled John's appointment"),
        Err(e) => println!("Jane cannot cancel John's appointment: {}", e),
    }

    let prescription = Prescription::new(
        "John Smith".to_string(),
        johns.id,
        "Amoxicillin".to_string(),
        "250mg three times daily".to_string(),
        Some("Seven day course".to_string()),
    )?;
    clinic.issue_prescription(&doctor_token, prescription)?;

    println!("\nDoctor's day:");
    let views = clinic.doctor_appointments(&doctor_token, day, None)?;
    print_views(&views);
    if let Some(first) = views.first() {
        match serde_json::to_string_pretty(first) {
            Ok(json) => println!("\nFirst entry as JSON:\n{}", json),
            Err(e) => println!("Could not encode entry: {}", e),
        }
    }

    let afternoon = clinic.filter_doctors(None, None, Some("pm"))?;
    println!("\nDoctors offering afternoon hours: {}", afternoon.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)?;

    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting easyclinic v{}", env!("CARGO_PKG_VERSION"));

    let clinic = Clinic::new(Arc::new(InMemoryStore::new()), config.token_service()?);
    clinic
        .accounts
        .register_admin(&cli.admin_user, &cli.admin_password)?;

    if cli.demo {
        run_demo(&clinic)?;
        return Ok(());
    }

    let mut app = ClinicCLI::new(clinic);
    app.run();
    Ok(())
}
