//! Patient and admin registration, password hashing and credential login.

use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::models::{Admin, Patient, Principal, Role};
use crate::store::Store;
use crate::token::TokenService;

/// bcrypt cost factor.
#[cfg(not(test))]
const BCRYPT_COST: u32 = 10;
// Lowest cost bcrypt accepts; keeps tests fast.
#[cfg(test)]
const BCRYPT_COST: u32 = 4;

/// Hash checked when a login names no account, so both paths run bcrypt.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    DUMMY_HASH
        .get_or_init(|| bcrypt::hash("no-such-account", BCRYPT_COST).ok())
        .as_deref()
}

const MIN_PASSWORD_LEN: usize = 6;

/// Hash a password with bcrypt.
pub fn hash_password(password: &str) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AppError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).map_err(|e| AppError::Internal(format!("bcrypt verify: {e}")))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatient {
    pub name: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub address: String,
}

pub struct Accounts<S: Store> {
    store: Arc<S>,
    tokens: TokenService,
}

impl<S: Store> Accounts<S> {
    pub fn new(store: Arc<S>, tokens: TokenService) -> Self {
        dummy_hash();
        Accounts { store, tokens }
    }

    /// Register a patient; email and phone must both be unused.
    pub fn register_patient(&self, new: NewPatient) -> Result<Patient> {
        let patient = Patient::new(
            new.name,
            new.email,
            hash_password(&new.password)?,
            new.phone,
            new.address,
        )?;

        let patient = self.store.transaction(|repos| {
            if repos
                .find_patient_by_email_or_phone(&patient.email, &patient.phone)?
                .is_some()
            {
                warn!(email = %patient.email, "patient already registered");
                return Err(AppError::Conflict(
                    "Patient with email id or phone no already exist".to_string(),
                ));
            }
            repos.save_patient(patient.clone())?;
            Ok(patient)
        })?;

        info!(patient = %patient.id, "patient registered");
        Ok(patient)
    }

    pub fn register_admin(&self, username: &str, password: &str) -> Result<Admin> {
        let admin = Admin::new(username.to_string(), hash_password(password)?)?;

        let admin = self.store.transaction(|repos| {
            if repos.find_admin_by_username(&admin.username)?.is_some() {
                return Err(AppError::Conflict("Admin already exists".to_string()));
            }
            repos.save_admin(admin.clone())?;
            Ok(admin)
        })?;

        info!(admin = %admin.username, "admin registered");
        Ok(admin)
    }

    /// Check credentials and issue a token.
    ///
    /// Admins log in by username, doctors by email, patients by email or phone.
    pub fn login(&self, role: Role, identifier: &str, password: &str) -> Result<String> {
        let identifier = identifier.trim();
        let found = self.store.read(|repos| -> Result<Option<(Principal, String)>> {
            Ok(match role {
                Role::Admin => repos.find_admin_by_username(identifier)?.map(|a| {
                    let hash = a.password_hash.clone();
                    (Principal::Admin(a), hash)
                }),
                Role::Doctor => repos.find_doctor_by_email(identifier)?.map(|d| {
                    let hash = d.password_hash.clone();
                    (Principal::Doctor(d), hash)
                }),
                Role::Patient => repos
                    .find_patient_by_email_or_phone(identifier, identifier)?
                    .map(|p| {
                        let hash = p.password_hash.clone();
                        (Principal::Patient(p), hash)
                    }),
            })
        })?;

        let principal = match found {
            Some((principal, hash)) if verify_password(password, &hash)? => principal,
            None => {
                // Result discarded: only the elapsed time matters.
                if let Some(hash) = dummy_hash() {
                    let _ = verify_password(password, hash);
                }
                warn!(%role, identifier, "login rejected");
                return Err(AppError::Unauthorized("Invalid credentials".to_string()));
            }
            Some(_) => {
                warn!(%role, identifier, "login rejected");
                return Err(AppError::Unauthorized("Invalid credentials".to_string()));
            }
        };

        info!(%role, subject = principal.identifier(), "login succeeded");
        self.tokens.generate(principal.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::InMemoryStore;

    fn accounts() -> (Accounts<InMemoryStore>, TokenService, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let tokens = TokenService::new("accounts-test-secret");
        (Accounts::new(store.clone(), tokens.clone()), tokens, store)
    }

    fn maria() -> NewPatient {
        NewPatient {
            name: "Maria Lopez".to_string(),
            email: "maria@mail.test".to_string(),
            password: "hunter22".to_string(),
            phone: "5551112222".to_string(),
            address: "12 Elm Street".to_string(),
        }
    }

    #[test]
    fn short_passwords_are_rejected() {
        let err = hash_password("abc").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn hashed_password_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash).unwrap());
        assert!(!verify_password("wrong horse", &hash).unwrap());
    }

    #[test]
    fn patient_login_by_email_or_phone() {
        let (accounts, tokens, store) = accounts();
        accounts.register_patient(maria()).unwrap();

        let token = accounts
            .login(Role::Patient, "maria@mail.test", "hunter22")
            .unwrap();
        assert!(tokens.validate(store.as_ref(), "patient", &token));

        let by_phone = accounts.login(Role::Patient, "5551112222", "hunter22").unwrap();
        assert_eq!(tokens.decode(&by_phone).unwrap().sub, "maria@mail.test");
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let (accounts, _, _) = accounts();
        accounts.register_patient(maria()).unwrap();

        let err = accounts
            .login(Role::Patient, "maria@mail.test", "hunter23")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let err = accounts
            .login(Role::Doctor, "maria@mail.test", "hunter22")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn unknown_account_runs_the_same_check() {
        let hash = dummy_hash().unwrap();
        assert!(!verify_password("hunter22", hash).unwrap());

        let (accounts, _, _) = accounts();
        let err = accounts
            .login(Role::Patient, "nobody@mail.test", "hunter22")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[test]
    fn duplicate_patient_conflicts() {
        let (accounts, _, _) = accounts();
        accounts.register_patient(maria()).unwrap();

        let mut same_phone = maria();
        same_phone.email = "other@mail.test".to_string();
        let err = accounts.register_patient(same_phone).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn admin_login_uses_username() {
        let (accounts, tokens, store) = accounts();
        accounts.register_admin("root", "toor-toor").unwrap();
        assert_eq!(
            accounts.register_admin("root", "another1").unwrap_err().kind(),
            ErrorKind::Conflict
        );

        let token = accounts.login(Role::Admin, "root", "toor-toor").unwrap();
        assert!(tokens.validate(store.as_ref(), "admin", &token));
    }
}
