//! JWT issuance and capability checks.
//!
//! A token only proves who signed it and when. Every validation decodes the
//! token and then looks the subject up in the store again, so an account that
//! has been deleted stops authorizing immediately.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::models::{Principal, Role};
use crate::store::{Repositories, Store, StoreResult};

/// Token lifetime: 7 days.
pub const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;

/// Claims embedded in every token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Principal identifier: email for doctors and patients, username for admins.
    pub sub: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenService {
    secret: Vec<u8>,
    ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_ttl(secret, Duration::days(DEFAULT_TOKEN_TTL_DAYS))
    }

    pub fn with_ttl(secret: impl Into<Vec<u8>>, ttl: Duration) -> Self {
        TokenService {
            secret: secret.into(),
            ttl,
        }
    }

    /// Sign a token for `principal_id` (HS256, expires after the configured ttl).
    pub fn generate(&self, principal_id: &str) -> Result<String> {
        let now = Utc::now();
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or_else(|| AppError::Internal("token ttl out of range".to_string()))?;
        let claims = TokenClaims {
            sub: principal_id.to_string(),
            iat: now.timestamp(),
            exp: expires.timestamp(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| AppError::Internal(format!("jwt encode: {e}")))
    }

    /// Verify signature and expiry, returning the claims on success.
    pub fn decode(&self, token: &str) -> Option<TokenClaims> {
        let key = DecodingKey::from_secret(&self.secret);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        match decode::<TokenClaims>(token, &key, &validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!(error = %e, "token rejected");
                None
            }
        }
    }

    /// Whether `token` is valid for `role` and its subject still exists.
    ///
    /// Never fails: malformed input, unknown roles and store errors all yield
    /// `false`.
    pub fn validate<S: Store>(&self, store: &S, role: &str, token: &str) -> bool {
        self.resolve(store, role, token).is_ok()
    }

    /// Decode `token` and fetch the live principal it names for `role`.
    pub fn resolve<S: Store>(&self, store: &S, role: &str, token: &str) -> Result<Principal> {
        let role = Role::from_string(role).map_err(|_| AppError::TokenInvalid)?;
        let claims = self.decode(token).ok_or(AppError::TokenInvalid)?;

        match store.read(|repos| find_principal(repos, role, &claims.sub)) {
            Ok(Some(principal)) => Ok(principal),
            Ok(None) => {
                warn!(%role, subject = %claims.sub, "token subject no longer exists");
                Err(AppError::TokenInvalid)
            }
            Err(e) => {
                warn!(%role, error = %e, "principal lookup failed");
                Err(AppError::TokenInvalid)
            }
        }
    }
}

/// Whether `principal_id` currently exists in the store under `role`.
pub fn has_capability<S: Store>(store: &S, role: Role, principal_id: &str) -> bool {
    matches!(
        store.read(|repos| find_principal(repos, role, principal_id)),
        Ok(Some(_))
    )
}

fn find_principal(
    repos: &dyn Repositories,
    role: Role,
    principal_id: &str,
) -> StoreResult<Option<Principal>> {
    Ok(match role {
        Role::Admin => repos
            .find_admin_by_username(principal_id)?
            .map(Principal::Admin),
        Role::Doctor => repos
            .find_doctor_by_email(principal_id)?
            .map(Principal::Doctor),
        Role::Patient => repos
            .find_patient_by_email(principal_id)?
            .map(Principal::Patient),
    })
}
