//! Identity service: credential sign-up/sign-in, session resolution.
//!
//! DESIGN
//! ======
//! Passwords are hashed with Argon2id and stored on the profile row. A
//! resolved request carries an `IdentityState`; the route guard and every
//! service that needs "who is calling" take that value explicitly instead of
//! looking it up from ambient context.
//!
//! Self-registration as `admin` is refused. Admin accounts come from
//! `bootstrap_admin` at startup.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::{Deserialize, Serialize};
use time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use super::session;
use crate::model::{NewAccount, Profile, Role};
use crate::store::{Store, StoreError};

const MIN_PASSWORD_LENGTH: usize = 6;

// =============================================================================
// TYPES
// =============================================================================

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

impl Identity {
    #[must_use]
    pub fn from_profile(profile: &Profile) -> Self {
        Self { user_id: profile.id, email: profile.email.clone(), role: profile.role }
    }
}

/// Outcome of identity resolution for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityState {
    /// Resolution has not completed (e.g. the store is unreachable).
    Resolving,
    Anonymous,
    Authenticated(Identity),
}

impl IdentityState {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Resolving | Self::Anonymous => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("admin registration is not allowed through this path")]
    AdminSignUpForbidden,
    #[error("invalid email")]
    InvalidEmail,
    #[error("password must be at least 6 characters")]
    WeakPassword,
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("user already registered")]
    EmailTaken,
    #[error("password hashing failed")]
    PasswordHash,
    #[error(transparent)]
    Store(#[from] StoreError),
}

// =============================================================================
// NORMALIZATION
// =============================================================================

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword);
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::InvalidCredentials)
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Register a seller or buyer account.
///
/// # Errors
///
/// `AdminSignUpForbidden` for `role = admin`, validation errors for bad
/// input, `EmailTaken` when the email already has a profile.
pub async fn sign_up(store: &dyn Store, form: SignUp) -> Result<Profile, AuthError> {
    if form.role == Role::Admin {
        return Err(AuthError::AdminSignUpForbidden);
    }
    create_account(store, &form.email, &form.password, form.full_name.trim(), form.role).await
}

async fn create_account(
    store: &dyn Store,
    email: &str,
    password: &str,
    full_name: &str,
    role: Role,
) -> Result<Profile, AuthError> {
    let email = normalize_email(email).ok_or(AuthError::InvalidEmail)?;
    validate_password(password)?;
    let password_hash = hash_password(password)?;

    let account = NewAccount { email, full_name: full_name.to_owned(), role, password_hash };
    match store.insert_account(account).await {
        Ok(profile) => {
            info!(user_id = %profile.id, role = profile.role.as_str(), "account created");
            Ok(profile)
        }
        Err(StoreError::Conflict(_)) => Err(AuthError::EmailTaken),
        Err(e) => Err(e.into()),
    }
}

/// Verify credentials and open a session. Returns the raw token and profile.
///
/// # Errors
///
/// `InvalidCredentials` for an unknown email or wrong password.
pub async fn sign_in(
    store: &dyn Store,
    email: &str,
    password: &str,
    ttl: Duration,
) -> Result<(String, Profile), AuthError> {
    let email = normalize_email(email).ok_or(AuthError::InvalidCredentials)?;
    let Some(credentials) = store.find_credentials(&email).await? else {
        return Err(AuthError::InvalidCredentials);
    };
    verify_password(password, &credentials.password_hash)?;

    let Some(profile) = store.get_profile(credentials.user_id).await? else {
        return Err(AuthError::InvalidCredentials);
    };
    let token = session::create_session(store, profile.id, ttl).await?;
    Ok((token, profile))
}

pub async fn sign_out(store: &dyn Store, token: &str) -> Result<(), AuthError> {
    session::delete_session(store, token).await?;
    Ok(())
}

/// Resolve the caller behind a session token.
///
/// A store failure leaves the state `Resolving`: the caller is neither known
/// nor known to be absent.
pub async fn resolve(store: &dyn Store, token: Option<&str>) -> IdentityState {
    let Some(token) = token else {
        return IdentityState::Anonymous;
    };
    let user_id = match session::validate_session(store, token).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return IdentityState::Anonymous,
        Err(e) => {
            warn!(error = %e, "session lookup failed");
            return IdentityState::Resolving;
        }
    };
    match store.get_profile(user_id).await {
        Ok(Some(profile)) => IdentityState::Authenticated(Identity::from_profile(&profile)),
        Ok(None) => {
            warn!(%user_id, "session references missing profile");
            IdentityState::Anonymous
        }
        Err(e) => {
            warn!(error = %e, %user_id, "profile lookup failed");
            IdentityState::Resolving
        }
    }
}

/// Post-login destination for a role.
#[must_use]
pub fn landing_route(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin",
        Role::Seller => "/seller",
        Role::Buyer => "/",
    }
}

/// Ensure the configured admin account exists. No-op when it already does.
pub async fn bootstrap_admin(store: &dyn Store, email: &str, password: &str) -> Result<(), AuthError> {
    match create_account(store, email, password, "Administrator", Role::Admin).await {
        Ok(_) | Err(AuthError::EmailTaken) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
