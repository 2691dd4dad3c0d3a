//! Shared error type and role check for blacklist and dispute moderation.

use uuid::Uuid;

use super::auth::Identity;
use crate::model::Role;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("access denied: {0}")]
    Forbidden(&'static str),
    #[error("session is not valid, please sign in again")]
    MissingEmail,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("record not found: {0}")]
    NotFound(Uuid),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ModerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

pub(crate) fn require_role(identity: &Identity, roles: &[Role], reason: &'static str) -> Result<(), ModerationError> {
    if roles.contains(&identity.role) {
        Ok(())
    } else {
        Err(ModerationError::Forbidden(reason))
    }
}

pub(crate) fn required(value: &str, field: &'static str) -> Result<String, ModerationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ModerationError::MissingField(field));
    }
    Ok(trimmed.to_owned())
}
